// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the story export geometry

use storycam::config::FrameSize;
use storycam::pipelines::transcode::{FlipMethod, Orientation, compute_transform};

const STORY: FrameSize = FrameSize::new(1080, 1920);

#[test]
fn test_phone_landscape_recording_rotated_to_portrait() {
    let plan = compute_transform(
        FrameSize::new(1920, 1080),
        Orientation::from_tag("rotate-90"),
        STORY,
    );
    assert!((plan.scale() - 1.0).abs() < 1e-9);
    assert_eq!(plan.scaled, STORY);
    assert_eq!(plan.crop.left + plan.crop.right + plan.crop.top + plan.crop.bottom, 0);
    assert_eq!(plan.flip, FlipMethod::UpperLeftDiagonal);
}

#[test]
fn test_webcam_recording_is_cropped_to_centre() {
    let plan = compute_transform(FrameSize::new(1280, 720), Orientation::UPRIGHT, STORY);

    assert_eq!(plan.flip, FlipMethod::Horizontal);
    assert_eq!(plan.scaled.height, 1920);
    assert!(plan.scaled.width > 1080);
    assert_eq!(plan.crop.top, 0);
    assert_eq!(plan.crop.bottom, 0);
    assert_eq!(plan.scaled.width - plan.crop.left - plan.crop.right, 1080);
    assert!(plan.crop.left.abs_diff(plan.crop.right) <= 1);
}

#[test]
fn test_output_is_always_story_sized() {
    for (w, h) in [(640, 480), (1920, 1080), (1080, 1920), (720, 1600), (3024, 4032)] {
        for tag in ["rotate-0", "rotate-90", "rotate-180", "rotate-270"] {
            let plan = compute_transform(FrameSize::new(w, h), Orientation::from_tag(tag), STORY);
            assert_eq!(plan.scaled.width - plan.crop.left - plan.crop.right, 1080, "{w}x{h} {tag}");
            assert_eq!(plan.scaled.height - plan.crop.top - plan.crop.bottom, 1920, "{w}x{h} {tag}");
            assert!(
                plan.crop.left + plan.crop.right == 0 || plan.crop.top + plan.crop.bottom == 0,
                "{w}x{h} {tag} cropped in both axes"
            );
        }
    }
}
