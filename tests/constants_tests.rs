// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use storycam::constants::{app_info, audio_level, file_formats, story, timing};
use storycam::media::encoders::VideoQuality;

const QUALITIES: [VideoQuality; 4] = [
    VideoQuality::Low,
    VideoQuality::Medium,
    VideoQuality::High,
    VideoQuality::Maximum,
];

#[test]
fn test_story_canvas_is_portrait() {
    assert!(story::TARGET_HEIGHT > story::TARGET_WIDTH);
    assert_eq!(story::TARGET_WIDTH * 16, story::TARGET_HEIGHT * 9);
}

#[test]
fn test_level_range() {
    assert!(audio_level::MIN_DB < audio_level::MAX_DB);
    assert_eq!(audio_level::MAX_DB, 0.0);
}

#[test]
fn test_level_sampling_is_faster_than_countdown() {
    assert!(timing::LEVEL_TICK < timing::COUNTDOWN_TICK);
}

#[test]
fn test_export_file_name() {
    assert_eq!(file_formats::export_file_name(1700000000), "Story_1700000000.mp4");
}

#[test]
fn test_quality_ordering() {
    // Presets are ordered from lowest to highest quality
    let mut prev_bitrate = 0u32;
    for quality in QUALITIES {
        let bitrate = quality.bitrate_kbps(story::TARGET_WIDTH, story::TARGET_HEIGHT);
        assert!(
            bitrate >= prev_bitrate,
            "Presets should be ordered from lowest to highest"
        );
        prev_bitrate = bitrate;
    }
}

#[test]
fn test_bitrate_scales_with_resolution() {
    let hd_bitrate = VideoQuality::Medium.bitrate_kbps(720, 1280);
    let story_bitrate = VideoQuality::Medium.bitrate_kbps(1080, 1920);
    let uhd_bitrate = VideoQuality::Medium.bitrate_kbps(2160, 3840);

    assert!(hd_bitrate < story_bitrate);
    assert!(story_bitrate < uhd_bitrate);
}

#[test]
fn test_version_is_stamped() {
    let version = app_info::version();
    assert!(!version.is_empty());
    assert!(!version.starts_with('v'));
}
