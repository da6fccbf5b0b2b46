// SPDX-License-Identifier: GPL-3.0-only

//! Inspect a raw recording before exporting it

use super::transform::Orientation;
use crate::config::FrameSize;
use crate::constants::timing;
use crate::errors::TranscodeError;
use gstreamer as gst;
use gstreamer_pbutils as gst_pbutils;
use gst_pbutils::prelude::*;
use std::path::Path;
use tracing::debug;

/// What the exporter needs to know about a raw recording
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    /// Size of the encoded frames, before any orientation
    pub natural: FrameSize,
    pub orientation: Orientation,
    pub has_audio: bool,
    pub duration: Option<gst::ClockTime>,
}

impl SourceInfo {
    /// Size once the orientation is applied
    pub fn effective(&self) -> FrameSize {
        self.orientation.apply_to(self.natural)
    }
}

pub(crate) fn file_uri(path: &Path) -> Result<String, TranscodeError> {
    gst::glib::filename_to_uri(path, None)
        .map(|uri| uri.to_string())
        .map_err(|e| TranscodeError::Inspect(format!("{}: {}", path.display(), e)))
}

/// Inspect `path` with the GStreamer discoverer
///
/// A file without a video stream is rejected with
/// [`TranscodeError::MissingVideoTrack`].
pub fn inspect(path: &Path) -> Result<SourceInfo, TranscodeError> {
    gst::init().map_err(|e| TranscodeError::Inspect(e.to_string()))?;

    let discoverer =
        gst_pbutils::Discoverer::new(gst::ClockTime::from_seconds(timing::DISCOVER_TIMEOUT_SECS))
            .map_err(|e| TranscodeError::Inspect(format!("Failed to create discoverer: {}", e)))?;

    let uri = file_uri(path)?;
    let info = discoverer
        .discover_uri(&uri)
        .map_err(|e| TranscodeError::Inspect(format!("Failed to inspect {}: {}", path.display(), e)))?;

    let video_streams = info.video_streams();
    let Some(video) = video_streams.first() else {
        return Err(TranscodeError::MissingVideoTrack(path.to_path_buf()));
    };

    let orientation = video
        .tags()
        .and_then(|tags| {
            tags.get::<gst::tags::ImageOrientation>()
                .map(|value| Orientation::from_tag(value.get()))
        })
        .unwrap_or_default();

    let source = SourceInfo {
        natural: FrameSize::new(video.width(), video.height()),
        orientation,
        has_audio: !info.audio_streams().is_empty(),
        duration: info.duration(),
    };

    debug!(
        path = %path.display(),
        natural = %source.natural,
        quarter_turns = source.orientation.quarter_turns,
        has_audio = source.has_audio,
        "Inspected raw recording"
    );
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_size_follows_orientation() {
        let source = SourceInfo {
            natural: FrameSize::new(1920, 1080),
            orientation: Orientation::rotated(90),
            has_audio: true,
            duration: None,
        };
        assert_eq!(source.effective(), FrameSize::new(1080, 1920));
    }

    #[test]
    fn test_inspect_rejects_non_media_file() {
        if gst::init().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not a video").unwrap();

        assert!(inspect(&path).is_err());
    }
}
