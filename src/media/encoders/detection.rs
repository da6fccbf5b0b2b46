// SPDX-License-Identifier: GPL-3.0-only

//! Encoder availability report
//!
//! Used by `storycam list` and at startup to warn early when the MP4 story
//! export cannot run on this system.

use super::audio::AAC_ENCODERS;
use super::video::{VideoCodec, encoder_candidates};
use gstreamer as gst;
use tracing::{info, warn};

/// Installed encoders relevant to recording and export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderReport {
    /// H.264 encoders (export video)
    pub h264: Vec<String>,
    /// Any video encoder usable for the raw recording
    pub recording: Vec<String>,
    /// AAC encoders (export audio)
    pub aac: Vec<String>,
}

impl EncoderReport {
    /// Whether a story can be exported at all
    pub fn can_export(&self) -> bool {
        !self.h264.is_empty()
    }
}

/// Check if a specific GStreamer element is installed
pub fn is_element_available(element_name: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::find(element_name).is_some()
}

/// Scan the registry for encoders
pub fn detect_encoders() -> EncoderReport {
    let installed = |names: Vec<&str>| -> Vec<String> {
        names
            .into_iter()
            .filter(|name| is_element_available(name))
            .map(str::to_string)
            .collect()
    };

    EncoderReport {
        h264: installed(encoder_candidates(&[VideoCodec::H264])),
        recording: installed(encoder_candidates(&[
            VideoCodec::AV1,
            VideoCodec::HEVC,
            VideoCodec::H264,
        ])),
        aac: installed(AAC_ENCODERS.to_vec()),
    }
}

/// Log the encoder report (for debugging)
pub fn log_available_encoders() -> EncoderReport {
    let report = detect_encoders();
    info!(
        h264 = ?report.h264,
        recording = ?report.recording,
        aac = ?report.aac,
        "Detected encoders"
    );
    if !report.can_export() {
        warn!("No H.264 encoder installed; stories cannot be exported");
    }
    if report.aac.is_empty() {
        warn!("No AAC encoder installed; recordings with sound cannot be exported");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_cannot_export() {
        assert!(!EncoderReport::default().can_export());
        let report = EncoderReport {
            h264: vec!["x264enc".into()],
            ..Default::default()
        };
        assert!(report.can_export());
    }

    #[test]
    fn test_reported_aac_encoders_match_selection_order() {
        if gst::init().is_err() {
            return;
        }
        let report = detect_encoders();
        let mut expected = AAC_ENCODERS.iter().filter(|name| report.aac.iter().any(|a| a == *name));
        for found in &report.aac {
            assert_eq!(Some(&found.as_str()), expected.next());
        }
    }
}
