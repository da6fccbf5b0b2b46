// SPDX-License-Identifier: GPL-3.0-only

//! Video encoder selection with hardware acceleration priority
//!
//! Two callers pick encoders here:
//! - the raw recording writer, which takes the best available codec and
//!   favours low latency
//! - the story export, which must produce H.264 for the MP4 deliverable and
//!   favours quality over speed

use gstreamer as gst;
use gstreamer::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Video codec types in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// AV1 codec (best compression, modern)
    AV1,
    /// HEVC/H.265 codec (good compression)
    HEVC,
    /// H.264 codec (best compatibility)
    H264,
}

impl VideoCodec {
    /// Get the container format for this codec
    pub fn container_format(&self) -> ContainerFormat {
        match self {
            VideoCodec::AV1 => ContainerFormat::WebM,
            VideoCodec::HEVC => ContainerFormat::MP4,
            VideoCodec::H264 => ContainerFormat::MP4,
        }
    }

    /// Get the file extension for this codec's container
    pub fn file_extension(&self) -> &'static str {
        self.container_format().extension()
    }

    /// Get the parser element name
    pub fn parser_name(&self) -> &'static str {
        match self {
            VideoCodec::AV1 => "av1parse",
            VideoCodec::HEVC => "h265parse",
            VideoCodec::H264 => "h264parse",
        }
    }
}

/// Container formats for video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MP4 container (good compatibility)
    MP4,
    /// WebM container (open format)
    WebM,
}

impl ContainerFormat {
    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }

    /// Get muxer element name
    pub fn muxer_name(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4mux",
            ContainerFormat::WebM => "webmmux",
        }
    }
}

/// Video quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoQuality {
    /// Low quality (high compression, smaller files)
    Low,
    /// Medium quality (balanced)
    Medium,
    /// High quality (low compression, larger files)
    #[default]
    High,
    /// Maximum quality (minimal compression)
    Maximum,
}

impl VideoQuality {
    /// Get bitrate in kbps for given quality
    ///
    /// 1080x1920 (2M pixels) gives Low ~4 Mbps, Medium ~8, High ~12, Maximum ~20.
    pub fn bitrate_kbps(&self, width: u32, height: u32) -> u32 {
        let pixels = width * height;
        let base_bitrate = match self {
            VideoQuality::Low => (pixels as f64 * 0.002) as u32,
            VideoQuality::Medium => (pixels as f64 * 0.004) as u32,
            VideoQuality::High => (pixels as f64 * 0.006) as u32,
            VideoQuality::Maximum => (pixels as f64 * 0.010) as u32,
        };
        base_bitrate.clamp(500, 50000)
    }

    /// Get x264/x265 preset name
    pub fn x264_preset(&self) -> &'static str {
        match self {
            VideoQuality::Low => "veryfast",
            VideoQuality::Medium => "fast",
            VideoQuality::High => "medium",
            VideoQuality::Maximum => "slow",
        }
    }
}

/// What the encoder is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderPurpose {
    /// Encoding live camera frames to the temporary recording
    Live,
    /// Offline transcode of the finished recording
    Export,
}

/// Selected video encoder with configuration
pub struct SelectedVideoEncoder {
    /// The encoder element
    pub encoder: gst::Element,
    /// Optional parser element
    pub parser: Option<gst::Element>,
    /// Muxer element
    pub muxer: gst::Element,
    /// Codec being used
    pub codec: VideoCodec,
    /// Container format
    pub container: ContainerFormat,
    /// File extension
    pub extension: &'static str,
}

/// Encoders tried in order: (element, codec, hardware)
const ENCODER_PRIORITY: &[(&str, VideoCodec, bool)] = &[
    // Hardware AV1
    ("vaav1enc", VideoCodec::AV1, true),
    ("nvav1enc", VideoCodec::AV1, true),
    // Hardware HEVC
    ("vah265enc", VideoCodec::HEVC, true),
    ("vaapih265enc", VideoCodec::HEVC, true),
    ("nvh265enc", VideoCodec::HEVC, true),
    ("v4l2h265enc", VideoCodec::HEVC, true),
    // Hardware H.264
    ("vah264enc", VideoCodec::H264, true),
    ("vaapih264enc", VideoCodec::H264, true),
    ("nvh264enc", VideoCodec::H264, true),
    ("v4l2h264enc", VideoCodec::H264, true),
    // Software HEVC
    ("x265enc", VideoCodec::HEVC, false),
    // Software H.264
    ("x264enc", VideoCodec::H264, false),
    ("openh264enc", VideoCodec::H264, false),
];

/// Candidate encoder element names for the allowed codecs, in priority order
pub fn encoder_candidates(allowed: &[VideoCodec]) -> Vec<&'static str> {
    ENCODER_PRIORITY
        .iter()
        .filter(|(_, codec, _)| allowed.contains(codec))
        .map(|(name, _, _)| *name)
        .collect()
}

/// Select the best available video encoder among `allowed` codecs
///
/// # Returns
/// * `Ok(SelectedVideoEncoder)` - Selected encoder with parser and muxer
/// * `Err(String)` - Error message if no encoder available
pub fn select_video_encoder(
    allowed: &[VideoCodec],
    purpose: EncoderPurpose,
    quality: VideoQuality,
    width: u32,
    height: u32,
) -> Result<SelectedVideoEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    for (encoder_name, codec, is_hardware) in ENCODER_PRIORITY {
        if !allowed.contains(codec) {
            continue;
        }
        let Ok(encoder) = gst::ElementFactory::make(encoder_name).build() else {
            continue;
        };

        info!(
            encoder = %encoder_name,
            codec = ?codec,
            hardware = is_hardware,
            purpose = ?purpose,
            "Selected video encoder"
        );

        configure_video_encoder(&encoder, encoder_name, purpose, quality, width, height);

        let parser = match gst::ElementFactory::make(codec.parser_name()).build() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Failed to create parser {}: {}", codec.parser_name(), e);
                None
            }
        };

        let container = codec.container_format();
        let muxer = gst::ElementFactory::make(container.muxer_name())
            .build()
            .map_err(|e| format!("Failed to create muxer {}: {}", container.muxer_name(), e))?;

        return Ok(SelectedVideoEncoder {
            encoder,
            parser,
            muxer,
            codec: *codec,
            container,
            extension: codec.file_extension(),
        });
    }

    Err("No video encoder available. Please install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264".to_string())
}

/// Configure encoder based on type, purpose and quality
fn configure_video_encoder(
    encoder: &gst::Element,
    encoder_name: &str,
    purpose: EncoderPurpose,
    quality: VideoQuality,
    width: u32,
    height: u32,
) {
    let bitrate = quality.bitrate_kbps(width, height);

    match encoder_name {
        "x264enc" | "x265enc" => {
            let _ = encoder.set_property_from_str("speed-preset", quality.x264_preset());
            if purpose == EncoderPurpose::Live {
                let _ = encoder.set_property_from_str("tune", "zerolatency");
            }
            let _ = encoder.set_property("bitrate", bitrate);
            debug!(
                "Configured {}: preset={}, bitrate={} kbps",
                encoder_name,
                quality.x264_preset(),
                bitrate
            );
        }

        // Old VA-API plugin uses an integer rate-control enum
        "vaapih264enc" | "vaapih265enc" => {
            let _ = encoder.set_property("rate-control", 2u32);
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured VA-API encoder: bitrate={} kbps", bitrate);
        }

        "vah264enc" | "vah265enc" | "vaav1enc" => {
            let _ = encoder.set_property_from_str("rate-control", "cbr");
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured VA encoder: bitrate={} kbps", bitrate);
        }

        "nvh264enc" | "nvh265enc" | "nvav1enc" => {
            let _ = encoder.set_property("bitrate", bitrate);
            let _ = encoder.set_property_from_str("rc-mode", "vbr");
            let preset = match (purpose, quality) {
                (EncoderPurpose::Export, _) => "hq",
                (_, VideoQuality::Low | VideoQuality::Medium) => "fast",
                (_, VideoQuality::High | VideoQuality::Maximum) => "hq",
            };
            let _ = encoder.set_property_from_str("preset", preset);
            debug!(
                "Configured NVIDIA encoder: preset={}, bitrate={} kbps",
                preset, bitrate
            );
        }

        "v4l2h264enc" | "v4l2h265enc" => {
            debug!("Using V4L2 encoder with default configuration");
        }

        "openh264enc" => {
            let _ = encoder.set_property_from_str("rate-control", "bitrate");
            let _ = encoder.set_property("bitrate", bitrate * 1000);
            let usage = match purpose {
                EncoderPurpose::Live => "camera",
                EncoderPurpose::Export => "screen",
            };
            let _ = encoder.set_property_from_str("usage-type", usage);
            debug!("Configured openh264enc: bitrate={} bps", bitrate * 1000);
        }

        _ => {
            debug!("Unknown encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_extensions() {
        assert_eq!(VideoCodec::H264.file_extension(), "mp4");
        assert_eq!(VideoCodec::HEVC.file_extension(), "mp4");
        assert_eq!(VideoCodec::AV1.file_extension(), "webm");
    }

    #[test]
    fn test_quality_bitrates() {
        let low = VideoQuality::Low.bitrate_kbps(1080, 1920);
        let max = VideoQuality::Maximum.bitrate_kbps(1080, 1920);
        assert!(low < max);
        assert!(low >= 500);
        assert!(max <= 50000);
    }

    #[test]
    fn test_export_candidates_are_h264_only() {
        let candidates = encoder_candidates(&[VideoCodec::H264]);
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|name| name.contains("264")));
        // Hardware first, software fallback last
        assert_eq!(candidates.last(), Some(&"openh264enc"));
    }

    #[test]
    fn test_container_formats() {
        assert_eq!(ContainerFormat::MP4.muxer_name(), "mp4mux");
        assert_eq!(ContainerFormat::WebM.muxer_name(), "webmmux");
    }
}
