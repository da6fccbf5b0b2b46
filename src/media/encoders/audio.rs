// SPDX-License-Identifier: GPL-3.0-only

//! Audio encoder selection with quality configuration
//!
//! Raw recordings prefer Opus, the MP4 story export requires AAC.

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// Audio codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// Opus codec (preferred for recordings)
    Opus,
    /// AAC codec (MP4 deliverable)
    AAC,
}

impl AudioCodec {
    /// Get audio caps string for this codec
    pub fn caps_string(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "audio/x-opus",
            AudioCodec::AAC => "audio/mpeg,mpegversion=4",
        }
    }
}

/// Audio quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioQuality {
    /// Low quality (64 kbps)
    Low,
    /// Medium quality (96 kbps)
    Medium,
    /// High quality (128 kbps)
    High,
    /// Maximum quality (192 kbps)
    Maximum,
}

impl AudioQuality {
    /// Get bitrate in bits per second
    pub fn bitrate_bps(&self) -> i32 {
        match self {
            AudioQuality::Low => 64_000,
            AudioQuality::Medium => 96_000,
            AudioQuality::High => 128_000,
            AudioQuality::Maximum => 192_000,
        }
    }
}

/// Selected audio encoder with configuration
pub struct SelectedAudioEncoder {
    /// The encoder element
    pub encoder: gst::Element,
    /// Codec being used
    pub codec: AudioCodec,
}

/// AAC encoders in order of preference
pub const AAC_ENCODERS: &[&str] = &["avenc_aac", "fdkaacenc", "faac", "voaacenc"];

/// Select the best available audio encoder
///
/// Priority order:
/// 1. Opus (opusenc), unless `require_aac` is set
/// 2. AAC (avenc_aac, fdkaacenc, faac, voaacenc)
pub fn select_audio_encoder(
    quality: AudioQuality,
    require_aac: bool,
) -> Result<SelectedAudioEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    if !require_aac && let Ok(encoder) = gst::ElementFactory::make("opusenc").build() {
        info!(codec = "Opus", "Selected audio encoder");
        let _ = encoder.set_property("bitrate", quality.bitrate_bps());
        let _ = encoder.set_property_from_str("audio-type", "generic");
        return Ok(SelectedAudioEncoder {
            encoder,
            codec: AudioCodec::Opus,
        });
    }

    for encoder_name in AAC_ENCODERS {
        if let Ok(encoder) = gst::ElementFactory::make(encoder_name).build() {
            info!(codec = "AAC", encoder = %encoder_name, "Selected audio encoder");
            configure_aac_encoder(&encoder, encoder_name, quality);
            return Ok(SelectedAudioEncoder {
                encoder,
                codec: AudioCodec::AAC,
            });
        }
    }

    Err("No audio encoder available. Please install gstreamer1-plugins-base (opusenc) or gstreamer1-libav (avenc_aac)".to_string())
}

/// Configure AAC encoder
fn configure_aac_encoder(encoder: &gst::Element, encoder_name: &str, quality: AudioQuality) {
    let bitrate = quality.bitrate_bps();

    match encoder_name {
        "avenc_aac" | "voaacenc" | "fdkaacenc" => {
            let _ = encoder.set_property("bitrate", bitrate);
            debug!("Configured {}: bitrate={} bps", encoder_name, bitrate);
        }
        // faac takes kbps
        "faac" => {
            let _ = encoder.set_property("bitrate", bitrate / 1000);
            debug!("Configured faac: bitrate={} kbps", bitrate / 1000);
        }
        _ => {
            debug!("Unknown AAC encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_quality_bitrates() {
        assert!(AudioQuality::Low.bitrate_bps() < AudioQuality::High.bitrate_bps());
        assert_eq!(AudioQuality::Low.bitrate_bps(), 64_000);
        assert_eq!(AudioQuality::Maximum.bitrate_bps(), 192_000);
    }

    #[test]
    fn test_codec_caps() {
        assert_eq!(AudioCodec::Opus.caps_string(), "audio/x-opus");
        assert!(AudioCodec::AAC.caps_string().contains("audio/mpeg"));
    }
}
