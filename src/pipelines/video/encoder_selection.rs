// SPDX-License-Identifier: GPL-3.0-only

//! Encoder selection for the raw recording and the story export

use crate::config::FrameSize;
use crate::media::encoders::{
    AudioQuality, EncoderPurpose, VideoCodec, VideoQuality,
    audio::{SelectedAudioEncoder, select_audio_encoder},
    video::{SelectedVideoEncoder, select_video_encoder},
};

/// Configuration for encoder selection
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Video quality preset
    pub video_quality: VideoQuality,
    /// Audio quality preset
    pub audio_quality: AudioQuality,
    /// Frame size used for bitrate calculation
    pub size: FrameSize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            video_quality: VideoQuality::High,
            audio_quality: AudioQuality::High,
            size: FrameSize::new(1920, 1080),
        }
    }
}

/// Selected encoders for one output file
pub struct SelectedEncoders {
    /// Video encoder configuration
    pub video: SelectedVideoEncoder,
    /// Audio encoder configuration (None when the output is silent)
    pub audio: Option<SelectedAudioEncoder>,
}

fn pick_audio(config: &EncoderConfig, enable_audio: bool, require_aac: bool) -> Option<SelectedAudioEncoder> {
    if !enable_audio {
        return None;
    }
    match select_audio_encoder(config.audio_quality, require_aac) {
        Ok(encoder) => Some(encoder),
        Err(e) => {
            tracing::warn!("Failed to select audio encoder: {}. Continuing without audio.", e);
            None
        }
    }
}

/// Best available encoders for the temporary recording (any codec, low latency)
pub fn select_recording_encoders(
    config: &EncoderConfig,
    enable_audio: bool,
) -> Result<SelectedEncoders, String> {
    let video = select_video_encoder(
        &[VideoCodec::AV1, VideoCodec::HEVC, VideoCodec::H264],
        EncoderPurpose::Live,
        config.video_quality,
        config.size.width,
        config.size.height,
    )?;
    // mp4mux only carries Opus in recent GStreamer, keep AAC there
    let require_aac = video.container.muxer_name() == "mp4mux";
    let audio = pick_audio(config, enable_audio, require_aac);
    Ok(SelectedEncoders { video, audio })
}

/// H.264 + AAC encoders for the MP4 story export
///
/// Fails rather than export a source with audio as a silent story.
pub fn select_export_encoders(
    config: &EncoderConfig,
    enable_audio: bool,
) -> Result<SelectedEncoders, String> {
    let video = select_video_encoder(
        &[VideoCodec::H264],
        EncoderPurpose::Export,
        config.video_quality,
        config.size.width,
        config.size.height,
    )?;
    let audio = if enable_audio {
        Some(select_audio_encoder(config.audio_quality, true)?)
    } else {
        None
    };
    Ok(SelectedEncoders { video, audio })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_keeps_source_audio() {
        if gstreamer::init().is_err() {
            return;
        }
        let config = EncoderConfig::default();
        if let Ok(selected) = select_export_encoders(&config, true) {
            let audio = selected.audio.expect("audio source exported without an audio encoder");
            assert_eq!(audio.codec, crate::media::encoders::AudioCodec::AAC);
        }
        if let Ok(selected) = select_export_encoders(&config, false) {
            assert!(selected.audio.is_none());
        }
    }

    #[test]
    fn test_default_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.size, FrameSize::new(1920, 1080));
        assert_eq!(config.video_quality, VideoQuality::High);
    }
}
