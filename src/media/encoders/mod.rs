// SPDX-License-Identifier: GPL-3.0-only

//! Media encoder selection and configuration
//!
//! - Hardware encoder priority (AV1 > HEVC > H.264) for raw recordings
//! - H.264 + AAC for the exported story
//! - Quality presets

pub mod audio;
pub mod detection;
pub mod video;

pub use audio::{AudioCodec, AudioQuality, select_audio_encoder};
pub use detection::{EncoderReport, log_available_encoders};
pub use video::{EncoderPurpose, VideoCodec, VideoQuality, select_video_encoder};
