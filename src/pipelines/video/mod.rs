// SPDX-License-Identifier: GPL-3.0-only

//! Temporary recording pipeline
//!
//! - Selects the best available encoder (hardware preferred)
//! - Writes raw session samples to a seekable file
//! - Keeps audio and video aligned to the first recorded frame

pub mod encoder_selection;
pub mod muxer;
pub mod writer;

pub use encoder_selection::{EncoderConfig, select_export_encoders, select_recording_encoders};
pub use writer::RecordingWriter;
