// SPDX-License-Identifier: GPL-3.0-only

//! Capture sessions
//!
//! ```text
//! ┌──────────────────────┐
//! │  StoryApp / Recorder │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureSessionManager│  ← permissions, single live session, swaps
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureBackend trait │  ← builds one LiveSession per device pair
//! └──────────┬───────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │ GStreamer │  ← concrete implementation
//!      └───────────┘
//! ```

pub mod enumeration;
pub mod manager;
pub mod output;
pub mod pipeline;
pub mod types;

pub use enumeration::list_devices;
pub use manager::{CaptureSessionManager, SessionInfo};
pub use pipeline::GstCaptureBackend;
pub use types::*;

use crate::errors::{DeviceError, RecordingError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Completes a file that no longer receives samples; may block
pub type Finalize = Box<dyn FnOnce() -> Result<PathBuf, RecordingError> + Send>;

/// File output of a live session
///
/// Bytes only flow to disk between [`begin`](Self::begin) and
/// [`end`](Self::end).
pub trait RecordingSink: Send + Sync {
    /// Start writing at `path`; returns the path actually written
    fn begin(&self, path: &Path) -> Result<PathBuf, RecordingError>;

    /// Stop feeding the current file and hand back its finalizer
    ///
    /// Returns without blocking. A `begin` right after starts a new file
    /// even while the old one is still being finalized.
    fn end(&self) -> Result<Finalize, RecordingError>;

    fn is_recording(&self) -> bool;
}

/// Instantaneous microphone peak power
pub trait LevelSource: Send + Sync {
    /// Peak power in dB, `-160.0` for silence
    fn peak_db(&self) -> f64;
}

/// One wired-up capture graph: one camera, one microphone, one file output
pub trait LiveSession: Send {
    /// Begin capturing; returns the preview feed once running
    fn start(&mut self) -> Result<FrameReceiver, DeviceError>;

    /// Stop capturing
    fn stop(&mut self);

    /// Remove every input and output so the devices are released
    fn unwire(&mut self);

    fn output(&self) -> Arc<dyn RecordingSink>;

    fn level(&self) -> Arc<dyn LevelSource>;
}

/// Builds sessions for a device pair
pub trait CaptureBackend: Send + Sync {
    /// Wire one video input, one audio input and the file output
    ///
    /// On failure nothing is left wired.
    fn build(&self, video: &Device, audio: &Device) -> Result<Box<dyn LiveSession>, DeviceError>;
}
