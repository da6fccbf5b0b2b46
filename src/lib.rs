// SPDX-License-Identifier: GPL-3.0-only

//! storycam - record vertical video stories
//!
//! Captures a camera and a microphone, records a bounded clip and exports it
//! to a 1080x1920, 30 fps MP4 that the user saves wherever they like.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Coordinator, recorder and save flow
//! - [`backends`]: Device enumeration, permissions and capture sessions
//! - [`media`]: Encoder selection
//! - [`pipelines`]: Raw recording writer and the story export
//! - [`config`]: Recording settings and persisted UI state
//! - [`storage`]: Temporary files and the final save
//! - [`terminal`]: Terminal front end
//!
//! # Example
//!
//! ```ignore
//! // Typically run via:
//! // storycam
//! // storycam record --duration 15 --output ~/Videos
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod storage;
pub mod terminal;

// Re-export commonly used types
pub use app::{AppNotice, StoryApp};
pub use config::Config;
pub use errors::{AppError, AppResult};
