// SPDX-License-Identifier: GPL-3.0-only

//! Media pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Session      │ ──▶ │  RecordingWriter  │ ──▶ │  Raw file    │
//! │ appsinks     │     │  (any codec)      │     │  (temp dir)  │
//! └──────────────┘     └───────────────────┘     └──────┬───────┘
//!                                                       │
//! ┌──────────────┐     ┌───────────────────┐            │
//! │  Story MP4   │ ◀── │  Export           │ ◀──────────┘
//! │  1080x1920   │     │  flip/scale/crop  │
//! └──────────────┘     └───────────────────┘
//! ```
//!
//! - [`video`]: encoder selection and the raw recording writer
//! - [`transcode`]: probing, geometry and the story export

pub mod transcode;
pub mod video;
