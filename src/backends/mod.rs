// SPDX-License-Identifier: GPL-3.0-only

//! Backend layer for capture devices and platform services
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │           App Layer (StoryApp)              │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌─────────────┐    ┌──────────────────┐    │
//! │  │ Permissions │    │ Capture sessions │    │
//! │  │  (portal)   │    │   (GStreamer)    │    │
//! │  └─────────────┘    └──────────────────┘    │
//! │  ┌─────────────┐                            │
//! │  │    Audio    │                            │
//! │  │  (metering) │                            │
//! │  └─────────────┘                            │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`audio`]: Default microphone lookup and peak metering
//! - [`camera`]: Device enumeration, session construction and lifecycle
//! - [`permissions`]: Camera/microphone access gate

pub mod audio;
pub mod camera;
pub mod permissions;
