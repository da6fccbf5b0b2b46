// SPDX-License-Identifier: GPL-3.0-only

//! Media processing utilities
//!
//! - [`encoders`]: Video/audio encoder selection and configuration

pub mod encoders;
