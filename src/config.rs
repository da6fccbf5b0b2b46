// SPDX-License-Identifier: GPL-3.0-only

//! Runtime configuration and the small amount of persisted state
//!
//! [`Config`] is built from defaults plus command-line overrides and is never
//! written to disk. [`PersistedState`] holds the one flag that survives
//! restarts.

use crate::constants::{app_info, story};
use crate::errors::{AppError, AppResult};
use crate::media::encoders::VideoQuality;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Pixel dimensions of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Same frame turned a quarter
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Recording length limit in seconds
    pub max_duration_secs: u64,
    /// Export canvas
    pub target: FrameSize,
    /// Export frame rate
    pub framerate: u32,
    /// Mirror the live preview horizontally (selfie mode)
    pub mirror_preview: bool,
    /// Quality of the temporary raw recording
    pub recording_quality: VideoQuality,
    /// Quality of the exported story
    pub export_quality: VideoQuality,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_duration_secs: story::DEFAULT_MAX_DURATION_SECS,
            target: FrameSize::new(story::TARGET_WIDTH, story::TARGET_HEIGHT),
            framerate: story::TARGET_FPS,
            mirror_preview: true,
            recording_quality: VideoQuality::High,
            export_quality: VideoQuality::Maximum,
        }
    }
}

impl Config {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Apply a `--duration` override
    pub fn with_max_duration(mut self, secs: Option<u64>) -> AppResult<Self> {
        if let Some(secs) = secs {
            if secs == 0 {
                return Err(AppError::Config(
                    "Recording duration must be at least one second".into(),
                ));
            }
            self.max_duration_secs = secs;
        }
        Ok(self)
    }
}

/// State persisted between runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    /// Whether the introduction has been shown once
    pub has_shown_onboarding: bool,
}

impl PersistedState {
    /// Default location under the user config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::CONFIG_DIR).join(app_info::STATE_FILE))
    }

    /// Load from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring malformed state file");
                Self::default()
            }),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No persisted state");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize state: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load() -> Self {
        Self::default_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn save(&self) -> AppResult<()> {
        let path = Self::default_path()
            .ok_or_else(|| AppError::Config("No user config directory".into()))?;
        self.save_to(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        assert_eq!(PersistedState::load_from(&path), PersistedState::default());

        let state = PersistedState {
            has_shown_onboarding: true,
        };
        state.save_to(&path).unwrap();
        assert_eq!(PersistedState::load_from(&path), state);
    }

    #[test]
    fn test_malformed_state_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(!PersistedState::load_from(&path).has_shown_onboarding);
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(Config::default().with_max_duration(Some(0)).is_err());
        let config = Config::default().with_max_duration(Some(15)).unwrap();
        assert_eq!(config.max_duration(), Duration::from_secs(15));
    }
}
