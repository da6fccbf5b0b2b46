// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Story output geometry
pub mod story {
    /// Export width in pixels (portrait)
    pub const TARGET_WIDTH: u32 = 1080;

    /// Export height in pixels (portrait)
    pub const TARGET_HEIGHT: u32 = 1920;

    /// Export frame rate
    pub const TARGET_FPS: u32 = 30;

    /// Default recording length limit in seconds
    pub const DEFAULT_MAX_DURATION_SECS: u64 = 60;
}

/// Audio metering constants
pub mod audio_level {
    /// Floor of the peak power range in dB, maps to level 0.0
    pub const MIN_DB: f64 = -160.0;

    /// Ceiling of the peak power range in dB, maps to level 1.0
    pub const MAX_DB: f64 = 0.0;
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum buffer queue size for the preview sink (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Output pixel format for the preview appsink
    pub const OUTPUT_FORMAT: &str = "RGBA";

    /// Preview frames are downscaled to this width before reaching the UI
    pub const PREVIEW_WIDTH: i32 = 480;

    /// Raw sample format handed to the recording writer and the level meter
    pub const AUDIO_FORMAT: &str = "F32LE";

    /// Get number of threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Countdown tick
    pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

    /// Audio level sampling period (10 Hz)
    pub const LEVEL_TICK: Duration = Duration::from_millis(100);

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// How long a recording writer waits for EOS to reach the muxer
    pub const EOS_TIMEOUT_SECS: u64 = 5;

    /// Discoverer timeout when probing a raw recording
    pub const DISCOVER_TIMEOUT_SECS: u64 = 10;

    /// Bus poll period of the export loop (cancellation granularity)
    pub const EXPORT_POLL_MS: u64 = 100;
}

/// File naming
pub mod file_formats {
    /// Prefix of the suggested export file name
    pub const EXPORT_PREFIX: &str = "Story_";

    /// Extension of the exported story
    pub const EXPORT_EXTENSION: &str = "mp4";

    /// Build the suggested file name for an export finished at `timestamp` (Unix seconds)
    pub fn export_file_name(timestamp: i64) -> String {
        format!("{}{}.{}", EXPORT_PREFIX, timestamp, EXPORT_EXTENSION)
    }
}

/// Application identity
pub mod app_info {
    /// Directory name under the user config dir
    pub const CONFIG_DIR: &str = "storycam";

    /// Persisted state file name
    pub const STATE_FILE: &str = "state.json";

    /// Version string baked in by build.rs
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
