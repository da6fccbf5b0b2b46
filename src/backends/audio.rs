// SPDX-License-Identifier: GPL-3.0-only

//! Microphone helpers: PipeWire default source lookup and peak metering

use crate::backends::camera::LevelSource;
use crate::constants::audio_level;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Node name of PipeWire's default audio source, if PipeWire is running
pub fn default_source_node() -> Option<String> {
    let output = match Command::new("pw-dump").output() {
        Ok(output) => output,
        Err(e) => {
            debug!("pw-dump unavailable: {}", e);
            return None;
        }
    };

    if !output.status.success() {
        warn!("pw-dump command failed");
        return None;
    }

    match std::str::from_utf8(&output.stdout) {
        Ok(stdout) => parse_default_source(stdout),
        Err(e) => {
            warn!("Failed to parse pw-dump output: {}", e);
            None
        }
    }
}

/// Extract the default source node name from `pw-dump` JSON
///
/// Reads the `default` metadata object; `default.audio.source` wins over
/// `default.configured.audio.source`.
pub fn parse_default_source(pw_dump: &str) -> Option<String> {
    let objects: Vec<serde_json::Value> = match serde_json::from_str(pw_dump) {
        Ok(objects) => objects,
        Err(e) => {
            warn!("Failed to parse JSON from pw-dump: {}", e);
            return None;
        }
    };

    let metadata = objects.iter().find(|object| {
        object.get("type").and_then(|v| v.as_str()) == Some("PipeWire:Interface:Metadata")
            && object
                .get("props")
                .and_then(|p| p.get("metadata.name"))
                .and_then(|v| v.as_str())
                == Some("default")
    })?;

    let entries = metadata.get("metadata")?.as_array()?;
    let lookup = |key: &str| {
        entries
            .iter()
            .find(|entry| entry.get("key").and_then(|v| v.as_str()) == Some(key))
            .and_then(|entry| entry.get("value"))
            .and_then(|value| value.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let name = lookup("default.audio.source").or_else(|| lookup("default.configured.audio.source"));
    if let Some(name) = &name {
        debug!(default_source = %name, "Found default audio source from metadata");
    }
    name
}

/// Peak power in dB of interleaved little-endian f32 samples
///
/// Silence (or an empty buffer) reports the meter floor.
pub fn peak_db_from_f32le(bytes: &[u8]) -> f64 {
    let peak = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]).abs())
        .filter(|sample| sample.is_finite())
        .fold(0.0f32, f32::max);

    if peak <= 0.0 {
        return audio_level::MIN_DB;
    }
    (20.0 * (peak as f64).log10()).clamp(audio_level::MIN_DB, audio_level::MAX_DB)
}

/// Latest peak power of the session microphone
///
/// Written from the audio streaming thread, read by the recorder's sampler.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    peak_bits: Arc<AtomicU64>,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self {
            peak_bits: Arc::new(AtomicU64::new(audio_level::MIN_DB.to_bits())),
        }
    }
}

impl LevelMeter {
    /// Record one buffer of F32LE samples
    pub fn observe(&self, bytes: &[u8]) {
        self.set(peak_db_from_f32le(bytes));
    }

    pub fn set(&self, db: f64) {
        self.peak_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.set(audio_level::MIN_DB);
    }
}

impl LevelSource for LevelMeter {
    fn peak_db(&self) -> f64 {
        f64::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PW_DUMP: &str = r#"[
        {"id": 30, "type": "PipeWire:Interface:Node",
         "info": {"props": {"media.class": "Audio/Source", "node.name": "alsa_input.usb"}}},
        {"id": 40, "type": "PipeWire:Interface:Metadata",
         "props": {"metadata.name": "settings"},
         "metadata": [{"key": "default.audio.source", "value": {"name": "wrong"}}]},
        {"id": 41, "type": "PipeWire:Interface:Metadata",
         "props": {"metadata.name": "default"},
         "metadata": [
            {"key": "default.configured.audio.source", "value": {"name": "alsa_input.pci"}},
            {"key": "default.audio.source", "value": {"name": "alsa_input.usb"}}
         ]}
    ]"#;

    #[test]
    fn test_parse_default_source_prefers_runtime_default() {
        assert_eq!(
            parse_default_source(PW_DUMP).as_deref(),
            Some("alsa_input.usb")
        );
    }

    #[test]
    fn test_parse_default_source_handles_garbage() {
        assert_eq!(parse_default_source("not json"), None);
        assert_eq!(parse_default_source("[]"), None);
    }

    #[test]
    fn test_peak_of_silence_is_floor() {
        let silence = [0u8; 64];
        assert_eq!(peak_db_from_f32le(&silence), audio_level::MIN_DB);
        assert_eq!(peak_db_from_f32le(&[]), audio_level::MIN_DB);
    }

    #[test]
    fn test_peak_of_full_scale_is_zero_db() {
        let bytes: Vec<u8> = [0.25f32, -1.0, 0.5]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        assert!(peak_db_from_f32le(&bytes).abs() < 1e-9);
    }

    #[test]
    fn test_half_scale_is_about_minus_six_db() {
        let bytes = 0.5f32.to_le_bytes();
        let db = peak_db_from_f32le(&bytes);
        assert!((db + 6.0206).abs() < 0.001, "got {db}");
    }

    #[test]
    fn test_meter_reports_last_observation() {
        let meter = LevelMeter::default();
        assert_eq!(meter.peak_db(), audio_level::MIN_DB);
        meter.observe(&1.0f32.to_le_bytes());
        assert!(meter.peak_db().abs() < 1e-9);
        meter.reset();
        assert_eq!(meter.peak_db(), audio_level::MIN_DB);
    }
}
