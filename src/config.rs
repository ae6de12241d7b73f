//! Configuration management for dynamic parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Ring sizing, writer
//! cadence, and latency compensation inputs can be adjusted via the config
//! file for rapid experimentation on different devices.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub recording: RecordingConfig,
}

/// Audio engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Largest render block the engine processes in one pass; longer device
    /// callbacks are split into chunks of this size
    pub max_block_frames: usize,
    /// Capacity of the microphone capture queue in seconds of stereo audio
    pub capture_queue_seconds: f32,
    /// Window after a beat boundary within which a beat transition is
    /// announced exactly once
    pub beat_guard_samples: u32,
    /// Input-path latency reported by the device-configuration collaborator,
    /// in milliseconds. Overrides the backend's own estimate when set.
    pub input_latency_override_ms: Option<f32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_block_frames: 4096,
            capture_queue_seconds: 0.5,
            beat_guard_samples: 100,
            input_latency_override_ms: None,
        }
    }
}

/// Recording pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Record queue capacity in seconds of stereo audio. Must cover writer
    /// scheduling stalls; overruns beyond this are counted and reported.
    pub ring_seconds: f32,
    /// Scratch buffer size used by the writer worker per drain pass
    pub writer_chunk_samples: usize,
    /// Idle sleep between writer drain passes when the queue is empty
    pub writer_idle_sleep_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            ring_seconds: 5.0,
            writer_chunk_samples: 8192,
            writer_idle_sleep_ms: 1,
        }
    }
}

impl Default for AppConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration, or the defaults if the file doesn't exist or
    /// contains invalid JSON
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(_) => {
                log::info!(
                    "[Config] No config file at {:?}, using defaults",
                    path.as_ref()
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the conventional location
    pub fn load() -> Self {
        Self::load_from_file("metronome_recorder.json")
    }

    /// Record queue capacity in interleaved stereo samples at `sample_rate`
    pub fn ring_capacity_samples(&self, sample_rate: u32) -> usize {
        ((self.recording.ring_seconds * sample_rate as f32) as usize).max(2) * 2
    }

    /// Capture queue capacity in interleaved stereo samples at `sample_rate`
    pub fn capture_capacity_samples(&self, sample_rate: u32) -> usize {
        ((self.audio.capture_queue_seconds * sample_rate as f32) as usize)
            .max(self.audio.max_block_frames)
            * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio.max_block_frames, 4096);
        assert_eq!(config.audio.beat_guard_samples, 100);
        assert!(config.audio.input_latency_override_ms.is_none());
        assert_eq!(config.recording.ring_seconds, 5.0);
        assert_eq!(config.recording.writer_idle_sleep_ms, 1);
    }

    #[test]
    fn test_ring_capacity_covers_five_seconds() {
        let config = AppConfig::default();
        // 5 seconds of stereo at 48 kHz
        assert_eq!(config.ring_capacity_samples(48000), 480_000);
    }

    #[test]
    fn test_capture_capacity_at_least_one_block() {
        let mut config = AppConfig::default();
        config.audio.capture_queue_seconds = 0.0;
        assert!(config.capture_capacity_samples(48000) >= config.audio.max_block_frames * 2);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/metronome_recorder.json");
        assert_eq!(config.recording.ring_seconds, 5.0);
    }

    #[test]
    fn test_load_from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut config = AppConfig::default();
        config.recording.ring_seconds = 2.5;
        config.audio.input_latency_override_ms = Some(5.0);
        write!(file, "{}", serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = AppConfig::load_from_file(file.path());
        assert_eq!(loaded.recording.ring_seconds, 2.5);
        assert_eq!(loaded.audio.input_latency_override_ms, Some(5.0));
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();

        let loaded = AppConfig::load_from_file(file.path());
        assert_eq!(loaded.recording.ring_seconds, 5.0);
    }
}
