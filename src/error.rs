// Error types for the metronome/recording engine
//
// This module defines custom error types for transport and recording
// operations, providing structured error handling with numeric error codes
// suitable for host-boundary reporting.

use log::error;
use std::fmt;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling at the
/// host boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Audio/transport error code constants
///
/// These constants provide a single source of truth for error codes shared
/// between the engine and its host.
///
/// Error code range: 1001-1009
pub struct AudioErrorCodes;

impl AudioErrorCodes {
    /// BPM value is invalid (must be > 0, typically 40-240)
    pub const BPM_INVALID: i32 = 1001;

    /// Volume is outside the accepted 0..=100 range
    pub const VOLUME_INVALID: i32 = 1002;

    /// Microphone gain is outside the accepted 0.0..=1.0 range
    pub const MIC_GAIN_INVALID: i32 = 1003;

    /// Engine is already running
    pub const ALREADY_RUNNING: i32 = 1004;

    /// Engine is not running
    pub const NOT_RUNNING: i32 = 1005;

    /// Device or format configuration failed
    pub const CONFIGURATION_FAILED: i32 = 1006;

    /// Microphone permission denied
    pub const PERMISSION_DENIED: i32 = 1007;

    /// A device operation failed with an OS status code
    pub const DEVICE_FAILURE: i32 = 1008;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1009;
}

/// Recording error code constants
///
/// Error code range: 2001-2005
pub struct RecordingErrorCodes;

impl RecordingErrorCodes {
    /// stop_recording called while no recording is active
    pub const NOT_RECORDING: i32 = 2001;

    /// start_recording called while a recording is already active
    pub const ALREADY_RECORDING: i32 = 2002;

    /// Recording requires a running engine
    pub const ENGINE_NOT_RUNNING: i32 = 2003;

    /// File I/O failed
    pub const IO_ERROR: i32 = 2004;

    /// The writer worker failed or panicked
    pub const WRITER_FAILED: i32 = 2005;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and must never be called from the render
/// thread.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=Engine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Log a recording error with structured context
pub fn log_recording_error(err: &RecordingError, context: &str) {
    error!(
        "Recording error in {}: code={}, component=Recorder, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio/transport errors
///
/// These errors cover engine lifecycle, parameter validation, and device
/// access.
///
/// Error code range: 1001-1009
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// BPM value is invalid (must be > 0, typically 40-240)
    BpmInvalid { bpm: u32 },

    /// Volume is outside the accepted 0..=100 range
    VolumeInvalid { volume: u32 },

    /// Microphone gain is outside the accepted 0.0..=1.0 range
    MicGainInvalid { gain: f32 },

    /// Engine is already running
    AlreadyRunning,

    /// Engine is not running
    NotRunning,

    /// Device or format configuration failed
    ConfigurationFailed { reason: String },

    /// Microphone permission denied
    PermissionDenied,

    /// A device operation failed with an OS status code
    DeviceFailure { code: i32, context: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::BpmInvalid { .. } => AudioErrorCodes::BPM_INVALID,
            AudioError::VolumeInvalid { .. } => AudioErrorCodes::VOLUME_INVALID,
            AudioError::MicGainInvalid { .. } => AudioErrorCodes::MIC_GAIN_INVALID,
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::ConfigurationFailed { .. } => AudioErrorCodes::CONFIGURATION_FAILED,
            AudioError::PermissionDenied => AudioErrorCodes::PERMISSION_DENIED,
            AudioError::DeviceFailure { .. } => AudioErrorCodes::DEVICE_FAILURE,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::BpmInvalid { bpm } => {
                format!("BPM must be greater than 0 (got {})", bpm)
            }
            AudioError::VolumeInvalid { volume } => {
                format!("Volume must be within 0..=100 (got {})", volume)
            }
            AudioError::MicGainInvalid { gain } => {
                format!("Microphone gain must be within 0.0..=1.0 (got {})", gain)
            }
            AudioError::AlreadyRunning => {
                "Engine already running. Call destroy() first.".to_string()
            }
            AudioError::NotRunning => "Engine not running. Call init() first.".to_string(),
            AudioError::ConfigurationFailed { reason } => {
                format!("Device configuration failed: {}", reason)
            }
            AudioError::PermissionDenied => "Microphone permission denied".to_string(),
            AudioError::DeviceFailure { code, context } => {
                format!("Device operation failed ({}): status {}", context, code)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

/// Recording errors
///
/// These errors cover the recording session lifecycle and the background
/// file writer.
///
/// Error code range: 2001-2005
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingError {
    /// stop_recording called while no recording is active
    NotRecording,

    /// start_recording called while a recording is already active
    AlreadyRecording,

    /// Recording requires a running engine
    EngineNotRunning,

    /// File I/O failed
    Io { details: String },

    /// The writer worker failed or panicked
    WriterFailed { reason: String },
}

impl ErrorCode for RecordingError {
    fn code(&self) -> i32 {
        match self {
            RecordingError::NotRecording => RecordingErrorCodes::NOT_RECORDING,
            RecordingError::AlreadyRecording => RecordingErrorCodes::ALREADY_RECORDING,
            RecordingError::EngineNotRunning => RecordingErrorCodes::ENGINE_NOT_RUNNING,
            RecordingError::Io { .. } => RecordingErrorCodes::IO_ERROR,
            RecordingError::WriterFailed { .. } => RecordingErrorCodes::WRITER_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            RecordingError::NotRecording => {
                "No recording in progress. Call start_recording() first.".to_string()
            }
            RecordingError::AlreadyRecording => {
                "Recording already in progress. Call stop_recording() first.".to_string()
            }
            RecordingError::EngineNotRunning => {
                "Recording requires a running engine. Call init() first.".to_string()
            }
            RecordingError::Io { details } => format!("Recording I/O error: {}", details),
            RecordingError::WriterFailed { reason } => {
                format!("Recording writer failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordingError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RecordingError {}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::Io {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for RecordingError {
    fn from(err: hound::Error) -> Self {
        RecordingError::Io {
            details: err.to_string(),
        }
    }
}
