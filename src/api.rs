// Public host-facing API for the metronome/recording engine
//
// The host bridge (method channel, FFI, RPC) binds these functions; they
// operate on a single process-wide engine handle. Beat events stream out
// through an async broadcast channel rather than a host back-pointer.

use once_cell::sync::Lazy;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::engine::core::{EngineHandle, TelemetryEvent};
use crate::error::{AudioError, RecordingError};

pub mod types;

pub use types::{EngineStatus, RecordingSummary};

// Re-export error code constants for host exposure
pub use crate::error::{AudioErrorCodes, RecordingErrorCodes};

/// Global engine handle - single dependency injection container
///
/// Consolidates the device backend, shared parameters, and recording state
/// into one process-wide object. Hosts needing a private engine construct
/// [`EngineHandle`] directly instead of going through these functions.
static ENGINE_HANDLE: Lazy<EngineHandle> = Lazy::new(EngineHandle::new);

/// Initialize logging for the host process. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env().try_init();
}

/// Get the version of the engine crate.
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize the engine with decoded click PCM and transport parameters.
///
/// Decoding stays on the host side: `normal_click` and `accent_click` are
/// mono f32 PCM at `sample_rate`. An empty normal click selects the built-in
/// noise burst; an empty accent click disables accents.
///
/// # Errors
/// - `BpmInvalid` - bpm must be > 0
/// - `VolumeInvalid` - volume must be within 0..=100
/// - `AlreadyRunning` - call destroy() before re-initializing
/// - `ConfigurationFailed` / `DeviceFailure` - the device could not start
pub fn init(
    normal_click: Vec<f32>,
    accent_click: Vec<f32>,
    bpm: u32,
    time_signature: u32,
    volume: u32,
    sample_rate: u32,
) -> Result<(), AudioError> {
    init_logging();
    ENGINE_HANDLE.init(
        normal_click,
        accent_click,
        bpm,
        time_signature,
        volume,
        sample_rate,
    )
}

/// Start click playback.
pub fn play() -> Result<(), AudioError> {
    ENGINE_HANDLE.play()
}

/// Pause click playback, keeping the transport position.
pub fn pause() -> Result<(), AudioError> {
    ENGINE_HANDLE.pause()
}

/// Stop click playback and rewind to the beginning.
pub fn stop() -> Result<(), AudioError> {
    ENGINE_HANDLE.stop()
}

pub fn is_playing() -> bool {
    ENGINE_HANDLE.is_playing()
}

/// Update the tempo. Takes effect at the next render block; the beat grid
/// re-anchors so no click is duplicated or skipped.
pub fn set_bpm(bpm: u32) -> Result<(), AudioError> {
    ENGINE_HANDLE.set_bpm(bpm)
}

pub fn get_bpm() -> u32 {
    ENGINE_HANDLE.get_bpm()
}

/// Update the time signature. Values <= 1 disable the accent click.
pub fn set_time_signature(time_signature: u32) -> Result<(), AudioError> {
    ENGINE_HANDLE.set_time_signature(time_signature)
}

pub fn get_time_signature() -> u32 {
    ENGINE_HANDLE.get_time_signature()
}

/// Update the click volume (0..=100).
pub fn set_volume(volume: u32) -> Result<(), AudioError> {
    ENGINE_HANDLE.set_volume(volume)
}

pub fn get_volume() -> u32 {
    ENGINE_HANDLE.get_volume()
}

/// Replace the click sounds while running. `None` keeps the current buffer.
pub fn set_audio_file(
    normal_click: Option<Vec<f32>>,
    accent_click: Option<Vec<f32>>,
) -> Result<(), AudioError> {
    ENGINE_HANDLE.set_click_sounds(normal_click, accent_click)
}

/// Open the microphone input path.
///
/// # Errors
/// - `PermissionDenied` - the platform refused microphone access
/// - `NotRunning` - init() has not been called
pub fn enable_microphone() -> Result<(), AudioError> {
    ENGINE_HANDLE.enable_microphone()
}

/// Set the microphone gain applied to both the record mix and the monitor
/// mix (0.0..=1.0).
pub fn set_mic_volume(gain: f32) -> Result<(), AudioError> {
    ENGINE_HANDLE.set_mic_gain(gain)
}

/// Toggle live monitoring of the microphone while recording.
pub fn set_monitoring(enabled: bool) -> Result<(), AudioError> {
    ENGINE_HANDLE.set_monitoring(enabled)
}

/// Arm a recording to `path`. Returns true when the session armed.
pub fn start_recording(path: String) -> Result<bool, RecordingError> {
    ENGINE_HANDLE.start_recording(&path)?;
    Ok(true)
}

/// Stop the active recording, wait for the writer to drain, and return the
/// session summary.
pub fn stop_recording() -> Result<RecordingSummary, RecordingError> {
    ENGINE_HANDLE.stop_recording()
}

/// Tear the engine down. Safe to call from any state.
pub fn destroy() -> Result<(), AudioError> {
    ENGINE_HANDLE.destroy()
}

/// Current engine state snapshot for diagnostics.
pub fn status() -> EngineStatus {
    EngineStatus {
        playing: ENGINE_HANDLE.is_playing(),
        recording: ENGINE_HANDLE.is_recording(),
        bpm: ENGINE_HANDLE.get_bpm(),
        time_signature: ENGINE_HANDLE.get_time_signature(),
        volume: ENGINE_HANDLE.get_volume(),
        position_samples: ENGINE_HANDLE.position_samples(),
        input_underruns: ENGINE_HANDLE.input_underruns(),
    }
}

/// Stream of beat events (beat index modulo the time signature).
///
/// Lagged subscribers skip ahead rather than stalling the dispatcher.
pub fn beat_events() -> impl tokio_stream::Stream<Item = i32> {
    BroadcastStream::new(ENGINE_HANDLE.subscribe_beat_events()).filter_map(|item| item.ok())
}

/// Stream of engine telemetry events.
pub fn telemetry_events() -> impl tokio_stream::Stream<Item = TelemetryEvent> {
    BroadcastStream::new(ENGINE_HANDLE.subscribe_telemetry()).filter_map(|item| item.ok())
}
