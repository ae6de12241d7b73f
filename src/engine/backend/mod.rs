//! Backend abstractions for the engine core.
//!
//! The core consumes an already-configured full-duplex device that delivers
//! periodic render invocations. Backends own the device streams, drive the
//! [`RenderEngine`](crate::engine::render::RenderEngine) from the output
//! callback, feed captured input into the engine's capture queue, and answer
//! latency queries used to size the record-path delay line.

use crate::audio::RecordProducer;
use crate::engine::render::RenderEngine;
use crate::error::AudioError;

/// Measured (or configured) device path latencies in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceLatency {
    pub input_seconds: f64,
    pub output_seconds: f64,
}

impl DeviceLatency {
    pub const ZERO: DeviceLatency = DeviceLatency {
        input_seconds: 0.0,
        output_seconds: 0.0,
    };
}

/// Context handed to a backend when the engine starts.
///
/// This bundles the render state and the capture producer so the backend can
/// wire the audio path without coupling to higher-level code.
pub struct DeviceStartContext {
    /// Render callback state; the backend's audio thread takes ownership
    pub render: RenderEngine,
    /// Producer half of the microphone capture queue; pushed from the
    /// backend's input callback once input is enabled
    pub capture_tx: RecordProducer,
    /// Sample rate the engine was initialized with
    pub sample_rate: u32,
}

/// Trait implemented by device backends.
pub trait DeviceBackend: Send + Sync {
    /// Acquire the output device and start delivering render invocations.
    fn start(&self, ctx: DeviceStartContext) -> Result<(), AudioError>;

    /// Stop delivering blocks and release the device.
    fn stop(&self) -> Result<(), AudioError>;

    /// Open the input path (microphone). Fails with
    /// [`AudioError::PermissionDenied`] when the platform refuses access.
    fn enable_input(&self) -> Result<(), AudioError>;

    /// Current input/output path latencies.
    fn latency(&self) -> DeviceLatency;
}

mod cpal;
pub use self::cpal::CpalBackend;

mod stub;
pub use stub::StubBackend;
