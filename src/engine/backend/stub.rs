//! Stub backend for deterministic testing and offline rendering.
//!
//! Instead of a device clock, blocks are driven manually through
//! [`StubBackend::render_block`]. Input frames are injected with
//! [`StubBackend::push_input`]. Used by the integration tests and the
//! offline render CLI; no audio hardware is touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::audio::RecordProducer;
use crate::engine::render::RenderEngine;
use crate::error::AudioError;

use super::{DeviceBackend, DeviceLatency, DeviceStartContext};

struct StubDevice {
    render: RenderEngine,
    capture_tx: RecordProducer,
}

/// Manually-driven backend.
pub struct StubBackend {
    device: Mutex<Option<StubDevice>>,
    latency: DeviceLatency,
    input_enabled: AtomicBool,
    /// When set, enable_input fails with PermissionDenied
    deny_input: bool,
    running: AtomicBool,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_latency(DeviceLatency::ZERO)
    }

    pub fn with_latency(latency: DeviceLatency) -> Self {
        Self {
            device: Mutex::new(None),
            latency,
            input_enabled: AtomicBool::new(false),
            deny_input: false,
            running: AtomicBool::new(false),
        }
    }

    /// A backend whose microphone is denied, for permission-path tests.
    pub fn denying_input() -> Self {
        Self {
            deny_input: true,
            ..Self::new()
        }
    }

    /// Drive one render block of `frames`, returning the planar output.
    ///
    /// # Panics
    /// Panics if the backend has not been started.
    pub fn render_block(&self, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut guard = self.device.lock().expect("stub device poisoned");
        let device = guard.as_mut().expect("stub backend not started");
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        device.render.process_block(&mut left, &mut right);
        (left, right)
    }

    /// Inject interleaved stereo input frames, as a device input callback
    /// would.
    pub fn push_input(&self, interleaved: &[f32]) {
        let mut guard = self.device.lock().expect("stub device poisoned");
        if let Some(device) = guard.as_mut() {
            for frame in interleaved.chunks(2) {
                let left = frame[0];
                let right = if frame.len() > 1 { frame[1] } else { frame[0] };
                device.capture_tx.write_frame(left, right);
            }
        }
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled.load(Ordering::SeqCst)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for StubBackend {
    fn start(&self, ctx: DeviceStartContext) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        let mut guard = self.device.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_device".to_string(),
        })?;
        *guard = Some(StubDevice {
            render: ctx.render,
            capture_tx: ctx.capture_tx,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::SeqCst);
        let mut guard = self.device.lock().map_err(|_| AudioError::LockPoisoned {
            component: "stub_device".to_string(),
        })?;
        *guard = None;
        Ok(())
    }

    fn enable_input(&self) -> Result<(), AudioError> {
        if self.deny_input {
            return Err(AudioError::PermissionDenied);
        }
        self.input_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn latency(&self) -> DeviceLatency {
        self.latency
    }
}
