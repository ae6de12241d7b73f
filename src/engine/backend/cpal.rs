//! CPAL-based device backend for desktop platforms (Linux, macOS, Windows)
//!
//! The output stream is the master: its callback drives the render engine,
//! which generates clicks and pulls whatever the input stream has captured.
//! The input stream is opened on demand (microphone enable) and pushes
//! stereo frames into the engine's capture queue.
//!
//! Since CPAL's Stream is not Send+Sync, each stream lives on a dedicated
//! thread that owns it and parks until signaled to stop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::audio::RecordProducer;
use crate::config::AudioConfig;
use crate::error::AudioError;

use super::{DeviceBackend, DeviceLatency, DeviceStartContext};

/// CPAL device backend.
pub struct CpalBackend {
    audio_config: AudioConfig,
    /// Signals both stream threads to exit
    shutdown: Arc<AtomicBool>,
    /// Negotiated output buffer size in frames, for latency estimates
    buffer_frames: Arc<AtomicU32>,
    /// Negotiated sample rate
    sample_rate: Arc<AtomicU32>,
    /// Capture producer parked here until the input stream claims it
    capture_tx: Mutex<Option<RecordProducer>>,
    output_thread: Mutex<Option<JoinHandle<()>>>,
    input_thread: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl CpalBackend {
    pub fn new(audio_config: AudioConfig) -> Self {
        Self {
            audio_config,
            shutdown: Arc::new(AtomicBool::new(false)),
            buffer_frames: Arc::new(AtomicU32::new(512)),
            sample_rate: Arc::new(AtomicU32::new(48000)),
            capture_tx: Mutex::new(None),
            output_thread: Mutex::new(None),
            input_thread: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }
}

impl DeviceBackend for CpalBackend {
    fn start(&self, ctx: DeviceStartContext) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        self.shutdown.store(false, Ordering::SeqCst);
        self.sample_rate.store(ctx.sample_rate, Ordering::SeqCst);

        {
            let mut guard = self
                .capture_tx
                .lock()
                .map_err(|_| AudioError::LockPoisoned {
                    component: "capture_tx".to_string(),
                })?;
            *guard = Some(ctx.capture_tx);
        }

        let shutdown = Arc::clone(&self.shutdown);
        let buffer_frames = Arc::clone(&self.buffer_frames);
        let max_block = self.audio_config.max_block_frames;
        let requested_rate = ctx.sample_rate;
        let mut render = ctx.render;

        // Channel to communicate stream startup success back to the caller
        let (startup_tx, startup_rx) = std::sync::mpsc::channel::<Result<(), AudioError>>();

        let handle = thread::spawn(move || {
            let host = cpal::default_host();
            let device = match host.default_output_device() {
                Some(device) => device,
                None => {
                    let _ = startup_tx.send(Err(AudioError::ConfigurationFailed {
                        reason: "no output device available".to_string(),
                    }));
                    return;
                }
            };
            log::info!("[CpalBackend] Output device: {:?}", device.name());

            let supported = match device.default_output_config() {
                Ok(config) => config,
                Err(err) => {
                    let _ = startup_tx.send(Err(AudioError::ConfigurationFailed {
                        reason: format!("failed to get default output config: {}", err),
                    }));
                    return;
                }
            };
            if supported.sample_format() != SampleFormat::F32 {
                let _ = startup_tx.send(Err(AudioError::ConfigurationFailed {
                    reason: format!(
                        "unsupported output sample format: {:?}",
                        supported.sample_format()
                    ),
                }));
                return;
            }

            let channels = supported.channels().max(1) as usize;
            let config = StreamConfig {
                channels: supported.channels(),
                sample_rate: SampleRate(requested_rate),
                buffer_size: cpal::BufferSize::Default,
            };
            log::info!(
                "[CpalBackend] Output config: {} Hz, {} channels",
                requested_rate,
                channels
            );

            // Planar scratch filled by the render engine, interleaved into
            // the device buffer per callback
            let mut plane_l = vec![0.0f32; max_block];
            let mut plane_r = vec![0.0f32; max_block];
            let buffer_frames_cb = Arc::clone(&buffer_frames);

            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let total_frames = data.len() / channels;
                    buffer_frames_cb.store(total_frames as u32, Ordering::Relaxed);

                    let mut done = 0;
                    while done < total_frames {
                        let n = (total_frames - done).min(max_block);
                        render.process_block(&mut plane_l[..n], &mut plane_r[..n]);
                        for (i, frame) in data[done * channels..(done + n) * channels]
                            .chunks_mut(channels)
                            .enumerate()
                        {
                            frame[0] = plane_l[i];
                            if channels > 1 {
                                frame[1] = plane_r[i];
                            }
                            for extra in frame.iter_mut().skip(2) {
                                *extra = 0.0;
                            }
                        }
                        done += n;
                    }
                },
                |err| log::error!("[CpalBackend] Output stream error: {}", err),
                None,
            );

            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = startup_tx.send(Err(AudioError::DeviceFailure {
                        code: 0,
                        context: format!("build_output_stream: {}", err),
                    }));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = startup_tx.send(Err(AudioError::DeviceFailure {
                    code: 0,
                    context: format!("output play: {}", err),
                }));
                return;
            }

            let _ = startup_tx.send(Ok(()));

            // The stream lives in this thread's scope until shutdown
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
            }
            log::info!("[CpalBackend] Output stream thread exiting");
        });

        match startup_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.shutdown.store(true, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::DeviceFailure {
                    code: 0,
                    context: "timeout waiting for output stream to start".to_string(),
                });
            }
        }

        let mut guard = self
            .output_thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "output_thread".to_string(),
            })?;
        *guard = Some(handle);
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.store(true, Ordering::SeqCst);

        for (name, slot) in [
            ("output_thread", &self.output_thread),
            ("input_thread", &self.input_thread),
        ] {
            let mut guard = slot.lock().map_err(|_| AudioError::LockPoisoned {
                component: name.to_string(),
            })?;
            if let Some(handle) = guard.take() {
                let _ = handle.join();
                log::info!("[CpalBackend] {} stopped", name);
            }
        }
        Ok(())
    }

    fn enable_input(&self) -> Result<(), AudioError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::NotRunning);
        }

        let mut capture_tx = {
            let mut guard = self
                .capture_tx
                .lock()
                .map_err(|_| AudioError::LockPoisoned {
                    component: "capture_tx".to_string(),
                })?;
            match guard.take() {
                Some(producer) => producer,
                // Input stream already claimed the producer
                None => return Ok(()),
            }
        };

        let shutdown = Arc::clone(&self.shutdown);
        let requested_rate = self.sample_rate.load(Ordering::SeqCst);
        let (startup_tx, startup_rx) = std::sync::mpsc::channel::<Result<(), AudioError>>();

        let handle = thread::spawn(move || {
            let host = cpal::default_host();
            let device = match host.default_input_device() {
                Some(device) => device,
                None => {
                    let _ = startup_tx.send(Err(AudioError::PermissionDenied));
                    return;
                }
            };
            log::info!("[CpalBackend] Input device: {:?}", device.name());

            let supported = match device.default_input_config() {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("[CpalBackend] Input config unavailable: {}", err);
                    let _ = startup_tx.send(Err(AudioError::PermissionDenied));
                    return;
                }
            };
            let channels = supported.channels().max(1) as usize;
            let config = StreamConfig {
                channels: supported.channels(),
                sample_rate: SampleRate(requested_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let stream = match supported.sample_format() {
                SampleFormat::F32 => device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        // Fold the device channels to stereo; mono is
                        // duplicated, extra channels ignored
                        for frame in data.chunks(channels) {
                            let left = frame[0];
                            let right = if frame.len() > 1 { frame[1] } else { frame[0] };
                            capture_tx.write_frame(left, right);
                        }
                    },
                    |err| log::error!("[CpalBackend] Input stream error: {}", err),
                    None,
                ),
                other => {
                    let _ = startup_tx.send(Err(AudioError::ConfigurationFailed {
                        reason: format!("unsupported input sample format: {:?}", other),
                    }));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = startup_tx.send(Err(AudioError::DeviceFailure {
                        code: 0,
                        context: format!("build_input_stream: {}", err),
                    }));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = startup_tx.send(Err(AudioError::DeviceFailure {
                    code: 0,
                    context: format!("input play: {}", err),
                }));
                return;
            }

            let _ = startup_tx.send(Ok(()));

            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(50));
            }
            log::info!("[CpalBackend] Input stream thread exiting");
        });

        match startup_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = handle.join();
                return Err(err);
            }
            Err(_) => {
                return Err(AudioError::DeviceFailure {
                    code: 0,
                    context: "timeout waiting for input stream to start".to_string(),
                });
            }
        }

        let mut guard = self
            .input_thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "input_thread".to_string(),
            })?;
        *guard = Some(handle);
        Ok(())
    }

    fn latency(&self) -> DeviceLatency {
        let sample_rate = self.sample_rate.load(Ordering::SeqCst).max(1) as f64;
        let buffer_seconds = self.buffer_frames.load(Ordering::Relaxed) as f64 / sample_rate;
        // CPAL exposes no direct latency query; the negotiated buffer
        // duration is the best available estimate unless the
        // device-configuration collaborator supplied a measurement.
        let input_seconds = match self.audio_config.input_latency_override_ms {
            Some(ms) => ms as f64 / 1000.0,
            None => buffer_seconds,
        };
        DeviceLatency {
            input_seconds,
            output_seconds: buffer_seconds,
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new(AudioConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_prefers_configured_override() {
        let mut config = AudioConfig::default();
        config.input_latency_override_ms = Some(5.0);
        let backend = CpalBackend::new(config);
        backend.sample_rate.store(48000, Ordering::SeqCst);

        let latency = backend.latency();
        assert!((latency.input_seconds - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_latency_estimate_from_buffer_size() {
        let backend = CpalBackend::default();
        backend.sample_rate.store(48000, Ordering::SeqCst);
        backend.buffer_frames.store(480, Ordering::Relaxed);

        let latency = backend.latency();
        assert!((latency.input_seconds - 0.01).abs() < 1e-9);
        assert!((latency.output_seconds - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_stop_without_start_is_idempotent() {
        let backend = CpalBackend::default();
        assert!(backend.stop().is_ok());
        assert!(backend.stop().is_ok());
    }

    #[test]
    fn test_enable_input_requires_running() {
        let backend = CpalBackend::default();
        assert_eq!(backend.enable_input(), Err(AudioError::NotRunning));
    }
}
