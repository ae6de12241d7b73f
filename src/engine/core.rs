//! EngineHandle: the engine controller.
//!
//! Owns the shared parameter block, the click buffers, the device backend,
//! the recording session lifecycle, and the beat-event dispatch. All public
//! operations are called from the host thread; communication with the
//! real-time render thread goes exclusively through atomics and wait-free
//! queues.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rtrb::RingBuffer;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::api::types::RecordingSummary;
use crate::audio::{generate_click_sample, record_queue, BeatTick, LatencyDelayLine};
use crate::config::AppConfig;
use crate::engine::backend::{CpalBackend, DeviceBackend, DeviceStartContext};
use crate::engine::params::{ClickSounds, EngineParams};
use crate::engine::render::{RenderCommand, RenderEngine};
use crate::engine::session::{ActiveRecording, BeatLog, RenderSession};
use crate::engine::writer::FileWriter;
use crate::error::{AudioError, RecordingError};

/// How long stop_recording waits for the render thread to hand the session
/// back. The wait is for memory reclamation only; the writer drains the
/// queue regardless, so a stalled device cannot wedge the host thread.
const SESSION_RECLAIM_TIMEOUT: Duration = Duration::from_millis(200);

/// Telemetry event emitted by the engine core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: TelemetryEventKind,
    pub detail: Option<String>,
}

/// Types of telemetry events supported by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TelemetryEventKind {
    EngineStarted { bpm: u32 },
    EngineStopped,
    BpmChanged { bpm: u32 },
    RecordingStarted,
    RecordingStopped { dropped_samples: u64 },
    Warning,
}

/// EngineHandle orchestrates the metronome/recording pipeline.
pub struct EngineHandle {
    config: AppConfig,
    backend: Arc<dyn DeviceBackend>,
    params: Arc<EngineParams>,
    sounds: Arc<ClickSounds>,
    beat_events_tx: broadcast::Sender<i32>,
    telemetry_tx: broadcast::Sender<TelemetryEvent>,
    beat_log: Arc<BeatLog>,
    commands: Mutex<Option<rtrb::Producer<RenderCommand>>>,
    retired: Mutex<Option<rtrb::Consumer<Box<RenderSession>>>>,
    recording: Mutex<Option<ActiveRecording>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    dispatcher_stop: Arc<AtomicBool>,
    running: AtomicBool,
    resume_after_interruption: AtomicBool,
    sample_rate: AtomicU32,
    start_instant: Instant,
}

impl EngineHandle {
    /// Create a handle with the default (CPAL) backend and the conventional
    /// config file.
    pub fn new() -> Self {
        let config = AppConfig::load();
        let backend = Arc::new(CpalBackend::new(config.audio.clone()));
        Self::with_backend(backend, config)
    }

    /// Create a handle over an explicit backend (tests, offline rendering).
    pub fn with_backend(backend: Arc<dyn DeviceBackend>, config: AppConfig) -> Self {
        let (beat_events_tx, _) = broadcast::channel(256);
        let (telemetry_tx, _) = broadcast::channel(128);
        Self {
            config,
            backend,
            params: Arc::new(EngineParams::new(120, 4, 100)),
            sounds: Arc::new(ClickSounds::new()),
            beat_events_tx,
            telemetry_tx,
            beat_log: Arc::new(BeatLog::new()),
            commands: Mutex::new(None),
            retired: Mutex::new(None),
            recording: Mutex::new(None),
            dispatcher: Mutex::new(None),
            dispatcher_stop: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            resume_after_interruption: AtomicBool::new(false),
            sample_rate: AtomicU32::new(48000),
            start_instant: Instant::now(),
        }
    }

    fn emit_event(&self, kind: TelemetryEventKind, detail: Option<String>) {
        let timestamp_ms = self.start_instant.elapsed().as_millis() as u64;
        let _ = self.telemetry_tx.send(TelemetryEvent {
            timestamp_ms,
            kind,
            detail,
        });
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Initialize the engine: load click PCM, configure parameters, start
    /// the device backend, and launch the beat-event dispatcher.
    ///
    /// An empty `normal_click` falls back to the built-in noise-burst click;
    /// an empty `accent_click` disables accents.
    pub fn init(
        &self,
        normal_click: Vec<f32>,
        accent_click: Vec<f32>,
        bpm: u32,
        time_signature: u32,
        volume: u32,
        sample_rate: u32,
    ) -> Result<(), AudioError> {
        if bpm == 0 {
            return Err(AudioError::BpmInvalid { bpm });
        }
        if volume > 100 {
            return Err(AudioError::VolumeInvalid { volume });
        }
        if sample_rate == 0 {
            return Err(AudioError::ConfigurationFailed {
                reason: "sample rate must be greater than 0".to_string(),
            });
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        self.params.set_bpm(bpm);
        self.params.set_time_signature(time_signature);
        self.params.set_volume(volume);
        self.params.set_playing(false);
        self.params.set_recording(false);
        self.sample_rate.store(sample_rate, Ordering::SeqCst);

        if normal_click.is_empty() {
            self.sounds.set_normal(generate_click_sample(sample_rate));
        } else {
            self.sounds.set_normal(normal_click);
        }
        self.sounds.set_accent(accent_click);

        let (command_tx, command_rx) = RingBuffer::new(8);
        let (retired_tx, retired_rx) = RingBuffer::new(8);
        let (beat_tx, beat_rx) = RingBuffer::new(256);
        let (capture_tx, capture_rx) =
            record_queue(self.config.capture_capacity_samples(sample_rate));

        let render = RenderEngine::new(
            sample_rate,
            bpm,
            self.config.audio.beat_guard_samples,
            self.config.audio.max_block_frames,
            Arc::clone(&self.params),
            Arc::clone(&self.sounds),
            command_rx,
            retired_tx,
            beat_tx,
            capture_rx,
        );

        if let Err(err) = self.backend.start(DeviceStartContext {
            render,
            capture_tx,
            sample_rate,
        }) {
            self.running.store(false, Ordering::SeqCst);
            return Err(err);
        }

        *self.commands.lock().map_err(|_| AudioError::LockPoisoned {
            component: "commands".to_string(),
        })? = Some(command_tx);
        *self.retired.lock().map_err(|_| AudioError::LockPoisoned {
            component: "retired".to_string(),
        })? = Some(retired_rx);

        self.dispatcher_stop.store(false, Ordering::SeqCst);
        let dispatcher = self.spawn_dispatcher(beat_rx);
        *self.dispatcher.lock().map_err(|_| AudioError::LockPoisoned {
            component: "dispatcher".to_string(),
        })? = Some(dispatcher);

        self.emit_event(TelemetryEventKind::EngineStarted { bpm }, None);
        log::info!(
            "[EngineHandle] Initialized at {} Hz, bpm={}, ts={}",
            sample_rate,
            bpm,
            time_signature
        );
        Ok(())
    }

    /// Forward beat transitions from the render queue to the host stream
    /// and the recording beat log.
    fn spawn_dispatcher(&self, mut beat_rx: rtrb::Consumer<BeatTick>) -> JoinHandle<()> {
        let broadcast_tx = self.beat_events_tx.clone();
        let beat_log = Arc::clone(&self.beat_log);
        let stop = Arc::clone(&self.dispatcher_stop);

        thread::Builder::new()
            .name("beat-dispatch".to_string())
            .spawn(move || loop {
                let mut drained = false;
                while let Ok(tick) = beat_rx.pop() {
                    drained = true;
                    beat_log.record(tick.position);
                    let _ = broadcast_tx.send(tick.beat_in_bar);
                }
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if !drained {
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .expect("failed to spawn beat dispatcher")
    }

    fn require_running(&self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AudioError::NotRunning)
        }
    }

    fn send_command(&self, command: RenderCommand) -> Result<(), AudioError> {
        let mut guard = self.commands.lock().map_err(|_| AudioError::LockPoisoned {
            component: "commands".to_string(),
        })?;
        match guard.as_mut() {
            Some(producer) => {
                if producer.push(command).is_err() {
                    log::warn!("[EngineHandle] Render command queue full, command dropped");
                }
                Ok(())
            }
            None => Err(AudioError::NotRunning),
        }
    }

    /// Tear down the engine: stop any recording, the dispatcher, and the
    /// device. Idempotent and safe from any state.
    pub fn destroy(&self) -> Result<(), AudioError> {
        if self.is_recording() {
            if let Err(err) = self.stop_recording() {
                crate::error::log_recording_error(&err, "destroy");
            }
        }

        self.params.set_playing(false);
        self.dispatcher_stop.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.dispatcher.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }

        if self.running.swap(false, Ordering::SeqCst) {
            self.backend.stop()?;
            self.emit_event(TelemetryEventKind::EngineStopped, None);
        }

        if let Ok(mut guard) = self.commands.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.retired.lock() {
            *guard = None;
        }
        Ok(())
    }

    // ========================================================================
    // TRANSPORT AND PARAMETERS
    // ========================================================================

    pub fn play(&self) -> Result<(), AudioError> {
        self.require_running()?;
        self.params.set_playing(true);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), AudioError> {
        self.require_running()?;
        self.params.set_playing(false);
        Ok(())
    }

    /// Pause and rewind to sample 0.
    pub fn stop(&self) -> Result<(), AudioError> {
        self.require_running()?;
        self.params.set_playing(false);
        self.send_command(RenderCommand::Reset)
    }

    pub fn is_playing(&self) -> bool {
        self.params.is_playing()
    }

    pub fn set_bpm(&self, bpm: u32) -> Result<(), AudioError> {
        if bpm == 0 {
            return Err(AudioError::BpmInvalid { bpm });
        }
        self.require_running()?;
        self.params.set_bpm(bpm);
        self.emit_event(TelemetryEventKind::BpmChanged { bpm }, None);
        Ok(())
    }

    pub fn get_bpm(&self) -> u32 {
        self.params.bpm()
    }

    pub fn set_time_signature(&self, time_signature: u32) -> Result<(), AudioError> {
        self.require_running()?;
        self.params.set_time_signature(time_signature);
        Ok(())
    }

    pub fn get_time_signature(&self) -> u32 {
        self.params.time_signature()
    }

    pub fn set_volume(&self, volume: u32) -> Result<(), AudioError> {
        if volume > 100 {
            return Err(AudioError::VolumeInvalid { volume });
        }
        self.require_running()?;
        self.params.set_volume(volume);
        Ok(())
    }

    pub fn get_volume(&self) -> u32 {
        self.params.volume()
    }

    pub fn set_mic_gain(&self, gain: f32) -> Result<(), AudioError> {
        if !(0.0..=1.0).contains(&gain) || gain.is_nan() {
            return Err(AudioError::MicGainInvalid { gain });
        }
        self.require_running()?;
        self.params.set_mic_gain(gain);
        Ok(())
    }

    pub fn set_monitoring(&self, enabled: bool) -> Result<(), AudioError> {
        self.require_running()?;
        self.params.set_monitoring(enabled);
        Ok(())
    }

    /// Replace click PCM while running (double-buffered pointer swap; the
    /// render thread picks the new buffers up at its next block).
    pub fn set_click_sounds(
        &self,
        normal: Option<Vec<f32>>,
        accent: Option<Vec<f32>>,
    ) -> Result<(), AudioError> {
        self.require_running()?;
        if let Some(pcm) = normal {
            self.sounds.set_normal(pcm);
        }
        if let Some(pcm) = accent {
            self.sounds.set_accent(pcm);
        }
        Ok(())
    }

    pub fn enable_microphone(&self) -> Result<(), AudioError> {
        self.require_running()?;
        self.backend.enable_input()
    }

    /// Frames rendered since engine start, as last published by the render
    /// thread.
    pub fn position_samples(&self) -> u64 {
        self.params.position_samples()
    }

    pub fn input_underruns(&self) -> u64 {
        self.params.input_underruns()
    }

    // ========================================================================
    // RECORDING
    // ========================================================================

    pub fn is_recording(&self) -> bool {
        self.recording
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Arm a recording: allocate the record queue, size the delay line from
    /// the device's input latency, launch the writer, then hand the session
    /// to the render thread and raise the recording flag.
    pub fn start_recording(&self, path: &str) -> Result<(), RecordingError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(RecordingError::EngineNotRunning);
        }
        let mut recording = self
            .recording
            .lock()
            .map_err(|_| RecordingError::WriterFailed {
                reason: "recording state poisoned".to_string(),
            })?;
        if recording.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        self.reclaim_retired_sessions();

        let sample_rate = self.sample_rate.load(Ordering::SeqCst);
        let (producer, consumer) = record_queue(self.config.ring_capacity_samples(sample_rate));
        let dropped = producer.dropped_handle();

        let latency = self.backend.latency();
        let delay_frames = (latency.input_seconds * sample_rate as f64).round() as usize;
        let delay = LatencyDelayLine::new(delay_frames, self.config.audio.max_block_frames);
        log::info!(
            "[EngineHandle] Arming recording to {} (delay {} frames, ring {} samples)",
            path,
            delay_frames,
            self.config.ring_capacity_samples(sample_rate)
        );

        let path_buf = PathBuf::from(path);
        let writer = FileWriter::spawn(
            &path_buf,
            sample_rate,
            consumer,
            self.config.recording.writer_chunk_samples,
            Duration::from_millis(self.config.recording.writer_idle_sleep_ms),
        )?;

        let session = RenderSession::new(delay, producer);
        let start_position = Arc::clone(&session.start_position);

        self.send_command(RenderCommand::StartRecording(Box::new(session)))
            .map_err(|_| RecordingError::EngineNotRunning)?;

        self.beat_log.begin();
        self.params.set_recording(true);

        *recording = Some(ActiveRecording {
            path: path_buf,
            writer,
            start_position,
            dropped,
        });
        self.emit_event(TelemetryEventKind::RecordingStarted, None);
        Ok(())
    }

    /// Disarm the recording, wait for the writer to drain, and return the
    /// session summary. Blocks the host thread until the drain completes.
    pub fn stop_recording(&self) -> Result<RecordingSummary, RecordingError> {
        let active = {
            let mut guard = self
                .recording
                .lock()
                .map_err(|_| RecordingError::WriterFailed {
                    reason: "recording state poisoned".to_string(),
                })?;
            guard.take().ok_or(RecordingError::NotRecording)?
        };

        self.params.set_recording(false);
        // A stalled device keeps the session on the render side; the reclaim
        // wait below is bounded and the writer still drains the queue.
        let _ = self.send_command(RenderCommand::StopRecording);

        self.await_session_reclaim();
        // Announcements already in the beat queue need one dispatcher pass
        // before the log closes
        thread::sleep(Duration::from_millis(5));
        let positions = self.beat_log.end();

        let report = active.writer.finish();
        let dropped_samples = active.dropped.load(Ordering::Relaxed);
        let report = match report {
            Ok(report) => report,
            Err(err) => {
                crate::error::log_recording_error(&err, "stop_recording");
                return Err(err);
            }
        };

        let sample_rate = self.sample_rate.load(Ordering::SeqCst) as f64;
        let start = active.start_position.load(Ordering::Acquire) as f64;
        let timestamps: Vec<f64> = positions
            .into_iter()
            .filter(|&p| p >= start)
            .map(|p| (p - start) / sample_rate)
            .collect();

        self.emit_event(
            TelemetryEventKind::RecordingStopped { dropped_samples },
            None,
        );
        if dropped_samples > 0 {
            log::warn!(
                "[EngineHandle] Recording overran the queue, {} samples dropped",
                dropped_samples
            );
        }
        log::info!(
            "[EngineHandle] Recording finished: {:?}, {} frames",
            active.path,
            report.frames_written
        );

        Ok(RecordingSummary {
            path: active.path.display().to_string(),
            timestamps,
            bpm: self.get_bpm() as i32,
            time_signature: self.get_time_signature() as i32,
            dropped_samples,
        })
    }

    /// Drop any sessions the render thread has handed back.
    fn reclaim_retired_sessions(&self) {
        if let Ok(mut guard) = self.retired.lock() {
            if let Some(consumer) = guard.as_mut() {
                while consumer.pop().is_ok() {}
            }
        }
    }

    /// Wait (bounded) for the render thread to retire the stopped session.
    fn await_session_reclaim(&self) {
        let deadline = Instant::now() + SESSION_RECLAIM_TIMEOUT;
        loop {
            if let Ok(mut guard) = self.retired.lock() {
                if let Some(consumer) = guard.as_mut() {
                    if consumer.pop().is_ok() {
                        return;
                    }
                } else {
                    return;
                }
            }
            if Instant::now() >= deadline {
                log::warn!("[EngineHandle] Render thread did not retire the session in time");
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    // ========================================================================
    // EVENTS AND INTERRUPTIONS
    // ========================================================================

    /// Subscribe to the beat-event stream (beat index modulo the time
    /// signature).
    pub fn subscribe_beat_events(&self) -> broadcast::Receiver<i32> {
        self.beat_events_tx.subscribe()
    }

    /// Subscribe to engine telemetry events.
    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.telemetry_tx.subscribe()
    }

    /// Device interruption began (route change, call): pause playback and
    /// remember whether to resume.
    pub fn handle_interruption(&self) {
        if self.running.load(Ordering::SeqCst) && self.params.is_playing() {
            self.resume_after_interruption.store(true, Ordering::SeqCst);
            self.params.set_playing(false);
            self.emit_event(
                TelemetryEventKind::Warning,
                Some("playback paused by device interruption".to_string()),
            );
        }
    }

    /// Device interruption ended: resume if playback was active before.
    pub fn handle_interruption_ended(&self) {
        if self.resume_after_interruption.swap(false, Ordering::SeqCst)
            && self.running.load(Ordering::SeqCst)
        {
            self.params.set_playing(true);
        }
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.destroy();
    }
}
