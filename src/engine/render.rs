//! RenderEngine - the unified real-time render callback
//!
//! Executed once per device block. Per block, in order: poll render
//! commands, read shared parameters once, pull captured input, render
//! clicks, publish beat transitions, feed the record path (delayed clicks
//! plus live mic) into the record queue, add live monitoring to the output,
//! and advance the clock.
//!
//! # Real-Time Safety
//! All operations in `process_block` are:
//! - Lock-free (atomic loads and wait-free queue operations only)
//! - Allocation-free (every buffer is sized at construction or arming time)
//! - Bounded (no looping beyond the block's frame count)
//! - Free of blocking syscalls and logging

use rtrb::{Consumer, Producer};

use crate::audio::{BeatTick, ClickVoice, RecordConsumer as CaptureConsumer, SampleClock};
use crate::engine::params::{ClickSounds, EngineParams};
use crate::engine::session::RenderSession;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Commands delivered to the render thread over a wait-free queue.
pub enum RenderCommand {
    /// Activate an armed recording session
    StartRecording(Box<RenderSession>),
    /// Retire the active session back to the controller
    StopRecording,
    /// Rewind the clock and the voice (transport stop)
    Reset,
}

/// The render callback state. Owned by the device backend's audio thread.
pub struct RenderEngine {
    clock: SampleClock,
    voice: ClickVoice,
    params: Arc<EngineParams>,
    sounds: Arc<ClickSounds>,
    /// Commands from the controller
    commands: Consumer<RenderCommand>,
    /// Retired sessions back to the controller for reclamation
    retired: Producer<Box<RenderSession>>,
    /// Beat transitions to the dispatch thread
    beat_tx: Producer<BeatTick>,
    /// Captured microphone input, interleaved stereo
    capture: CaptureConsumer,
    session: Option<Box<RenderSession>>,
    /// De-interleaved input scratch, max_block frames each
    mic_l: Vec<f32>,
    mic_r: Vec<f32>,
    /// Interleaved pull scratch, 2 * max_block samples
    capture_scratch: Vec<f32>,
    max_block: usize,
    /// Tempo last applied to the clock
    applied_bpm: u32,
}

impl RenderEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sample_rate: u32,
        bpm: u32,
        beat_guard_samples: u32,
        max_block: usize,
        params: Arc<EngineParams>,
        sounds: Arc<ClickSounds>,
        commands: Consumer<RenderCommand>,
        retired: Producer<Box<RenderSession>>,
        beat_tx: Producer<BeatTick>,
        capture: CaptureConsumer,
    ) -> Self {
        Self {
            clock: SampleClock::new(sample_rate, bpm),
            voice: ClickVoice::new(beat_guard_samples),
            params,
            sounds,
            commands,
            retired,
            beat_tx,
            capture,
            session: None,
            mic_l: vec![0.0; max_block],
            mic_r: vec![0.0; max_block],
            capture_scratch: vec![0.0; max_block * 2],
            max_block,
            applied_bpm: bpm,
        }
    }

    /// Render one device callback into the stereo output block.
    ///
    /// Blocks larger than the configured maximum are processed in chunks, so
    /// device-side block size changes never overrun the preallocated
    /// scratch.
    pub fn process_block(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        debug_assert_eq!(out_l.len(), out_r.len());
        let mut offset = 0;
        while offset < out_l.len() {
            let n = (out_l.len() - offset).min(self.max_block);
            self.process_chunk(&mut out_l[offset..offset + n], &mut out_r[offset..offset + n]);
            offset += n;
        }
    }

    fn process_chunk(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let n = out_l.len();

        self.drain_commands();

        // Read each shared parameter once at block entry; the block sees a
        // consistent snapshot even if the controller updates mid-block.
        let playing = self.params.is_playing();
        let recording = self.params.is_recording() && self.session.is_some();
        let monitoring = self.params.is_monitoring();
        let bpm = self.params.bpm();
        let time_signature = self.params.time_signature();
        let click_gain = self.params.click_gain();
        let mic_gain = self.params.mic_gain();

        if bpm != self.applied_bpm && bpm > 0 {
            self.clock.set_bpm(bpm);
            self.applied_bpm = bpm;
        }

        out_l.fill(0.0);
        out_r.fill(0.0);

        // 1. Input pull. Shortfall leaves silence and bumps a counter; the
        //    capture queue is drained even when idle so stale audio never
        //    leaks into a later session.
        let want_mic = recording || monitoring;
        let got = self.pull_input(n, want_mic);
        if recording && got < n {
            self.params.count_input_underrun((n - got) as u64);
        }

        // 2+3. Click render and beat events.
        let normal = self.sounds.load_normal();
        let accent = self.sounds.load_accent();
        if playing && !normal.is_empty() {
            let beat_tx = &mut self.beat_tx;
            self.voice.render_block(
                &self.clock,
                normal.as_slice(),
                accent.as_slice(),
                time_signature,
                click_gain,
                out_l,
                out_r,
                |tick| {
                    let _ = beat_tx.push(tick);
                },
            );
        }

        // 4. Record path: delayed clicks plus live mic into the queue.
        if let Some(session) = self.session.as_mut().filter(|_| recording) {
            if !session.started {
                session.started = true;
                session
                    .start_position
                    .store(self.clock.position() as u64, Ordering::Release);
            }
            session.delay.push_block(out_l, out_r);
            for i in 0..n {
                let (delayed_l, delayed_r) = session.delay.pop_frame();
                session
                    .queue
                    .write_frame(delayed_l + self.mic_l[i] * mic_gain, delayed_r + self.mic_r[i] * mic_gain);
            }
        }

        // 5. Monitor mix: the live, undelayed mic on top of the clicks.
        if recording && monitoring {
            for i in 0..n {
                out_l[i] += self.mic_l[i] * mic_gain;
                out_r[i] += self.mic_r[i] * mic_gain;
            }
        }

        // 6. Advance clock.
        self.clock.advance(n);
        self.params.publish_position(self.clock.position() as u64);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                RenderCommand::StartRecording(session) => {
                    if let Some(old) = self.session.take() {
                        let _ = self.retired.push(old);
                    }
                    self.session = Some(session);
                }
                RenderCommand::StopRecording => {
                    if let Some(old) = self.session.take() {
                        let _ = self.retired.push(old);
                    }
                }
                RenderCommand::Reset => {
                    self.clock.reset();
                    self.voice.reset();
                    self.params.publish_position(0);
                }
            }
        }
    }

    /// Pop up to `n` captured frames, de-interleaving into the mic scratch.
    /// Returns the frames actually received; the remainder stays zeroed.
    fn pull_input(&mut self, n: usize, keep: bool) -> usize {
        let samples = self.capture.read_into(&mut self.capture_scratch[..n * 2]);
        let frames = samples / 2;
        if !keep {
            return 0;
        }
        for i in 0..frames {
            self.mic_l[i] = self.capture_scratch[i * 2];
            self.mic_r[i] = self.capture_scratch[i * 2 + 1];
        }
        for i in frames..n {
            self.mic_l[i] = 0.0;
            self.mic_r[i] = 0.0;
        }
        frames
    }
}
