//! Shared engine parameters
//!
//! Small scalars written by the controller and read by the render thread.
//! Every store uses release ordering and every load acquire ordering, so a
//! render block that reads each parameter once at block entry sees either
//! the pre- or the post-update value consistently for the whole block.
//!
//! Click PCM buffers are replaced through an atomic pointer swap
//! ([`arc_swap::ArcSwap`]); the render thread acquires a guard at block
//! entry and the previous buffer is freed only after no reader holds it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::audio::MAX_CLICK_SAMPLES;

/// Atomic parameter block shared between the controller and the render
/// thread.
pub struct EngineParams {
    bpm: AtomicU32,
    time_signature: AtomicU32,
    /// Click volume, 0..=100
    volume: AtomicU32,
    /// Microphone gain as f32 bits
    mic_gain_bits: AtomicU32,
    playing: AtomicBool,
    recording: AtomicBool,
    monitoring: AtomicBool,
    /// Frames rendered since engine start, published by the render thread
    position_samples: AtomicU64,
    /// Frames of input the render substituted with silence (§ input pull)
    input_underruns: AtomicU64,
}

impl EngineParams {
    pub fn new(bpm: u32, time_signature: u32, volume: u32) -> Self {
        Self {
            bpm: AtomicU32::new(bpm),
            time_signature: AtomicU32::new(time_signature),
            volume: AtomicU32::new(volume),
            mic_gain_bits: AtomicU32::new(1.0f32.to_bits()),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            monitoring: AtomicBool::new(true),
            position_samples: AtomicU64::new(0),
            input_underruns: AtomicU64::new(0),
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm.load(Ordering::Acquire)
    }

    pub fn set_bpm(&self, bpm: u32) {
        self.bpm.store(bpm, Ordering::Release);
    }

    pub fn time_signature(&self) -> u32 {
        self.time_signature.load(Ordering::Acquire)
    }

    pub fn set_time_signature(&self, ts: u32) {
        self.time_signature.store(ts, Ordering::Release);
    }

    pub fn volume(&self) -> u32 {
        self.volume.load(Ordering::Acquire)
    }

    pub fn set_volume(&self, volume: u32) {
        self.volume.store(volume, Ordering::Release);
    }

    /// Click gain derived from the host volume.
    pub fn click_gain(&self) -> f32 {
        self.volume() as f32 / 100.0
    }

    pub fn mic_gain(&self) -> f32 {
        f32::from_bits(self.mic_gain_bits.load(Ordering::Acquire))
    }

    pub fn set_mic_gain(&self, gain: f32) {
        self.mic_gain_bits.store(gain.to_bits(), Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::Release);
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    pub fn set_monitoring(&self, monitoring: bool) {
        self.monitoring.store(monitoring, Ordering::Release);
    }

    pub fn position_samples(&self) -> u64 {
        self.position_samples.load(Ordering::Acquire)
    }

    pub fn publish_position(&self, position: u64) {
        self.position_samples.store(position, Ordering::Release);
    }

    pub fn input_underruns(&self) -> u64 {
        self.input_underruns.load(Ordering::Relaxed)
    }

    pub fn count_input_underrun(&self, frames: u64) {
        self.input_underruns.fetch_add(frames, Ordering::Relaxed);
    }
}

/// Click PCM buffers with lock-free live replacement.
///
/// The controller publishes replacements with [`ArcSwap::store`] (release);
/// the render thread loads a guard at block entry (acquire). The previous
/// buffer stays alive until the last guard drops, which is at most one block
/// boundary later.
pub struct ClickSounds {
    normal: ArcSwap<Vec<f32>>,
    accent: ArcSwap<Vec<f32>>,
}

impl ClickSounds {
    pub fn new() -> Self {
        Self {
            normal: ArcSwap::from_pointee(Vec::new()),
            accent: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Replace the normal click. PCM longer than [`MAX_CLICK_SAMPLES`] is
    /// truncated with a warning.
    pub fn set_normal(&self, pcm: Vec<f32>) {
        self.normal.store(Arc::new(Self::bound(pcm, "normal")));
    }

    /// Replace the accent click. An empty buffer disables accents.
    pub fn set_accent(&self, pcm: Vec<f32>) {
        self.accent.store(Arc::new(Self::bound(pcm, "accent")));
    }

    /// Snapshot the normal click for one render block.
    pub fn load_normal(&self) -> arc_swap::Guard<Arc<Vec<f32>>> {
        self.normal.load()
    }

    /// Snapshot the accent click for one render block.
    pub fn load_accent(&self) -> arc_swap::Guard<Arc<Vec<f32>>> {
        self.accent.load()
    }

    fn bound(mut pcm: Vec<f32>, which: &str) -> Vec<f32> {
        if pcm.len() > MAX_CLICK_SAMPLES {
            log::warn!(
                "[ClickSounds] {} click truncated from {} to {} samples",
                which,
                pcm.len(),
                MAX_CLICK_SAMPLES
            );
            pcm.truncate(MAX_CLICK_SAMPLES);
        }
        pcm
    }
}

impl Default for ClickSounds {
    fn default() -> Self {
        Self::new()
    }
}
