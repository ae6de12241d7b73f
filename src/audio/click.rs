//! ClickVoice - Sample-accurate click rendering
//!
//! This module renders metronome clicks into an output stereo block from the
//! sample clock. Key features:
//! - A click starts at every sample index where the beat phase is zero
//! - Membership is recomputed per frame from the clock, so the voice is
//!   stateless across blocks and robust to block-size changes; a click that
//!   started in the previous block simply continues here
//! - Accent selection on the first beat of the bar when a time signature
//!   and an accent buffer are present
//! - Beat transitions are announced exactly once through a caller-supplied
//!   sink, suitable for a wait-free queue push
//! - Zero allocations; safe for real-time use

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::clock::SampleClock;

/// Duration of the default metronome click in milliseconds
const CLICK_DURATION_MS: f32 = 20.0;

/// Upper bound on loaded click PCM length in samples
pub const MAX_CLICK_SAMPLES: usize = 10_000;

/// One announced beat transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatTick {
    /// Beat index modulo the time signature (0 when the signature disables
    /// bar grouping)
    pub beat_in_bar: i32,
    /// Absolute sample position of the frame that crossed the boundary
    pub position: f64,
}

/// Generates the default metronome click sample (20ms white noise burst).
///
/// The noise is generated with a fixed seed so the output is identical
/// across calls. Used when the host loads no click PCM, and as a test
/// fixture source.
///
/// # Arguments
/// * `sample_rate` - Sample rate in Hz (typically 48000)
///
/// # Returns
/// A `Vec<f32>` containing exactly 20ms worth of white noise samples in
/// range [-1.0, 1.0]
pub fn generate_click_sample(sample_rate: u32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * CLICK_DURATION_MS / 1000.0) as usize;

    let mut rng = StdRng::seed_from_u64(42);

    let mut samples = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        samples.push(rng.gen_range(-1.0..1.0));
    }

    samples
}

/// Stateless-per-frame click renderer with beat-transition tracking.
///
/// The only state carried across blocks is `last_beat_fired`, which
/// guarantees each integer beat boundary is announced exactly once within
/// the guard window.
pub struct ClickVoice {
    /// Most recently announced beat index (-1 before the first beat)
    last_beat_fired: i64,
    /// Announcement window in samples after a boundary
    guard_samples: f64,
}

impl ClickVoice {
    pub fn new(guard_samples: u32) -> Self {
        Self {
            last_beat_fired: -1,
            guard_samples: guard_samples as f64,
        }
    }

    /// Forget announced beats (transport rewind).
    pub fn reset(&mut self) {
        self.last_beat_fired = -1;
    }

    #[cfg(test)]
    pub fn last_beat_fired(&self) -> i64 {
        self.last_beat_fired
    }

    /// Render clicks for `[clock.position(), clock.position() + n)` into the
    /// pre-zeroed output block, summing into both channels.
    ///
    /// The waveform for beat `k` is `accent` iff `time_signature >= 2`,
    /// `k mod time_signature == 0`, and `accent` is non-empty; otherwise
    /// `normal`. Each crossed beat boundary invokes `on_beat` once with the
    /// beat index modulo the time signature.
    ///
    /// Real-time safe: no allocations, no locks, bounded by `out_l.len()`.
    #[allow(clippy::too_many_arguments)]
    pub fn render_block<F: FnMut(BeatTick)>(
        &mut self,
        clock: &SampleClock,
        normal: &[f32],
        accent: &[f32],
        time_signature: u32,
        gain: f32,
        out_l: &mut [f32],
        out_r: &mut [f32],
        mut on_beat: F,
    ) {
        debug_assert_eq!(out_l.len(), out_r.len());

        let start = clock.position();
        let ts = time_signature as i64;

        for i in 0..out_l.len() {
            let p = start + i as f64;
            let k = clock.beat_index(p);
            let phase = clock.beat_phase(p);

            if k != self.last_beat_fired && phase < self.guard_samples {
                self.last_beat_fired = k;
                let beat_in_bar = if ts >= 1 { (k % ts) as i32 } else { 0 };
                on_beat(BeatTick {
                    beat_in_bar,
                    position: p,
                });
            }

            let accented = ts >= 2 && k % ts == 0 && !accent.is_empty();
            let buf = if accented { accent } else { normal };
            let idx = phase as usize;
            if idx < buf.len() {
                let s = buf[idx] * gain;
                out_l[i] += s;
                out_r[i] += s;
            }
        }
    }
}
