//! SampleClock - Sample-accurate musical time
//!
//! This module provides the monotonic sample-indexed clock that drives click
//! generation. Key features:
//! - Sample-accurate timing (0 jitter) using frame counter arithmetic
//! - f64 arithmetic throughout to avoid accumulation error over long sessions
//! - Tempo changes re-anchor the beat grid at the last crossed boundary, so
//!   no click is duplicated or skipped across a change
//! - Zero allocations; safe for real-time use

/// Converts BPM (beats per minute) to samples per beat.
///
/// Formula: samples_per_beat = (sample_rate × 60) / BPM
///
/// # Arguments
/// * `sample_rate` - Sample rate in Hz (typically 48000)
/// * `bpm` - Beats per minute (typically 40-240)
///
/// # Examples
/// ```
/// use metronome_recorder::audio::clock::samples_per_beat;
/// assert_eq!(samples_per_beat(48000.0, 120), 24000.0);
/// ```
#[inline]
pub fn samples_per_beat(sample_rate: f64, bpm: u32) -> f64 {
    sample_rate * 60.0 / bpm as f64
}

/// Monotonic sample-position clock with a re-anchorable beat grid.
///
/// The clock advances by the frame count of every render block and converts
/// sample positions to beat indices and beat phases at the current tempo.
/// Mutated only by the render thread (advance) and by the controller via the
/// render command path (tempo change, reset), so it needs no interior
/// synchronization.
#[derive(Debug, Clone)]
pub struct SampleClock {
    /// Frames rendered since engine start
    position: f64,
    /// Device sample rate in Hz
    sample_rate: f64,
    /// Current beat spacing in samples
    samples_per_beat: f64,
    /// Sample position of the grid origin (a known beat boundary)
    origin_sample: f64,
    /// Beat index at the grid origin
    origin_beat: i64,
}

impl SampleClock {
    /// Create a clock at position 0 with the beat grid anchored at sample 0.
    ///
    /// # Panics
    /// Panics if `bpm` is 0 (`samples_per_beat` must stay positive).
    pub fn new(sample_rate: u32, bpm: u32) -> Self {
        assert!(bpm > 0, "bpm must be greater than 0");
        Self {
            position: 0.0,
            sample_rate: sample_rate as f64,
            samples_per_beat: samples_per_beat(sample_rate as f64, bpm),
            origin_sample: 0.0,
            origin_beat: 0,
        }
    }

    /// Current position in frames since engine start.
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        self.samples_per_beat
    }

    /// Advance the clock by `frames` (called once per render block).
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.position += frames as f64;
    }

    /// Beat index at sample position `p`.
    #[inline]
    pub fn beat_index(&self, p: f64) -> i64 {
        self.origin_beat + ((p - self.origin_sample) / self.samples_per_beat).floor() as i64
    }

    /// Beat phase at sample position `p`: samples since the most recent beat
    /// boundary. Zero at each click onset.
    #[inline]
    pub fn beat_phase(&self, p: f64) -> f64 {
        let rel = p - self.origin_sample;
        rel - (rel / self.samples_per_beat).floor() * self.samples_per_beat
    }

    /// Seconds elapsed at sample position `p`.
    #[inline]
    pub fn seconds_at(&self, p: f64) -> f64 {
        p / self.sample_rate
    }

    /// Apply a tempo change at the current position.
    ///
    /// The grid origin first advances to the most recent beat boundary at or
    /// before the current position under the old tempo; the new spacing then
    /// applies from that boundary. Beats already announced keep their
    /// indices, and the next beat falls one new-tempo interval after the
    /// anchor, so no click is duplicated or skipped across the change.
    pub fn set_bpm(&mut self, bpm: u32) {
        debug_assert!(bpm > 0, "bpm must be greater than 0");
        if bpm == 0 {
            return;
        }
        let elapsed = self.position - self.origin_sample;
        let beats = (elapsed / self.samples_per_beat).floor();
        if beats > 0.0 {
            self.origin_sample += beats * self.samples_per_beat;
            self.origin_beat += beats as i64;
        }
        self.samples_per_beat = samples_per_beat(self.sample_rate, bpm);
    }

    /// Rewind to sample 0 and re-anchor the grid there.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.origin_sample = 0.0;
        self.origin_beat = 0;
    }
}
