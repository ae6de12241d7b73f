//! Recording session state shared between threads
//!
//! A session splits into three parts: the render-thread half (delay line and
//! record producer, delivered over the render command queue), the
//! controller-side record (path, writer handle, counters), and the beat log
//! filled by the event dispatcher while a session is active.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{LatencyDelayLine, RecordProducer};
use crate::engine::writer::FileWriter;

/// Audio-thread half of an armed recording.
///
/// Boxed and handed to the render thread through the command queue; retired
/// back to the controller through the reclaim queue so the render thread
/// never frees memory.
pub struct RenderSession {
    pub delay: LatencyDelayLine,
    pub queue: RecordProducer,
    /// Sample position of the first recorded frame, published by the render
    /// thread when the session sees its first recording block
    pub start_position: Arc<AtomicU64>,
    pub started: bool,
}

impl RenderSession {
    pub fn new(delay: LatencyDelayLine, queue: RecordProducer) -> Self {
        Self {
            delay,
            queue,
            start_position: Arc::new(AtomicU64::new(0)),
            started: false,
        }
    }
}

/// Controller-side record of the active session.
pub struct ActiveRecording {
    pub path: PathBuf,
    pub writer: FileWriter,
    pub start_position: Arc<AtomicU64>,
    pub dropped: Arc<AtomicU64>,
}

/// Click-onset log for the recording summary.
///
/// Written by the beat-event dispatcher (non-real-time), drained by the
/// controller at stop. Positions are absolute sample indices; the controller
/// converts to seconds relative to the session start.
pub struct BeatLog {
    active: AtomicBool,
    positions: Mutex<Vec<f64>>,
}

impl BeatLog {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            positions: Mutex::new(Vec::new()),
        }
    }

    /// Begin collecting (recording armed).
    pub fn begin(&self) {
        if let Ok(mut positions) = self.positions.lock() {
            positions.clear();
        }
        self.active.store(true, Ordering::Release);
    }

    /// Record one click onset position if a session is active.
    pub fn record(&self, position: f64) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut positions) = self.positions.lock() {
            positions.push(position);
        }
    }

    /// Stop collecting and drain the log.
    pub fn end(&self) -> Vec<f64> {
        self.active.store(false, Ordering::Release);
        self.positions
            .lock()
            .map(|mut positions| std::mem::take(&mut *positions))
            .unwrap_or_default()
    }
}

impl Default for BeatLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_log_collects_only_while_active() {
        let log = BeatLog::new();
        log.record(100.0);
        assert!(log.end().is_empty());

        log.begin();
        log.record(0.0);
        log.record(24000.0);
        let positions = log.end();
        assert_eq!(positions, vec![0.0, 24000.0]);

        // end() drains and deactivates
        log.record(48000.0);
        assert!(log.end().is_empty());
    }

    #[test]
    fn test_beat_log_begin_clears_previous_session() {
        let log = BeatLog::new();
        log.begin();
        log.record(1.0);
        log.begin();
        log.record(2.0);
        assert_eq!(log.end(), vec![2.0]);
    }
}
