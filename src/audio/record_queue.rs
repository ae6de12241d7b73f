//! RecordQueue - lock-free transport from the render thread to the writer
//!
//! A single-producer/single-consumer queue of interleaved stereo floats, the
//! sole channel between the real-time render thread and the file-writer
//! worker. Built on rtrb, which publishes the producer index with release
//! semantics and observes it with acquire semantics (and symmetrically for
//! the consumer), so the queue is safe without locks.
//!
//! Capacity is fixed when recording arms and never grows. On overrun the
//! producer drops the sample and increments a shared counter; writer
//! starvation is surfaced to the host in the stop_recording result instead
//! of halting the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

/// Create a record queue holding `capacity_samples` interleaved samples.
///
/// # Panics
/// Panics if `capacity_samples` is 0.
pub fn record_queue(capacity_samples: usize) -> (RecordProducer, RecordConsumer) {
    assert!(capacity_samples > 0, "capacity_samples must be greater than 0");
    let (producer, consumer) = RingBuffer::new(capacity_samples);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        RecordProducer {
            queue: producer,
            dropped: Arc::clone(&dropped),
        },
        RecordConsumer {
            queue: consumer,
            dropped,
        },
    )
}

/// Render-thread half of the record queue.
pub struct RecordProducer {
    queue: Producer<f32>,
    dropped: Arc<AtomicU64>,
}

impl RecordProducer {
    /// Write one sample. Never blocks; returns false and counts the drop
    /// when the queue is full.
    #[inline]
    pub fn write(&mut self, sample: f32) -> bool {
        match self.queue.push(sample) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Write one stereo frame, left then right.
    #[inline]
    pub fn write_frame(&mut self, left: f32, right: f32) -> bool {
        let l_ok = self.write(left);
        let r_ok = self.write(right);
        l_ok && r_ok
    }

    /// Free slots observable by the producer. O(1).
    pub fn available_write(&self) -> usize {
        self.queue.slots()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared drop counter, held by the controller for session reporting.
    pub fn dropped_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

/// Writer-thread half of the record queue.
pub struct RecordConsumer {
    queue: Consumer<f32>,
    dropped: Arc<AtomicU64>,
}

impl RecordConsumer {
    /// Read up to `dst.len()` samples; returns the count actually read.
    pub fn read_into(&mut self, dst: &mut [f32]) -> usize {
        let n = dst.len().min(self.queue.slots());
        if n == 0 {
            return 0;
        }
        let chunk = match self.queue.read_chunk(n) {
            Ok(chunk) => chunk,
            Err(_) => return 0,
        };
        let (first, second) = chunk.as_slices();
        dst[..first.len()].copy_from_slice(first);
        dst[first.len()..first.len() + second.len()].copy_from_slice(second);
        chunk.commit_all();
        n
    }

    /// Samples ready to read. O(1).
    pub fn available_read(&self) -> usize {
        self.queue.slots()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_preserved() {
        // Property: the sequence read equals the sequence written for any
        // prefix that fits within capacity
        let (mut tx, mut rx) = record_queue(1024);
        for i in 0..1000 {
            assert!(tx.write(i as f32));
        }

        let mut out = vec![0.0f32; 1000];
        let mut total = 0;
        while total < 1000 {
            total += rx.read_into(&mut out[total..]);
        }
        for (i, &s) in out.iter().enumerate() {
            assert_eq!(s, i as f32);
        }
    }

    #[test]
    fn test_overrun_drops_and_counts() {
        let (mut tx, rx) = record_queue(8);
        for i in 0..8 {
            assert!(tx.write(i as f32));
        }
        assert!(!tx.write(99.0));
        assert!(!tx.write(100.0));
        assert_eq!(tx.dropped_count(), 2);
        assert_eq!(rx.dropped_count(), 2);
        // Session continues: queued data is intact
        assert_eq!(rx.available_read(), 8);
    }

    #[test]
    fn test_available_counts() {
        let (mut tx, mut rx) = record_queue(16);
        assert_eq!(tx.available_write(), 16);
        assert_eq!(rx.available_read(), 0);

        tx.write_frame(0.1, 0.2);
        assert_eq!(tx.available_write(), 14);
        assert_eq!(rx.available_read(), 2);

        let mut dst = [0.0f32; 2];
        assert_eq!(rx.read_into(&mut dst), 2);
        assert_eq!(dst, [0.1, 0.2]);
        assert_eq!(tx.available_write(), 16);
    }

    #[test]
    fn test_read_into_partial() {
        let (mut tx, mut rx) = record_queue(16);
        tx.write(1.0);
        tx.write(2.0);

        let mut dst = [0.0f32; 8];
        assert_eq!(rx.read_into(&mut dst), 2);
        assert_eq!(&dst[..2], &[1.0, 2.0]);
        assert_eq!(rx.read_into(&mut dst), 0);
    }

    #[test]
    fn test_read_wraps_around_capacity() {
        let (mut tx, mut rx) = record_queue(8);
        let mut dst = [0.0f32; 8];

        // Advance the internal indices past the wrap point
        for round in 0..5 {
            for i in 0..6 {
                assert!(tx.write((round * 6 + i) as f32));
            }
            let n = rx.read_into(&mut dst[..6]);
            assert_eq!(n, 6);
            for i in 0..6 {
                assert_eq!(dst[i], (round * 6 + i) as f32);
            }
        }
    }

    #[test]
    fn test_cross_thread_transfer() {
        let (mut tx, mut rx) = record_queue(4096);
        let total = 100_000usize;

        let producer = std::thread::spawn(move || {
            let mut written = 0usize;
            while written < total {
                if tx.write(written as f32) {
                    written += 1;
                }
            }
        });

        let mut received = Vec::with_capacity(total);
        let mut buf = [0.0f32; 512];
        while received.len() < total {
            let n = rx.read_into(&mut buf);
            received.extend_from_slice(&buf[..n]);
        }
        producer.join().unwrap();

        for (i, &s) in received.iter().enumerate() {
            assert_eq!(s, i as f32);
        }
    }

    #[test]
    #[should_panic(expected = "capacity_samples must be greater than 0")]
    fn test_zero_capacity_panics() {
        record_queue(0);
    }
}
