//! LatencyDelayLine - Fixed stereo delay for on-disk click alignment
//!
//! The musician hears clicks on the output path while their performance is
//! captured with input-path latency. Delaying the click stream destined for
//! the file by the input latency makes a recorded mic transient and the
//! recorded click land on the same sample. Only the input latency is
//! compensated because the live monitor path is what the performer
//! synchronizes to.
//!
//! The line is a fixed interleaved stereo ring pre-filled with silence to
//! the target depth, so reads yield silence until the warm-up zeros drain
//! and exactly the group delay afterwards. No allocation after construction;
//! safe for real-time use.

/// Fixed-length stereo delay line (interleaved storage).
pub struct LatencyDelayLine {
    /// Interleaved ring storage, capacity 2 * (delay + max_block) frames
    buf: Vec<f32>,
    /// Read index in samples
    head: usize,
    /// Occupied samples
    len: usize,
    /// Target depth in samples (2 * delay frames)
    delay_samples: usize,
}

impl LatencyDelayLine {
    /// Create a line delaying by `delay_frames`, able to absorb pushes of up
    /// to `max_block_frames` before the matching reads.
    pub fn new(delay_frames: usize, max_block_frames: usize) -> Self {
        let delay_samples = delay_frames * 2;
        let capacity = delay_samples + max_block_frames.max(1) * 2;
        Self {
            buf: vec![0.0; capacity],
            head: 0,
            len: delay_samples,
            delay_samples,
        }
    }

    /// Group delay in frames.
    pub fn delay_frames(&self) -> usize {
        self.delay_samples / 2
    }

    /// Occupied samples. Equals `2 * delay_frames` between balanced
    /// push/read blocks.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Refill with silence (recording re-arm).
    pub fn clear(&mut self) {
        self.buf.fill(0.0);
        self.head = 0;
        self.len = self.delay_samples;
    }

    /// Append `left.len()` stereo frames.
    ///
    /// Real-time safe as long as the caller honors the `max_block_frames`
    /// bound given at construction.
    #[inline]
    pub fn push_block(&mut self, left: &[f32], right: &[f32]) {
        debug_assert_eq!(left.len(), right.len());
        debug_assert!(self.len + left.len() * 2 <= self.buf.len());
        let cap = self.buf.len();
        let mut tail = (self.head + self.len) % cap;
        for i in 0..left.len() {
            self.buf[tail] = left[i];
            tail = (tail + 1) % cap;
            self.buf[tail] = right[i];
            tail = (tail + 1) % cap;
        }
        self.len += left.len() * 2;
    }

    /// Consume one stereo frame. Returns silence on underflow (cannot occur
    /// when pushes precede reads of the same frame count).
    #[inline]
    pub fn pop_frame(&mut self) -> (f32, f32) {
        if self.len < 2 {
            return (0.0, 0.0);
        }
        let cap = self.buf.len();
        let l = self.buf[self.head];
        let r = self.buf[(self.head + 1) % cap];
        self.head = (self.head + 2) % cap;
        self.len -= 2;
        (l, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_blocks(line: &mut LatencyDelayLine, input: &[f32], block: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len());
        for chunk in input.chunks(block) {
            let right = vec![0.0f32; chunk.len()];
            line.push_block(chunk, &right);
            for _ in 0..chunk.len() {
                out.push(line.pop_frame().0);
            }
        }
        out
    }

    #[test]
    fn test_silence_during_warm_up() {
        let mut line = LatencyDelayLine::new(240, 512);
        let input: Vec<f32> = (1..=240).map(|i| i as f32).collect();

        let out = run_blocks(&mut line, &input, 64);

        assert!(out.iter().all(|&s| s == 0.0), "warm-up reads are silent");
    }

    #[test]
    fn test_group_delay_is_exact() {
        // Property: the i-th frame read after warm-up equals the i-th pushed
        let delay = 240;
        let mut line = LatencyDelayLine::new(delay, 512);
        let input: Vec<f32> = (0..2000).map(|i| (i + 1) as f32).collect();

        let out = run_blocks(&mut line, &input, 160);

        for i in 0..delay {
            assert_eq!(out[i], 0.0);
        }
        for i in delay..input.len() {
            assert_eq!(out[i], input[i - delay], "read {}", i);
        }
    }

    #[test]
    fn test_occupancy_invariant_between_blocks() {
        let mut line = LatencyDelayLine::new(100, 256);
        assert_eq!(line.len(), 200);

        let l = vec![0.5f32; 256];
        let r = vec![0.5f32; 256];
        for _ in 0..10 {
            line.push_block(&l, &r);
            for _ in 0..256 {
                line.pop_frame();
            }
            assert_eq!(line.len(), 200, "len == 2 * delay between blocks");
        }
    }

    #[test]
    fn test_zero_delay_passes_through() {
        let mut line = LatencyDelayLine::new(0, 64);
        line.push_block(&[1.0, 2.0], &[3.0, 4.0]);
        assert_eq!(line.pop_frame(), (1.0, 3.0));
        assert_eq!(line.pop_frame(), (2.0, 4.0));
    }

    #[test]
    fn test_stereo_frames_stay_paired() {
        let mut line = LatencyDelayLine::new(2, 8);
        line.push_block(&[1.0, 2.0, 3.0], &[-1.0, -2.0, -3.0]);
        // First two frames are warm-up silence
        assert_eq!(line.pop_frame(), (0.0, 0.0));
        assert_eq!(line.pop_frame(), (0.0, 0.0));
        assert_eq!(line.pop_frame(), (1.0, -1.0));
    }

    #[test]
    fn test_clear_restores_warm_up() {
        let mut line = LatencyDelayLine::new(4, 16);
        let l = vec![1.0f32; 16];
        let r = vec![1.0f32; 16];
        line.push_block(&l, &r);
        for _ in 0..16 {
            line.pop_frame();
        }

        line.clear();
        assert_eq!(line.len(), 8);
        line.push_block(&[9.0], &[9.0]);
        // Delayed by four frames of silence again
        assert_eq!(line.pop_frame(), (0.0, 0.0));
    }

    #[test]
    fn test_underflow_yields_silence() {
        let mut line = LatencyDelayLine::new(0, 4);
        assert_eq!(line.pop_frame(), (0.0, 0.0));
    }
}
