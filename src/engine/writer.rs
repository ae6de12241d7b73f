//! FileWriter - background WAV writer for recording sessions
//!
//! Runs on a dedicated worker thread. The loop drains the record queue into
//! a scratch buffer and appends the interleaved 32-bit float stereo samples
//! to a WAV file; when the queue is empty it sleeps for the configured idle
//! interval (~1 ms). On stop it keeps draining until the queue is empty, so
//! no sample written to the queue during an arming window is discarded
//! except on overrun.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{info, warn};

use crate::audio::RecordConsumer;
use crate::error::RecordingError;

/// Result of a completed writer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterReport {
    /// Stereo frames appended to the file
    pub frames_written: u64,
}

/// Handle to the writer worker.
pub struct FileWriter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<WriterReport, RecordingError>>>,
    path: PathBuf,
}

impl FileWriter {
    /// Create the output file and launch the worker.
    ///
    /// The WAV header is written immediately so path and permission errors
    /// surface synchronously at arming time.
    pub fn spawn(
        path: &Path,
        sample_rate: u32,
        consumer: RecordConsumer,
        chunk_samples: usize,
        idle_sleep: Duration,
    ) -> Result<Self, RecordingError> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)?;
        info!("[FileWriter] Recording to {:?} at {} Hz", path, sample_rate);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let chunk = chunk_samples.max(2);

        let handle = thread::Builder::new()
            .name("recording-writer".to_string())
            .spawn(move || run_writer(writer, consumer, stop_flag, chunk, idle_sleep))
            .map_err(|err| RecordingError::WriterFailed {
                reason: format!("failed to spawn writer thread: {}", err),
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Request stop, wait for the final drain, and return the report.
    ///
    /// Blocks the calling (host) thread until the worker has drained the
    /// queue and finalized the file. Safe to call exactly once; the handle
    /// is consumed.
    pub fn finish(mut self) -> Result<WriterReport, RecordingError> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| RecordingError::WriterFailed {
                reason: "writer thread panicked".to_string(),
            })?,
            None => Err(RecordingError::WriterFailed {
                reason: "writer already finished".to_string(),
            }),
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        // Abandoned without finish(): stop the worker, losing the report
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_writer(
    mut writer: WavWriter<std::io::BufWriter<std::fs::File>>,
    mut consumer: RecordConsumer,
    stop: Arc<AtomicBool>,
    chunk_samples: usize,
    idle_sleep: Duration,
) -> Result<WriterReport, RecordingError> {
    let mut scratch = vec![0.0f32; chunk_samples];
    let mut samples_written: u64 = 0;
    let mut write_error: Option<RecordingError> = None;

    loop {
        let n = consumer.read_into(&mut scratch);
        if n > 0 {
            if write_error.is_none() {
                for &sample in &scratch[..n] {
                    if let Err(err) = writer.write_sample(sample) {
                        warn!("[FileWriter] Write failed, draining without output: {}", err);
                        write_error = Some(err.into());
                        break;
                    }
                    samples_written += 1;
                }
            }
            // On error keep draining so the render side is never back-pressured
        } else if stop.load(Ordering::Acquire) {
            break;
        } else {
            thread::sleep(idle_sleep);
        }
    }

    // Close the file even when a write failed mid-session
    let finalize_result = writer.finalize();
    if let Some(err) = write_error {
        return Err(err);
    }
    finalize_result?;

    info!(
        "[FileWriter] Finalized recording, {} frames",
        samples_written / 2
    );
    Ok(WriterReport {
        frames_written: samples_written / 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::record_queue;
    use tempfile::tempdir;

    fn read_wav(path: &Path) -> (WavSpec, Vec<f32>) {
        let mut reader = hound::WavReader::open(path).unwrap();
        let spec = reader.spec();
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_writes_float_stereo_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let (mut tx, rx) = record_queue(4096);

        let writer =
            FileWriter::spawn(&path, 48000, rx, 1024, Duration::from_millis(1)).unwrap();
        for i in 0..512 {
            tx.write_frame(i as f32, -(i as f32));
        }
        let report = writer.finish().unwrap();

        assert_eq!(report.frames_written, 512);
        let (spec, samples) = read_wav(&path);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(samples.len(), 1024);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[2], 1.0);
        assert_eq!(samples[3], -1.0);
    }

    #[test]
    fn test_drains_fully_on_stop() {
        // Samples queued before the stop request all land in the file
        let dir = tempdir().unwrap();
        let path = dir.path().join("drain.wav");
        let (mut tx, rx) = record_queue(100_000);

        for i in 0..40_000 {
            assert!(tx.write(i as f32));
        }
        // Large idle sleep: the worker has had no chance to drain yet
        let writer =
            FileWriter::spawn(&path, 48000, rx, 4096, Duration::from_millis(50)).unwrap();
        let report = writer.finish().unwrap();

        assert_eq!(report.frames_written, 20_000);
        let (_, samples) = read_wav(&path);
        assert_eq!(samples.len(), 40_000);
        assert_eq!(samples[39_999], 39_999.0);
    }

    #[test]
    fn test_fifo_order_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fifo.wav");
        let (mut tx, rx) = record_queue(8192);

        let writer =
            FileWriter::spawn(&path, 44100, rx, 512, Duration::from_millis(1)).unwrap();
        for i in 0..4096 {
            while !tx.write(i as f32) {
                thread::sleep(Duration::from_micros(100));
            }
        }
        writer.finish().unwrap();

        let (_, samples) = read_wav(&path);
        for (i, &s) in samples.iter().enumerate() {
            assert_eq!(s, i as f32);
        }
    }

    #[test]
    fn test_spawn_fails_on_bad_path() {
        let (_tx, rx) = record_queue(64);
        let result = FileWriter::spawn(
            Path::new("/nonexistent-dir/deep/take.wav"),
            48000,
            rx,
            512,
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(RecordingError::Io { .. })));
    }

    #[test]
    fn test_empty_session_produces_valid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let (_tx, rx) = record_queue(64);

        let writer =
            FileWriter::spawn(&path, 48000, rx, 512, Duration::from_millis(1)).unwrap();
        let report = writer.finish().unwrap();

        assert_eq!(report.frames_written, 0);
        let (_, samples) = read_wav(&path);
        assert!(samples.is_empty());
    }
}
