//! End-to-end scenarios for the metronome/recording engine.
//!
//! Every test drives the full pipeline (render callback, delay line, record
//! queue, writer worker, beat dispatch) through the stub backend, so no
//! audio hardware is required.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use metronome_recorder::config::AppConfig;
use metronome_recorder::engine::backend::{DeviceLatency, StubBackend};
use metronome_recorder::engine::EngineHandle;
use metronome_recorder::error::RecordingError;

fn stub_engine_with(
    latency: DeviceLatency,
    config: AppConfig,
) -> (Arc<StubBackend>, EngineHandle) {
    let backend = Arc::new(StubBackend::with_latency(latency));
    let engine = EngineHandle::with_backend(backend.clone(), config);
    (backend, engine)
}

fn stub_engine() -> (Arc<StubBackend>, EngineHandle) {
    stub_engine_with(DeviceLatency::ZERO, AppConfig::default())
}

fn drive(backend: &StubBackend, frames: usize, block: usize) -> (Vec<f32>, Vec<f32>) {
    let mut all_l = Vec::with_capacity(frames);
    let mut all_r = Vec::with_capacity(frames);
    let mut remaining = frames;
    while remaining > 0 {
        let n = remaining.min(block);
        let (l, r) = backend.render_block(n);
        all_l.extend_from_slice(&l);
        all_r.extend_from_slice(&r);
        remaining -= n;
    }
    (all_l, all_r)
}

fn read_wav_left(path: &Path) -> Vec<f32> {
    let mut reader = hound::WavReader::open(path).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
    let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
    samples.chunks(2).map(|frame| frame[0]).collect()
}

fn onsets(signal: &[f32]) -> Vec<usize> {
    signal
        .iter()
        .enumerate()
        .filter(|(_, &s)| s != 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// S1: impulse click at 120 BPM lands exactly on samples 0 and 24000.
#[test]
fn scenario_s1_impulse_click_positions() {
    let (backend, engine) = stub_engine();
    engine
        .init(vec![1.0, 0.0, 0.0, 0.0], Vec::new(), 120, 4, 100, 48000)
        .unwrap();
    engine.play().unwrap();

    let (l, r) = drive(&backend, 48000, 512);

    assert_eq!(l[0], 1.0);
    assert_eq!(r[0], 1.0);
    assert_eq!(l[24000], 1.0);
    assert_eq!(r[24000], 1.0);
    assert_eq!(onsets(&l), vec![0, 24000]);
    assert_eq!(onsets(&r), vec![0, 24000]);
}

/// S2: with ts=3, the accent sounds on the bar start only.
#[test]
fn scenario_s2_accent_on_bar_start() {
    let (backend, engine) = stub_engine();
    engine
        .init(vec![0.5], vec![1.0], 120, 3, 100, 48000)
        .unwrap();
    engine.play().unwrap();

    let (l, _) = drive(&backend, 24000 * 3, 512);

    assert_eq!(l[0], 1.0);
    assert_eq!(l[24000], 0.5);
    assert_eq!(l[48000], 0.5);
    assert_eq!(onsets(&l).len(), 3);
}

/// S3: ten seconds at 60 BPM with a 5 ms input latency puts ten click
/// onsets in the file at 240 + 48000k.
#[test]
fn scenario_s3_latency_compensated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s3.wav");
    let (backend, engine) = stub_engine_with(
        DeviceLatency {
            input_seconds: 0.005,
            output_seconds: 0.012,
        },
        AppConfig::default(),
    );
    engine.init(vec![1.0], Vec::new(), 60, 4, 100, 48000).unwrap();
    engine.start_recording(path.to_str().unwrap()).unwrap();
    engine.play().unwrap();

    drive(&backend, 480_000, 512);
    let summary = engine.stop_recording().unwrap();

    assert_eq!(summary.dropped_samples, 0);
    let left = read_wav_left(&path);
    assert_eq!(left.len(), 480_000);
    let expected: Vec<usize> = (0..10).map(|k| 240 + 48000 * k).collect();
    assert_eq!(onsets(&left), expected);
}

/// S4: a 1024-float queue with a stalled writer overruns; the session
/// continues and the counter is reported on stop.
#[test]
fn scenario_s4_ring_overrun_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s4.wav");

    let mut config = AppConfig::default();
    // 1024 interleaved samples of queue...
    config.recording.ring_seconds = 512.0 / 48000.0;
    // ...and a writer that sleeps for a second once the queue runs dry
    config.recording.writer_idle_sleep_ms = 1000;
    let (backend, engine) = stub_engine_with(DeviceLatency::ZERO, config);

    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();
    engine.start_recording(path.to_str().unwrap()).unwrap();
    engine.play().unwrap();

    // One second of audio rendered faster than the stalled writer drains
    drive(&backend, 48000, 512);
    let summary = engine.stop_recording().unwrap();

    assert!(summary.dropped_samples > 0, "overrun must be reported");
    let left = read_wav_left(&path);
    // The file holds exactly what was drained: everything except the drops
    assert_eq!(left.len() as u64, 48000 - summary.dropped_samples / 2);
}

/// S5: at 240 BPM with ts=4, two seconds produce exactly eight beat events
/// cycling 0,1,2,3.
#[test]
fn scenario_s5_beat_events() {
    let (backend, engine) = stub_engine();
    let mut events = engine.subscribe_beat_events();
    engine.init(vec![1.0], Vec::new(), 240, 4, 100, 48000).unwrap();
    engine.play().unwrap();

    drive(&backend, 96000, 512);
    std::thread::sleep(Duration::from_millis(20));

    let mut values = Vec::new();
    while let Ok(value) = events.try_recv() {
        values.push(value);
    }
    assert_eq!(values, vec![0, 1, 2, 3, 0, 1, 2, 3]);
}

/// S6: a tempo change from 120 to 180 BPM after exactly 24000 frames keeps
/// the old grid before the change and spaces clicks 16000 samples after it,
/// with no duplicate or skip at the boundary.
#[test]
fn scenario_s6_tempo_change_mid_run() {
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();
    engine.play().unwrap();

    let (first, _) = drive(&backend, 24000, 512);
    engine.set_bpm(180).unwrap();
    let (second, _) = drive(&backend, 48000, 512);

    let mut combined = first;
    combined.extend_from_slice(&second);
    assert_eq!(onsets(&combined), vec![0, 24000, 40000, 56000]);
}

/// On-disk alignment: a mic impulse played in time with a monitored click
/// lands on the same file sample as the click.
#[test]
fn test_mic_and_click_align_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("align.wav");
    let latency_frames = 240usize;
    let (backend, engine) = stub_engine_with(
        DeviceLatency {
            input_seconds: latency_frames as f64 / 48000.0,
            output_seconds: 0.0,
        },
        AppConfig::default(),
    );
    engine.init(vec![1.0], Vec::new(), 60, 4, 100, 48000).unwrap();
    engine.enable_microphone().unwrap();
    engine.start_recording(path.to_str().unwrap()).unwrap();
    engine.play().unwrap();

    // The musician strikes exactly when they hear the click at sample 0;
    // the capture path delivers that transient `latency_frames` later.
    let mut captured = vec![0.0f32; 48000 * 2];
    captured[latency_frames * 2] = 0.8;
    captured[latency_frames * 2 + 1] = 0.8;
    backend.push_input(&captured);

    drive(&backend, 48000, 512);
    engine.stop_recording().unwrap();

    let left = read_wav_left(&path);
    // Click delayed to 240; mic transient captured at 240: same sample
    assert!((left[latency_frames] - 1.8).abs() < 1e-6);
    assert_eq!(onsets(&left), vec![latency_frames]);
}

/// Recording while paused captures mic-only silence but still honors the
/// session length and summary bookkeeping.
#[test]
fn test_record_without_playback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("micless.wav");
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();
    engine.start_recording(path.to_str().unwrap()).unwrap();

    drive(&backend, 24000, 512);
    let summary = engine.stop_recording().unwrap();

    assert!(summary.timestamps.is_empty(), "no clicks while paused");
    let left = read_wav_left(&path);
    assert_eq!(left.len(), 24000);
    assert!(left.iter().all(|&s| s == 0.0));
}

/// A second recording session on the same engine starts clean.
#[test]
fn test_back_to_back_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();
    engine.play().unwrap();

    for take in 0..2 {
        let path = dir.path().join(format!("take{}.wav", take));
        engine.start_recording(path.to_str().unwrap()).unwrap();
        drive(&backend, 12000, 512);
        let summary = engine.stop_recording().unwrap();
        assert_eq!(summary.dropped_samples, 0);
        assert_eq!(read_wav_left(&path).len(), 12000);
    }
}

/// Recording into an unwritable path fails at arming time and leaves the
/// engine usable.
#[test]
fn test_start_recording_bad_path() {
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();

    let result = engine.start_recording("/nonexistent-dir/deep/take.wav");
    assert!(matches!(result, Err(RecordingError::Io { .. })));
    assert!(!engine.is_recording());

    // Engine still renders afterwards
    engine.play().unwrap();
    let (l, _) = drive(&backend, 512, 512);
    assert_eq!(l[0], 1.0);
}

/// Volume scales the click on both the monitor and the record path.
#[test]
fn test_volume_scales_click() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("volume.wav");
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 50, 48000).unwrap();
    engine.start_recording(path.to_str().unwrap()).unwrap();
    engine.play().unwrap();

    let (l, _) = drive(&backend, 4800, 480);
    engine.stop_recording().unwrap();

    assert!((l[0] - 0.5).abs() < 1e-6);
    let left = read_wav_left(&path);
    assert!((left[0] - 0.5).abs() < 1e-6);
}

/// Live click replacement takes effect without a restart.
#[test]
fn test_click_replacement_while_running() {
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();
    engine.play().unwrap();

    let (l, _) = drive(&backend, 512, 512);
    assert_eq!(l[0], 1.0);

    engine.set_click_sounds(Some(vec![0.25]), None).unwrap();
    drive(&backend, 24000 - 512, 512);
    let (l, _) = drive(&backend, 512, 512);
    assert_eq!(l[0], 0.25, "next beat uses the swapped buffer");
}

/// Full teardown mid-recording is safe and drains what was captured.
#[test]
fn test_destroy_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teardown.wav");
    let (backend, engine) = stub_engine();
    engine.init(vec![1.0], Vec::new(), 120, 4, 100, 48000).unwrap();
    engine.play().unwrap();
    engine.start_recording(path.to_str().unwrap()).unwrap();
    drive(&backend, 4800, 480);

    engine.destroy().unwrap();
    assert!(!engine.is_recording());
    assert_eq!(read_wav_left(&path).len(), 4800);
}
