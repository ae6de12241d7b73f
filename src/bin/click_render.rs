//! Offline click-track renderer.
//!
//! Drives the full engine pipeline (render callback, latency delay, record
//! queue, file writer) through the stub backend at faster than real time and
//! writes the result to a WAV file. Useful for verifying tempo, accent, and
//! alignment behavior without audio hardware.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use metronome_recorder::config::AppConfig;
use metronome_recorder::engine::backend::{DeviceLatency, StubBackend};
use metronome_recorder::engine::EngineHandle;

#[derive(Parser, Debug)]
#[command(
    name = "click_render",
    about = "Render a metronome click track to a WAV file offline"
)]
struct Cli {
    /// Output WAV path
    #[arg(long)]
    output: PathBuf,
    /// Tempo in beats per minute
    #[arg(long, default_value_t = 120)]
    bpm: u32,
    /// Beats per bar (values <= 1 disable the accent)
    #[arg(long, default_value_t = 4)]
    time_signature: u32,
    /// Duration to render in seconds
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,
    /// Sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,
    /// Click volume 0..=100
    #[arg(long, default_value_t = 100)]
    volume: u32,
    /// Simulated input latency in milliseconds (delays on-disk clicks)
    #[arg(long, default_value_t = 0.0)]
    input_latency_ms: f64,
}

fn main() -> ExitCode {
    metronome_recorder::api::init_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let backend = Arc::new(StubBackend::with_latency(DeviceLatency {
        input_seconds: cli.input_latency_ms / 1000.0,
        output_seconds: 0.0,
    }));
    let engine = EngineHandle::with_backend(backend.clone(), AppConfig::default());

    // Built-in noise burst, quieter on ordinary beats than on bar starts
    let accent = metronome_recorder::audio::generate_click_sample(cli.sample_rate);
    let normal: Vec<f32> = accent.iter().map(|s| s * 0.6).collect();
    engine
        .init(
            normal,
            accent,
            cli.bpm,
            cli.time_signature,
            cli.volume,
            cli.sample_rate,
        )
        .context("initializing engine")?;
    engine.play().context("starting playback")?;
    engine
        .start_recording(
            cli.output
                .to_str()
                .context("output path is not valid UTF-8")?,
        )
        .context("arming recording")?;

    let total_frames = (cli.seconds * cli.sample_rate as f64) as usize;
    let block = 512;
    let mut remaining = total_frames;
    while remaining > 0 {
        let n = remaining.min(block);
        backend.render_block(n);
        remaining -= n;
    }

    let summary = engine.stop_recording().context("finishing recording")?;
    engine.destroy().context("tearing down engine")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
