/// Result payload of a finished recording.
///
/// Replaces the untyped dictionary of the original host boundary: the click
/// timestamps are seconds relative to the first recorded frame, and
/// `dropped_samples` reports queue overruns during the session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RecordingSummary {
    pub path: String,
    pub timestamps: Vec<f64>,
    pub bpm: i32,
    pub time_signature: i32,
    pub dropped_samples: u64,
}

/// Snapshot of the engine state for host diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineStatus {
    pub playing: bool,
    pub recording: bool,
    pub bpm: u32,
    pub time_signature: u32,
    pub volume: u32,
    pub position_samples: u64,
    pub input_underruns: u64,
}
