// Audio module - sample clock, click synthesis, and lock-free transport

pub mod click;
pub mod clock;
pub mod delay_line;
pub mod record_queue;

// Re-export commonly used types for convenience
pub use click::{generate_click_sample, BeatTick, ClickVoice, MAX_CLICK_SAMPLES};
pub use clock::SampleClock;
pub use delay_line::LatencyDelayLine;
pub use record_queue::{record_queue, RecordConsumer, RecordProducer};
