//! Playback pipeline
//!
//! Chunk ingestion into playable units and their scheduling onto the output.

pub mod chunk_buffer;
pub mod scheduler;
pub mod unit;

pub use chunk_buffer::{ChunkBuffer, IngestStats};
pub use scheduler::{PlaybackStats, SchedulerConfig, SoundScheduler};
pub use unit::PlayableUnit;
