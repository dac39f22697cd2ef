//! Playable unit type

use ambi_common::AudioFormat;
use chrono::{DateTime, Utc};

/// One self-contained, decodable slice of the stream
///
/// Holds the wrapped container ready for the output layer. The payload length
/// (container minus header) is always a whole number of frames.
#[derive(Debug, Clone)]
pub struct PlayableUnit {
    /// Monotonically increasing, never reused within a process
    pub unit_id: u64,

    /// Container bytes (header + payload)
    pub container: Vec<u8>,

    /// Raw PCM bytes inside the container
    pub payload_len: usize,

    /// Expected playback length derived from `payload_len`
    pub duration_ms: u64,

    pub created_at: DateTime<Utc>,
}

impl PlayableUnit {
    pub fn new(unit_id: u64, container: Vec<u8>, payload_len: usize, format: &AudioFormat) -> Self {
        Self {
            unit_id,
            container,
            payload_len,
            duration_ms: format.bytes_to_ms(payload_len),
            created_at: Utc::now(),
        }
    }
}
