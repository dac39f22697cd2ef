//! Chunk accumulation and unit cutting
//!
//! Inbound fragments have no frame boundaries and arbitrary sizes. The buffer
//! collects them until the pending total reaches the cut threshold, then cuts
//! one playable unit out of everything pending.
//!
//! Each cut keeps back the last seam-window bytes as the pending tail. The next
//! cut blends that tail against its own leading window so consecutive units
//! join without a click:
//!
//! ```text
//!   cut n:    [ ...........body n........... | tail n ]
//!   cut n+1:  [ blend(tail n, head) | ...body n+1... | tail n+1 ]
//! ```
//!
//! The tail is always taken from the unblended bytes so seams chain correctly.

use super::unit::PlayableUnit;
use crate::audio::{crossfade, wav};
use ambi_common::AudioFormat;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Reference cut size: 4 s of 48 kHz stereo 16-bit audio
pub const DEFAULT_CUT_THRESHOLD_BYTES: usize = 768_000;

/// Reference seam window
pub const DEFAULT_SEAM_CROSSFADE_MS: u64 = 50;

/// Ingest statistics since the last reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub units_created: u64,
    pub last_chunk_at: Option<DateTime<Utc>>,
}

/// Accumulates raw chunks and cuts playable units
pub struct ChunkBuffer {
    format: AudioFormat,
    cut_threshold: usize,
    /// Seam window in bytes; 0 disables seam smoothing
    seam_len: usize,

    pending: Vec<Vec<u8>>,
    pending_len: usize,
    tail: Option<Vec<u8>>,

    next_unit_id: u64,
    stats: IngestStats,
}

impl ChunkBuffer {
    pub fn new(cut_threshold: usize, seam_crossfade_ms: u64) -> Self {
        let format = AudioFormat::PCM16_STEREO_48K;
        Self {
            format,
            cut_threshold,
            seam_len: format.ms_to_bytes(seam_crossfade_ms),
            pending: Vec::new(),
            pending_len: 0,
            tail: None,
            next_unit_id: 1,
            stats: IngestStats::default(),
        }
    }

    /// Append one chunk; returns the unit cut by this call, if any
    pub fn ingest(&mut self, chunk: Vec<u8>, received_at: DateTime<Utc>) -> Option<PlayableUnit> {
        self.stats.chunks_received += 1;
        self.stats.bytes_received += chunk.len() as u64;
        self.stats.last_chunk_at = Some(received_at);

        if chunk.is_empty() {
            return None;
        }

        self.pending_len += chunk.len();
        self.pending.push(chunk);
        trace!(pending = self.pending_len, "Chunk buffered");

        if self.pending_len >= self.cut_threshold {
            self.cut()
        } else {
            None
        }
    }

    fn cut(&mut self) -> Option<PlayableUnit> {
        let mut buf = std::mem::take(&mut self.pending).concat();
        self.pending_len = 0;

        let aligned = self.format.align_down(buf.len());
        let remainder = buf.split_off(aligned);
        if !remainder.is_empty() {
            self.pending_len = remainder.len();
            self.pending.push(remainder);
        }

        let payload = self.assemble(buf);
        if payload.is_empty() {
            return None;
        }

        let unit_id = self.next_unit_id;
        self.next_unit_id += 1;
        self.stats.units_created += 1;

        let payload_len = payload.len();
        let unit = PlayableUnit::new(unit_id, wav::wrap(&payload), payload_len, &self.format);
        debug!(
            unit_id,
            payload_len,
            duration_ms = unit.duration_ms,
            carried = self.pending_len,
            "Cut playable unit"
        );
        Some(unit)
    }

    /// Build the unit payload from one aligned buffer and rotate the tail
    fn assemble(&mut self, buf: Vec<u8>) -> Vec<u8> {
        let xf = self.seam_len;
        if xf == 0 {
            return buf;
        }

        let previous = self.tail.take();

        if buf.len() < xf {
            // Too short to reserve a tail: emit everything in order
            return match previous {
                Some(mut tail) => {
                    tail.extend_from_slice(&buf);
                    tail
                }
                None => buf,
            };
        }

        let keep = buf.len() - xf;
        self.tail = Some(buf[keep..].to_vec());

        match previous {
            Some(tail) if keep >= xf => {
                let mut payload = crossfade::blend(&tail, &buf[..xf]);
                payload.extend_from_slice(&buf[xf..keep]);
                payload
            }
            Some(mut tail) => {
                tail.extend_from_slice(&buf[..keep]);
                tail
            }
            None => buf[..keep].to_vec(),
        }
    }

    /// Drop pending bytes, the tail, and statistics
    ///
    /// Unit ids keep counting so stale sound events never match a new unit.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_len = 0;
        self.tail = None;
        self.stats = IngestStats::default();
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// Bytes waiting for the next cut
    pub fn pending_len(&self) -> usize {
        self.pending_len
    }

    /// Current tail length (0 or the seam window)
    pub fn tail_len(&self) -> usize {
        self.tail.as_ref().map_or(0, Vec::len)
    }

    pub fn seam_len(&self) -> usize {
        self.seam_len
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CUT_THRESHOLD_BYTES, DEFAULT_SEAM_CROSSFADE_MS)
    }
}
