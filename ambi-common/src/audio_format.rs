//! Fixed PCM audio format
//!
//! The generative backend emits exactly one format: 16-bit signed little-endian
//! PCM, 48 kHz, interleaved stereo. Every byte count and duration in the player
//! is derived from the constants here.

use serde::{Deserialize, Serialize};

/// Raw PCM format description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Bits per sample (per channel)
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// The only format the backend produces: 48 kHz, stereo, 16-bit
    pub const PCM16_STEREO_48K: AudioFormat = AudioFormat {
        sample_rate: 48_000,
        channels: 2,
        bits_per_sample: 16,
    };

    /// Bytes per single-channel sample
    pub const fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Bytes per frame (one sample for every channel)
    pub const fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Same as `frame_bytes`, as stored in a container header
    pub const fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    /// Bytes of audio per second of playback
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Playback duration of `len` bytes, rounded down to whole milliseconds
    pub fn bytes_to_ms(&self, len: usize) -> u64 {
        let frames = (len / self.frame_bytes()) as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Byte length of `ms` milliseconds of audio
    ///
    /// Always a whole number of frames.
    pub fn ms_to_bytes(&self, ms: u64) -> usize {
        let frames = ms * self.sample_rate as u64 / 1000;
        frames as usize * self.frame_bytes()
    }

    /// Largest frame-aligned length not exceeding `len`
    pub fn align_down(&self, len: usize) -> usize {
        len - len % self.frame_bytes()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::PCM16_STEREO_48K
    }
}

/// Stream format advertised by the remote when a session is joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    /// Frames per second
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Interleaved channel count
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Sample encoding name (the backend sends "pcm16")
    #[serde(default = "default_encoding")]
    pub format: String,
}

fn default_sample_rate() -> u32 {
    AudioFormat::PCM16_STEREO_48K.sample_rate
}

fn default_channels() -> u16 {
    AudioFormat::PCM16_STEREO_48K.channels
}

fn default_encoding() -> String {
    "pcm16".to_string()
}

impl StreamFormat {
    /// Whether this advertised stream can be played as `format`
    pub fn matches(&self, format: &AudioFormat) -> bool {
        let bits = match self.format.to_lowercase().as_str() {
            "pcm16" | "s16le" | "pcm_s16le" => 16,
            _ => return false,
        };
        self.sample_rate == format.sample_rate
            && self.channels == format.channels
            && bits == format.bits_per_sample
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            format: default_encoding(),
        }
    }
}
