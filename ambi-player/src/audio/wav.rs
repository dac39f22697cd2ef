//! PCM frame codec
//!
//! Wraps raw PCM bytes in the minimal RIFF/WAVE container a platform decoder
//! needs: a 44-byte header followed by the payload untouched.
//!
//! # Header layout (little-endian)
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0  | 4 | "RIFF" |
//! | 4  | 4 | 36 + payload length |
//! | 8  | 4 | "WAVE" |
//! | 12 | 4 | "fmt " |
//! | 16 | 4 | 16 (fmt chunk size) |
//! | 20 | 2 | 1 (PCM format tag) |
//! | 22 | 2 | channels |
//! | 24 | 4 | sample rate |
//! | 28 | 4 | byte rate |
//! | 32 | 2 | block align |
//! | 34 | 2 | bits per sample |
//! | 36 | 4 | "data" |
//! | 40 | 4 | payload length |

use ambi_common::AudioFormat;

/// Size of the container header in bytes
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Wrap `payload` in a container for the fixed 48 kHz stereo 16-bit format
pub fn wrap(payload: &[u8]) -> Vec<u8> {
    wrap_with_format(payload, &AudioFormat::PCM16_STEREO_48K)
}

/// Wrap `payload` in a container describing `format`
///
/// Total for every input: lengths beyond `u32` saturate in the header.
pub fn wrap_with_format(payload: &[u8], format: &AudioFormat) -> Vec<u8> {
    let data_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    let riff_len = data_len.saturating_add(36);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&format.block_align().to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u16_at(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([buf[offset], buf[offset + 1]])
    }

    fn u32_at(buf: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
    }

    #[test]
    fn test_header_fields() {
        let payload = vec![0u8; 9_600];
        let wav = wrap(&payload);

        assert_eq!(wav.len(), HEADER_LEN + payload.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + 9_600);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16);
        assert_eq!(u16_at(&wav, 20), 1);
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 48_000);
        assert_eq!(u32_at(&wav, 28), 192_000);
        assert_eq!(u16_at(&wav, 32), 4);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), 9_600);
    }

    #[test]
    fn test_payload_is_untouched() {
        let payload: Vec<u8> = (0..400u32).map(|i| (i % 251) as u8).collect();
        let wav = wrap(&payload);
        assert_eq!(&wav[HEADER_LEN..], payload.as_slice());
    }

    #[test]
    fn test_empty_payload() {
        let wav = wrap(&[]);
        assert_eq!(wav.len(), HEADER_LEN);
        assert_eq!(u32_at(&wav, 40), 0);
    }

    #[test]
    fn test_readable_by_standard_wav_reader() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN, 42, -42, 7];
        let payload: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let wav = wrap(&payload);
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }
}
