//! Container decoding using symphonia
//!
//! Turns a wrapped playable unit back into interleaved f32 samples for the
//! output layer. Decoding happens once per unit at load time.

use crate::error::{Error, Result};
use std::io::{Cursor, ErrorKind};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{trace, warn};

/// Fully decoded unit
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved f32 samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Samples per channel
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            n => self.samples.len() / n as usize,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self.sample_rate {
            0 => 0,
            rate => self.frames() as u64 * 1000 / rate as u64,
        }
    }
}

fn decode_error(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Decode(format!("{}: {}", context, err))
}

/// The single PCM track of a unit
struct UnitTrack {
    reader: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
}

fn open_track(container: &[u8]) -> Result<UnitTrack> {
    let stream = MediaSourceStream::new(
        Box::new(Cursor::new(container.to_vec())),
        MediaSourceStreamOptions::default(),
    );
    let mut hint = Hint::new();
    hint.with_extension("wav");

    let reader = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_error("Unrecognized container", e))?
        .format;

    let (track_id, params) = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .map(|t| (t.id, t.codec_params.clone()))
        .ok_or_else(|| Error::Decode("Container has no audio track".to_string()))?;

    Ok(UnitTrack {
        reader,
        track_id,
        params,
    })
}

/// Decode an in-memory WAV container
///
/// # Errors
/// `Error::Decode` when the bytes are not a container, the track lacks a
/// rate or channel layout, or no samples come out.
pub fn decode_wav(container: &[u8]) -> Result<DecodedAudio> {
    let UnitTrack {
        mut reader,
        track_id,
        params,
    } = open_track(container)?;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| Error::Decode("Track has no sample rate".to_string()))?;
    let channels = params
        .channels
        .map(|layout| layout.count() as u16)
        .ok_or_else(|| Error::Decode("Track has no channel layout".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| decode_error("No decoder for track", e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) if packet.track_id() == track_id => packet,
            Ok(_) => continue,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!("Stopped reading unit early: {}", e);
                break;
            }
        };

        let audio = match decoder.decode(&packet) {
            Ok(audio) => audio,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(decode_error("Decoder failed", e)),
        };

        let spec = *audio.spec();
        let frames = audio.capacity();
        if scratch
            .as_ref()
            .is_some_and(|buf| buf.capacity() < frames * spec.channels.count())
        {
            scratch = None;
        }
        let buf = scratch.get_or_insert_with(|| SampleBuffer::new(frames as u64, spec));
        buf.copy_interleaved_ref(audio);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(Error::Decode("Container holds no samples".to_string()));
    }
    trace!(samples = samples.len(), sample_rate, channels, "Decoded unit");

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}
