//! # Ambi Common Library
//!
//! Shared code for the ambient reading-music player including:
//! - The fixed PCM audio format and byte/time conversions
//! - Fade curve definitions and calculations
//! - Event types (PlayerEvent enum) and buffer metrics
//! - Configuration file resolution
//! - Common error type

pub mod audio_format;
pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;

pub use audio_format::{AudioFormat, StreamFormat};
pub use error::{Error, Result};
pub use events::{BufferMetrics, ErrorKind, ErrorReport, Handoff, PlayerEvent, SessionStatus};
pub use fade_curves::FadeCurve;
