//! # Ambi Player Library (ambi-player)
//!
//! Streaming client for a remote ambient-music generator.
//!
//! **Purpose:** Start a generation session for a book, receive raw PCM over a
//! persistent message channel, cut it into self-contained playable units, and
//! play them back to back with seam blending and volume crossfades.
//!
//! **Architecture:** One session actor owns the chunk buffer, the sound
//! scheduler, and the live session; the [`Player`] handle drives it.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;

pub use config::TomlConfig;
pub use error::{Error, Result};
pub use session::{Book, Player, PlayerSnapshot, SessionSettings};
