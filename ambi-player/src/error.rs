//! Error types for ambi-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Every variant maps onto one failure class via [`Error::kind`].

use ambi_common::ErrorKind;
use thiserror::Error;

/// Main error type for ambi-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message channel or control-plane connection errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// A bounded wait expired (connect, join, or control call)
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Malformed message or unexpected control response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Remote no longer knows the session id
    #[error("Session not found: {0}")]
    SessionExpired(String),

    /// Audio container decode errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A newer command abandoned the operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The session actor is gone
    #[error("Player shut down")]
    Shutdown,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared crate
    #[error(transparent)]
    Common(#[from] ambi_common::Error),
}

impl Error {
    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Transport(_) | Error::Timeout(_) | Error::Io(_) => ErrorKind::Transport,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::SessionExpired(_) => ErrorKind::SessionExpired,
            Error::Decode(_) | Error::AudioOutput(_) => ErrorKind::Resource,
            Error::InvalidState(_) | Error::Cancelled(_) | Error::Shutdown => ErrorKind::State,
            Error::Common(ambi_common::Error::Io(_)) => ErrorKind::Transport,
            Error::Common(_) => ErrorKind::Config,
        }
    }

    /// Transport failures and expired sessions end a pause/resume silently
    pub fn resets_silently(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::SessionExpired)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Protocol(format!("Unexpected control response: {}", err))
        } else if err.is_timeout() {
            Error::Timeout(format!("Control request: {}", err))
        } else {
            Error::Transport(format!("Control request failed: {}", err))
        }
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Error::Transport(format!("WebSocket: {}", err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid server URL: {}", err))
    }
}

/// Convenience Result type using ambi-player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        assert_eq!(Error::Timeout("connect".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::Transport("closed".into()).kind(), ErrorKind::Transport);
        assert_eq!(Error::Protocol("bad".into()).kind(), ErrorKind::Protocol);
        assert_eq!(Error::SessionExpired("abc".into()).kind(), ErrorKind::SessionExpired);
        assert_eq!(Error::Decode("riff".into()).kind(), ErrorKind::Resource);
        assert_eq!(Error::InvalidState("idle".into()).kind(), ErrorKind::State);
        assert_eq!(Error::Cancelled("stop".into()).kind(), ErrorKind::State);
    }

    #[test]
    fn test_silent_reset_classes() {
        assert!(Error::Timeout("pause".into()).resets_silently());
        assert!(Error::SessionExpired("abc".into()).resets_silently());
        assert!(!Error::Protocol("500".into()).resets_silently());
        assert!(!Error::InvalidState("idle".into()).resets_silently());
    }
}
