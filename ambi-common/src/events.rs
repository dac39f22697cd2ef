//! Event types for the player event system
//!
//! Events are broadcast by the session actor and can be serialized for any
//! UI or observability collaborator. All events use this central enum for type
//! safety and exhaustive matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle state
///
/// `idle → connecting → playing ⇄ paused`, with `error` reachable from
/// `connecting`/`playing`/`paused` and `stop` returning any state to `idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session
    #[default]
    Idle,
    /// Opening the message channel, starting and joining the remote session
    Connecting,
    /// Consuming and playing audio
    Playing,
    /// Remote generation and local playback paused
    Paused,
    /// Failed; waits for retry or dismiss
    Error,
}

impl SessionStatus {
    /// Whether a remote session is live in this state
    pub fn has_session(&self) -> bool {
        matches!(self, SessionStatus::Playing | SessionStatus::Paused)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Playing => write!(f, "playing"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Failure classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Channel connect, timeout, or disconnect
    Transport,
    /// Malformed message or unexpected control response
    Protocol,
    /// Remote reports an unknown session id
    SessionExpired,
    /// Platform audio decode/output failure
    Resource,
    /// Invalid configuration
    Config,
    /// Operation not valid in the current state
    State,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Resource => "resource",
            ErrorKind::Config => "config",
            ErrorKind::State => "state",
        };
        write!(f, "{}", name)
    }
}

/// Recorded reason for the `error` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Buffer health snapshot
///
/// Counters are monotonic for the life of a session and zeroed on reset.
/// Read-only to consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferMetrics {
    /// Inbound audio chunks accepted into the chunk buffer
    pub chunks_received: u64,
    /// Bytes carried by accepted chunks
    pub bytes_received: u64,
    /// Malformed chunks logged and dropped
    pub chunks_dropped: u64,
    /// Playable units cut from the stream
    pub units_created: u64,
    /// Units that started playback
    pub units_played: u64,
    /// Times playback needed a unit and none was queued
    pub buffer_underruns: u64,
    /// Units skipped because the output could not decode them
    pub decode_failures: u64,
    /// Units waiting in the scheduler queue
    pub queue_depth: usize,
    /// Arrival time of the most recent chunk
    pub last_chunk_at: Option<DateTime<Utc>>,
    /// Whether a unit is currently audible
    pub is_audible: bool,
}

/// How a unit became the current unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handoff {
    /// Started at full gain with nothing overlapping
    Clean,
    /// Faded in over the previous unit
    Crossfade,
}

/// Player event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Session status changed
    StatusChanged {
        old_status: SessionStatus,
        new_status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// A session was started and joined
    SessionStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A session failed and the player entered the error state
    SessionFailed { report: ErrorReport },

    /// A playable unit was cut from the stream and queued
    UnitQueued {
        unit_id: u64,
        duration_ms: u64,
        queue_depth: usize,
    },

    /// A unit became the current unit
    UnitStarted { unit_id: u64, handoff: Handoff },

    /// A unit could not be decoded and was skipped
    UnitSkipped { unit_id: u64, reason: String },

    /// Playback needed a unit and the queue was empty
    BufferUnderrun {
        underruns: u64,
        timestamp: DateTime<Utc>,
    },

    /// Periodic metrics snapshot
    MetricsUpdated { metrics: BufferMetrics },
}

impl PlayerEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StatusChanged { .. } => "StatusChanged",
            PlayerEvent::SessionStarted { .. } => "SessionStarted",
            PlayerEvent::SessionFailed { .. } => "SessionFailed",
            PlayerEvent::UnitQueued { .. } => "UnitQueued",
            PlayerEvent::UnitStarted { .. } => "UnitStarted",
            PlayerEvent::UnitSkipped { .. } => "UnitSkipped",
            PlayerEvent::BufferUnderrun { .. } => "BufferUnderrun",
            PlayerEvent::MetricsUpdated { .. } => "MetricsUpdated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&SessionStatus::Playing).unwrap(), "\"playing\"");
        let parsed: SessionStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, SessionStatus::Error);
    }

    #[test]
    fn test_has_session() {
        assert!(SessionStatus::Playing.has_session());
        assert!(SessionStatus::Paused.has_session());
        assert!(!SessionStatus::Connecting.has_session());
        assert!(!SessionStatus::Idle.has_session());
        assert!(!SessionStatus::Error.has_session());
    }

    #[test]
    fn test_event_type_matches_tag() {
        let event = PlayerEvent::UnitStarted { unit_id: 3, handoff: Handoff::Crossfade };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["handoff"], "crossfade");
    }

    #[test]
    fn test_default_metrics_are_zeroed() {
        let metrics = BufferMetrics::default();
        assert_eq!(metrics.chunks_received, 0);
        assert_eq!(metrics.buffer_underruns, 0);
        assert!(metrics.last_chunk_at.is_none());
        assert!(!metrics.is_audible);
    }
}
