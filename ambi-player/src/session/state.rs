//! Session data types

use crate::session::channel::{InboundEvent, OutboundEvent};
use ambi_common::{ErrorReport, SessionStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Book descriptor sent when starting a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Book {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            subjects: Vec::new(),
            description: None,
        }
    }
}

/// Mood descriptor chosen by the server for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub weight: f32,
}

/// One live music-generation run
///
/// Owns the message channel for as long as the session exists. Dropping the
/// session closes the channel.
pub struct Session {
    pub session_id: String,
    pub prompts: Vec<Prompt>,
    pub book: Book,
    pub(crate) outbound: mpsc::UnboundedSender<OutboundEvent>,
    pub(crate) inbound: mpsc::Receiver<InboundEvent>,
}

impl Session {
    /// Queue an outbound event; false if the channel is already gone
    pub(crate) fn send(&self, event: OutboundEvent) -> bool {
        self.outbound.send(event).is_ok()
    }
}

/// Published view of the player
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub prompts: Vec<Prompt>,
    pub book: Option<Book>,
    /// Set while in the error state
    pub last_error: Option<ErrorReport>,
}
