//! Message channel abstraction
//!
//! The persistent bidirectional link that carries join/leave requests out and
//! audio plus status notifications in.

use crate::error::Result;
use ambi_common::StreamFormat;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inbound queue depth before the transport applies backpressure
pub const INBOUND_CAPACITY: usize = 256;

/// Client → server events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Join { session_id: String },
    Leave { session_id: String },
}

/// Server → client events
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Room joined; carries the advertised stream format
    Joined(StreamFormat),
    /// Decoded PCM bytes
    AudioChunk(Vec<u8>),
    /// An audio message whose payload could not be decoded
    MalformedChunk(String),
    Status { is_playing: bool },
    /// The remote ended the session
    Stopped,
    Error(String),
}

/// Open channel handed to the session
///
/// A `None` from `inbound` means the channel dropped. Dropping the link
/// closes the underlying connection.
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<OutboundEvent>,
    pub inbound: mpsc::Receiver<InboundEvent>,
}

impl ChannelLink {
    /// Create a linked pair: the client half and the transport half
    pub fn pair() -> (ChannelLink, TransportHalf) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        (
            ChannelLink {
                outbound: out_tx,
                inbound: in_rx,
            },
            TransportHalf {
                outbound: out_rx,
                inbound: in_tx,
            },
        )
    }
}

/// The transport's side of a [`ChannelLink`]
pub struct TransportHalf {
    pub outbound: mpsc::UnboundedReceiver<OutboundEvent>,
    pub inbound: mpsc::Sender<InboundEvent>,
}

/// Opens message channels
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self) -> Result<ChannelLink>;
}
