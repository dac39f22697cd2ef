//! Channel connector whose server side is held by the test

use super::WAIT;
use ambi_common::StreamFormat;
use ambi_player::session::{ChannelConnector, ChannelLink, InboundEvent, OutboundEvent, TransportHalf};
use ambi_player::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

pub struct FakeConnector {
    servers: mpsc::UnboundedSender<FakeServer>,
    accepted: Mutex<mpsc::UnboundedReceiver<FakeServer>>,
    /// Never complete `connect`
    hang: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            servers: tx,
            accepted: Mutex::new(rx),
            hang: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    /// Server side of the next connection the player opens
    pub async fn accept(&self) -> FakeServer {
        let mut accepted = self.accepted.lock().await;
        tokio::time::timeout(WAIT, accepted.recv())
            .await
            .expect("player did not connect in time")
            .expect("connector dropped")
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(&self) -> Result<ChannelLink> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        let (link, half) = ChannelLink::pair();
        let _ = self.servers.send(FakeServer { half });
        Ok(link)
    }
}

/// The remote end of one connection
pub struct FakeServer {
    half: TransportHalf,
}

impl FakeServer {
    pub async fn next_outbound(&mut self) -> OutboundEvent {
        tokio::time::timeout(WAIT, self.half.outbound.recv())
            .await
            .expect("no outbound event in time")
            .expect("player closed the channel")
    }

    pub async fn send(&self, event: InboundEvent) {
        self.half
            .inbound
            .send(event)
            .await
            .expect("player closed the channel");
    }

    /// Confirm the join with the standard stream format
    pub async fn joined(&self) {
        self.send(InboundEvent::Joined(StreamFormat::default())).await;
    }

    pub async fn chunk(&self, bytes: Vec<u8>) {
        self.send(InboundEvent::AudioChunk(bytes)).await;
    }

    /// True once the player dropped its side
    pub fn is_closed(&self) -> bool {
        self.half.inbound.is_closed()
    }
}
