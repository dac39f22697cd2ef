//! Player handle
//!
//! Cloneable front door to the session actor. Every command is a message with a
//! oneshot reply; state is observed through watch channels and the event
//! broadcast.

use crate::audio::AudioOutput;
use crate::error::{Error, Result};
use crate::playback::SoundScheduler;
use crate::session::channel::ChannelConnector;
use crate::session::control::ControlPlane;
use crate::session::machine::{Command, Publishers, SessionActor, SessionSettings};
use crate::session::state::{Book, PlayerSnapshot};
use ambi_common::{BufferMetrics, PlayerEvent, SessionStatus};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 1000;

/// Handle to a running player
#[derive(Clone)]
pub struct Player {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<PlayerSnapshot>,
    metrics: watch::Receiver<BufferMetrics>,
    events: broadcast::Sender<PlayerEvent>,
}

impl Player {
    /// Spawn the session actor on the current runtime
    pub fn spawn(
        settings: SessionSettings,
        control: Arc<dyn ControlPlane>,
        connector: Arc<dyn ChannelConnector>,
        output: Box<dyn AudioOutput>,
    ) -> (Player, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(PlayerSnapshot::default());
        let (metrics_tx, metrics_rx) = watch::channel(BufferMetrics::default());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (sound_tx, sound_rx) = mpsc::unbounded_channel();

        let scheduler = SoundScheduler::new(
            output,
            sound_tx,
            settings.scheduler.clone(),
            event_tx.clone(),
        );
        let actor = SessionActor::new(
            settings,
            control,
            connector,
            command_rx,
            scheduler,
            sound_rx,
            Publishers {
                snapshot: snapshot_tx,
                metrics: metrics_tx,
                events: event_tx.clone(),
            },
        );
        let task = tokio::spawn(actor.run());

        let player = Player {
            commands: command_tx,
            snapshot: snapshot_rx,
            metrics: metrics_rx,
            events: event_tx,
        };
        (player, task)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| Error::Shutdown)?;
        reply_rx.await.map_err(|_| Error::Shutdown)?
    }

    /// Start a session for `book`, replacing any current one
    ///
    /// Resolves once the session is joined and playing, or with the error
    /// that moved the player into the error state.
    pub async fn play(&self, book: Book) -> Result<SessionStatus> {
        self.request(|reply| Command::Play { book, reply }).await
    }

    /// Pause remote generation and local playback
    ///
    /// Returns `Idle` when the remote session had already expired.
    pub async fn pause(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Stop from any state; never fails while the actor runs
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Clear the error state
    pub async fn dismiss(&self) -> Result<()> {
        self.request(|reply| Command::Dismiss { reply }).await
    }

    /// Start the last book again after an error
    pub async fn retry(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::Retry { reply }).await
    }

    /// Ask the control plane for the session's state and reconcile
    pub async fn refresh_status(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::RefreshStatus { reply }).await
    }

    /// Stop any session and end the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot.borrow().status
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn metrics(&self) -> BufferMetrics {
        self.metrics.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot.clone()
    }

    pub fn watch_metrics(&self) -> watch::Receiver<BufferMetrics> {
        self.metrics.clone()
    }
}
