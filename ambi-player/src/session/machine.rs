//! Session state machine
//!
//! A single actor task owns everything with a lifetime tied to a session: the
//! live [`Session`] (channel included), the chunk buffer, the scheduler, and the
//! receiver of output events. Commands arrive over an mpsc channel and are
//! handled one at a time, so no two mutations ever race.
//!
//! **States:** idle → connecting → playing ⇄ paused, with error reachable from
//! connecting/playing/paused and stop returning any state to idle.
//!
//! The crossfade tick is an arm of the actor's `select!` that is only enabled
//! while the scheduler reports a running crossfade. Pausing or resetting the
//! scheduler disables it in the same step.
//!
//! Remote calls never block playback: every await on the control plane or the
//! channel goes through [`SessionActor::drive`], which keeps the ticker, output
//! events and inbound audio flowing until the call resolves. While connecting,
//! a play, stop or shutdown command abandons the connection attempt.

use crate::audio::{SoundEvent, SoundEventReceiver};
use crate::error::{Error, Result};
use crate::playback::{ChunkBuffer, PlaybackStats, SchedulerConfig, SoundScheduler};
use crate::session::channel::{ChannelConnector, InboundEvent, OutboundEvent};
use crate::session::control::{ControlOutcome, ControlPlane};
use crate::session::state::{Book, PlayerSnapshot, Session};
use ambi_common::{AudioFormat, BufferMetrics, ErrorReport, PlayerEvent, SessionStatus};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Tuning for one player instance
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cut_threshold_bytes: usize,
    pub seam_crossfade_ms: u64,
    pub metrics_every_chunks: u64,
    pub scheduler: SchedulerConfig,
    pub crossfade_tick: Duration,
    pub connect_timeout: Duration,
    pub join_timeout: Duration,
    pub control_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cut_threshold_bytes: crate::playback::chunk_buffer::DEFAULT_CUT_THRESHOLD_BYTES,
            seam_crossfade_ms: crate::playback::chunk_buffer::DEFAULT_SEAM_CROSSFADE_MS,
            metrics_every_chunks: 20,
            scheduler: SchedulerConfig::default(),
            crossfade_tick: Duration::from_millis(20),
            connect_timeout: Duration::from_secs(10),
            join_timeout: Duration::from_secs(10),
            control_timeout: Duration::from_secs(15),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests handled by the actor
pub(crate) enum Command {
    Play { book: Book, reply: Reply<SessionStatus> },
    Pause { reply: Reply<SessionStatus> },
    Resume { reply: Reply<SessionStatus> },
    Stop { reply: Reply<()> },
    Dismiss { reply: Reply<()> },
    Retry { reply: Reply<SessionStatus> },
    RefreshStatus { reply: Reply<SessionStatus> },
    Shutdown { reply: Reply<()> },
}

impl Command {
    /// Commands that abandon a connection attempt in progress
    fn supersedes_connect(&self) -> bool {
        matches!(
            self,
            Command::Play { .. } | Command::Stop { .. } | Command::Shutdown { .. }
        )
    }

    /// Answer without running; used while a connection attempt is in progress
    fn reject(self, status: SessionStatus) {
        let busy = || Error::InvalidState(format!("Busy while {}", status));
        match self {
            Command::Pause { reply }
            | Command::Resume { reply }
            | Command::Retry { reply }
            | Command::RefreshStatus { reply }
            | Command::Play { reply, .. } => {
                let _ = reply.send(Err(busy()));
            }
            Command::Stop { reply } | Command::Dismiss { reply } | Command::Shutdown { reply } => {
                let _ = reply.send(Err(busy()));
            }
        }
    }
}

/// Why a session could not be established
enum Halt {
    Failed(Error),
    /// A newer command took over; it runs once the attempt is unwound
    Superseded(Command),
}

impl From<Error> for Halt {
    fn from(err: Error) -> Self {
        Halt::Failed(err)
    }
}

/// Publishing side shared with the handle
pub(crate) struct Publishers {
    pub snapshot: watch::Sender<PlayerSnapshot>,
    pub metrics: watch::Sender<BufferMetrics>,
    pub events: broadcast::Sender<PlayerEvent>,
}

pub(crate) struct SessionActor {
    settings: SessionSettings,
    control: Arc<dyn ControlPlane>,
    connector: Arc<dyn ChannelConnector>,

    commands: mpsc::Receiver<Command>,
    /// Taken over a connection attempt; handled before the next receive
    deferred: Option<Command>,
    ticker: Interval,

    status: SessionStatus,
    session: Option<Session>,
    buffer: ChunkBuffer,
    scheduler: SoundScheduler,
    sound_rx: SoundEventReceiver,

    chunks_dropped: u64,
    last_book: Option<Book>,
    last_error: Option<ErrorReport>,
    last_playback: PlaybackStats,

    publishers: Publishers,
}

impl SessionActor {
    pub(crate) fn new(
        settings: SessionSettings,
        control: Arc<dyn ControlPlane>,
        connector: Arc<dyn ChannelConnector>,
        commands: mpsc::Receiver<Command>,
        scheduler: SoundScheduler,
        sound_rx: SoundEventReceiver,
        publishers: Publishers,
    ) -> Self {
        let buffer = ChunkBuffer::new(settings.cut_threshold_bytes, settings.seam_crossfade_ms);
        let mut ticker = tokio::time::interval(settings.crossfade_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            settings,
            control,
            connector,
            commands,
            deferred: None,
            ticker,
            status: SessionStatus::Idle,
            session: None,
            buffer,
            scheduler,
            sound_rx,
            chunks_dropped: 0,
            last_book: None,
            last_error: None,
            last_playback: PlaybackStats::default(),
            publishers,
        }
    }

    /// Actor main loop; returns after `Shutdown` or when every handle is gone
    pub(crate) async fn run(mut self) {
        loop {
            if let Some(command) = self.deferred.take() {
                if !self.handle_command(command).await {
                    break;
                }
                continue;
            }

            let crossfading = self.scheduler.crossfade_running();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("All player handles dropped");
                        self.stop().await;
                        break;
                    }
                },
                event = next_inbound(&mut self.session) => {
                    self.handle_inbound(event);
                }
                Some(event) = self.sound_rx.recv() => {
                    self.handle_sound_event(event);
                }
                _ = self.ticker.tick(), if crossfading => self.on_tick(),
            }
        }
        info!("Session actor stopped");
    }

    /// Await `call` while output events, inbound audio and the crossfade
    /// ticker keep being serviced
    ///
    /// With `interruptible`, a play, stop or shutdown command abandons the
    /// call and is returned as `Err`; other commands are rejected as busy.
    async fn drive<T>(
        &mut self,
        call: impl Future<Output = T>,
        interruptible: bool,
    ) -> std::result::Result<T, Command> {
        tokio::pin!(call);
        let mut commands_open = true;

        loop {
            let crossfading = self.scheduler.crossfade_running();
            tokio::select! {
                result = &mut call => return Ok(result),
                command = self.commands.recv(), if interruptible && commands_open => match command {
                    Some(command) if command.supersedes_connect() => return Err(command),
                    Some(command) => command.reject(self.status),
                    None => commands_open = false,
                },
                event = next_inbound(&mut self.session) => {
                    self.handle_inbound(event);
                }
                Some(event) = self.sound_rx.recv() => {
                    self.handle_sound_event(event);
                }
                _ = self.ticker.tick(), if crossfading => self.on_tick(),
            }
        }
    }

    /// [`Self::drive`] for a control call that no command may interrupt
    async fn await_call<T>(&mut self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.drive(call, false).await {
            Ok(result) => result,
            Err(command) => {
                self.deferred = Some(command);
                Err(Error::Cancelled("control call superseded".to_string()))
            }
        }
    }

    fn on_tick(&mut self) {
        self.scheduler.tick_crossfade(Instant::now());
        self.publish_metrics(false);
    }

    /// False once the session `session_id` is no longer the live one
    fn is_live(&self, session_id: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.session_id == session_id)
    }

    /// Returns false when the actor should exit
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Play { book, reply } => {
                let result = self.play(book).await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
            }
            Command::Dismiss { reply } => {
                let _ = reply.send(self.dismiss());
            }
            Command::Retry { reply } => {
                let result = self.retry().await;
                let _ = reply.send(result);
            }
            Command::RefreshStatus { reply } => {
                let result = self.refresh_status().await;
                let _ = reply.send(result);
            }
            Command::Shutdown { reply } => {
                self.stop().await;
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    // ----- commands -------------------------------------------------------

    async fn play(&mut self, book: Book) -> Result<SessionStatus> {
        info!("Starting session for '{}'", book.title);
        self.stop().await;
        self.last_book = Some(book.clone());
        self.set_status(SessionStatus::Connecting);

        match self.establish(book).await {
            Ok(session) => {
                info!(
                    session_id = %session.session_id,
                    prompts = session.prompts.len(),
                    "Session joined"
                );
                let _ = self.publishers.events.send(PlayerEvent::SessionStarted {
                    session_id: session.session_id.clone(),
                    timestamp: Utc::now(),
                });
                self.session = Some(session);
                self.set_status(SessionStatus::Playing);
                self.scheduler.resume(Instant::now());
                self.publish_metrics(true);
                Ok(SessionStatus::Playing)
            }
            Err(Halt::Failed(e)) => {
                self.fail(&e);
                Err(e)
            }
            Err(Halt::Superseded(command)) => {
                info!("Connection attempt abandoned");
                self.reset_to_idle();
                self.deferred = Some(command);
                Err(Error::Cancelled("session start superseded".to_string()))
            }
        }
    }

    /// Connect, start remotely, and join; chunks that arrive before the
    /// join confirmation are buffered with playback held back
    async fn establish(&mut self, book: Book) -> std::result::Result<Session, Halt> {
        self.scheduler.suspend(Instant::now());

        let connector = Arc::clone(&self.connector);
        let connect = bounded(
            self.settings.connect_timeout,
            "channel connect",
            connector.connect(),
        );
        let mut link = self.drive(connect, true).await.map_err(Halt::Superseded)??;
        debug!("Message channel open");

        let control = Arc::clone(&self.control);
        let start = bounded(self.settings.control_timeout, "start", control.start(&book));
        let started = self.drive(start, true).await.map_err(Halt::Superseded)??;
        let session_id = started.session_id.clone();
        debug!(%session_id, "Remote session created");

        if let Err(halt) = self.join(&mut link, &session_id).await {
            self.best_effort_remote_stop(&session_id).await;
            return Err(halt);
        }

        Ok(Session {
            session_id,
            prompts: started.prompts,
            book,
            outbound: link.outbound,
            inbound: link.inbound,
        })
    }

    async fn join(
        &mut self,
        link: &mut crate::session::channel::ChannelLink,
        session_id: &str,
    ) -> std::result::Result<(), Halt> {
        link.outbound
            .send(OutboundEvent::Join {
                session_id: session_id.to_string(),
            })
            .map_err(|_| Error::Transport("Channel closed before join".to_string()))?;

        let deadline = Instant::now() + self.settings.join_timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, link.inbound.recv());
            let event = self
                .drive(next, true)
                .await
                .map_err(Halt::Superseded)?
                .map_err(|_| Error::Timeout("session join".to_string()))?;

            match event {
                None => {
                    return Err(Error::Transport("Channel closed before join".to_string()).into())
                }
                Some(InboundEvent::Joined(format)) => {
                    if !format.matches(&AudioFormat::PCM16_STEREO_48K) {
                        return Err(Error::Protocol(format!(
                            "Unsupported stream format: {} Hz, {} ch, {}",
                            format.sample_rate, format.channels, format.format
                        ))
                        .into());
                    }
                    return Ok(());
                }
                Some(InboundEvent::AudioChunk(bytes)) => self.ingest(bytes),
                Some(InboundEvent::MalformedChunk(reason)) => self.drop_chunk(&reason),
                Some(InboundEvent::Error(message)) => {
                    return Err(Error::Protocol(format!("Join rejected: {}", message)).into())
                }
                Some(InboundEvent::Stopped) => {
                    return Err(Error::SessionExpired(session_id.to_string()).into())
                }
                Some(InboundEvent::Status { .. }) => {}
            }
        }
    }

    async fn pause(&mut self) -> Result<SessionStatus> {
        match self.status {
            SessionStatus::Paused => return Ok(SessionStatus::Paused),
            SessionStatus::Playing => {}
            other => return Err(Error::InvalidState(format!("Cannot pause while {}", other))),
        }
        let session_id = self.session_id()?;

        let control = Arc::clone(&self.control);
        let call = bounded(self.settings.control_timeout, "pause", control.pause(&session_id));
        let outcome = self.await_call(call).await;
        if !self.is_live(&session_id) {
            debug!(%session_id, "Session ended while pausing");
            return Ok(self.status);
        }

        match outcome {
            Ok(ControlOutcome::Ok) => {
                self.scheduler.suspend(Instant::now());
                self.set_status(SessionStatus::Paused);
                self.publish_metrics(true);
                Ok(SessionStatus::Paused)
            }
            Ok(ControlOutcome::NotFound) => {
                info!(%session_id, "Session expired on pause, resetting");
                self.reset_to_idle();
                Ok(SessionStatus::Idle)
            }
            Err(e) if e.resets_silently() => {
                warn!("Pause failed ({}), resetting", e);
                self.reset_to_idle();
                Ok(SessionStatus::Idle)
            }
            Err(e) => Err(e),
        }
    }

    async fn resume(&mut self) -> Result<SessionStatus> {
        match self.status {
            SessionStatus::Playing => return Ok(SessionStatus::Playing),
            SessionStatus::Paused => {}
            other => return Err(Error::InvalidState(format!("Cannot resume while {}", other))),
        }
        let session_id = self.session_id()?;

        let control = Arc::clone(&self.control);
        let call = bounded(self.settings.control_timeout, "resume", control.resume(&session_id));
        let outcome = self.await_call(call).await;
        if !self.is_live(&session_id) {
            debug!(%session_id, "Session ended while resuming");
            return Ok(self.status);
        }

        match outcome {
            Ok(ControlOutcome::Ok) => {
                self.set_status(SessionStatus::Playing);
                self.scheduler.resume(Instant::now());
                self.publish_metrics(true);
                Ok(SessionStatus::Playing)
            }
            Ok(ControlOutcome::NotFound) => {
                info!(%session_id, "Session expired on resume, resetting");
                self.reset_to_idle();
                Ok(SessionStatus::Idle)
            }
            Err(e) if e.resets_silently() => {
                warn!("Resume failed ({}), resetting", e);
                self.reset_to_idle();
                Ok(SessionStatus::Idle)
            }
            Err(e) => Err(e),
        }
    }

    /// Leave, stop remotely (best effort), and reset from any state
    async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session_id = %session.session_id, "Stopping session");
            session.send(OutboundEvent::Leave {
                session_id: session.session_id.clone(),
            });
            self.best_effort_remote_stop(&session.session_id).await;
        }
        self.reset_to_idle();
    }

    fn dismiss(&mut self) -> Result<()> {
        if self.status != SessionStatus::Error {
            return Err(Error::InvalidState(format!(
                "Nothing to dismiss while {}",
                self.status
            )));
        }
        self.last_error = None;
        self.set_status(SessionStatus::Idle);
        Ok(())
    }

    async fn retry(&mut self) -> Result<SessionStatus> {
        if self.status != SessionStatus::Error {
            return Err(Error::InvalidState(format!(
                "Retry is only available after an error (currently {})",
                self.status
            )));
        }
        let book = self
            .last_book
            .clone()
            .ok_or_else(|| Error::InvalidState("No previous book to retry".to_string()))?;
        self.play(book).await
    }

    async fn refresh_status(&mut self) -> Result<SessionStatus> {
        if !self.status.has_session() {
            return Err(Error::InvalidState(format!(
                "No session to refresh while {}",
                self.status
            )));
        }
        let session_id = self.session_id()?;

        let control = Arc::clone(&self.control);
        let call = bounded(self.settings.control_timeout, "status", control.status(&session_id));
        let remote = self.await_call(call).await;
        if !self.is_live(&session_id) {
            debug!(%session_id, "Session ended while refreshing");
            return Ok(self.status);
        }

        match remote {
            Ok(remote) => {
                self.reconcile(remote.is_playing);
                Ok(self.status)
            }
            Err(Error::SessionExpired(_)) => {
                info!(%session_id, "Session expired, resetting");
                self.reset_to_idle();
                Ok(SessionStatus::Idle)
            }
            Err(e) => Err(e),
        }
    }

    // ----- inbound --------------------------------------------------------

    fn handle_inbound(&mut self, event: Option<InboundEvent>) {
        let Some(event) = event else {
            if self.status.has_session() {
                self.fail(&Error::Transport("Message channel disconnected".to_string()));
            } else {
                self.session = None;
            }
            return;
        };

        match event {
            InboundEvent::AudioChunk(bytes) => {
                if self.status.has_session() {
                    self.ingest(bytes);
                }
            }
            InboundEvent::MalformedChunk(reason) => self.drop_chunk(&reason),
            InboundEvent::Status { is_playing } => self.reconcile(is_playing),
            InboundEvent::Stopped => {
                info!("Remote stopped the session");
                self.session = None;
                self.reset_to_idle();
            }
            InboundEvent::Error(message) => {
                self.fail(&Error::Transport(format!("Server error: {}", message)));
            }
            InboundEvent::Joined(_) => debug!("Ignoring repeated join confirmation"),
        }
    }

    /// Align local playback with the remote playing flag
    fn reconcile(&mut self, is_playing: bool) {
        let now = Instant::now();
        match (self.status, is_playing) {
            (SessionStatus::Playing, false) => {
                debug!("Remote reports paused");
                self.scheduler.suspend(now);
                self.set_status(SessionStatus::Paused);
                self.publish_metrics(true);
            }
            (SessionStatus::Paused, true) => {
                debug!("Remote reports playing");
                self.set_status(SessionStatus::Playing);
                self.scheduler.resume(now);
                self.publish_metrics(true);
            }
            _ => {}
        }
    }

    fn ingest(&mut self, bytes: Vec<u8>) {
        let unit = self.buffer.ingest(bytes, Utc::now());
        let created = unit.is_some();
        if let Some(unit) = unit {
            self.scheduler.enqueue(unit, Instant::now());
        }

        let every = self.settings.metrics_every_chunks.max(1);
        let periodic = self.buffer.stats().chunks_received % every == 0;
        self.publish_metrics(created || periodic);
    }

    fn drop_chunk(&mut self, reason: &str) {
        self.chunks_dropped += 1;
        warn!(dropped = self.chunks_dropped, "Dropping malformed chunk: {}", reason);
        self.publish_metrics(true);
    }

    fn handle_sound_event(&mut self, event: SoundEvent) {
        self.scheduler.on_sound_event(event, Instant::now());
        self.publish_metrics(false);
    }

    // ----- transitions ----------------------------------------------------

    fn fail(&mut self, err: &Error) {
        error!("Session failed: {}", err);
        self.session = None;
        self.release_audio();

        let report = ErrorReport {
            kind: err.kind(),
            message: err.to_string(),
            timestamp: Utc::now(),
        };
        let _ = self.publishers.events.send(PlayerEvent::SessionFailed {
            report: report.clone(),
        });
        self.last_error = Some(report);
        self.set_status(SessionStatus::Error);
        self.publish_metrics(true);
    }

    fn reset_to_idle(&mut self) {
        self.session = None;
        self.release_audio();
        self.last_error = None;
        self.set_status(SessionStatus::Idle);
        self.publish_metrics(true);
    }

    /// Release every unit and clear buffers and metrics
    fn release_audio(&mut self) {
        self.scheduler.reset();
        self.buffer.reset();
        self.chunks_dropped = 0;
        // Events from released sounds carry ids that no longer match
        while self.sound_rx.try_recv().is_ok() {}
    }

    async fn best_effort_remote_stop(&mut self, session_id: &str) {
        let control = Arc::clone(&self.control);
        let call = bounded(self.settings.control_timeout, "stop", control.stop(session_id));
        if let Err(e) = self.await_call(call).await {
            warn!(%session_id, "Remote stop failed: {}", e);
        }
    }

    fn session_id(&self) -> Result<String> {
        self.session
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or_else(|| Error::InvalidState("No active session".to_string()))
    }

    fn set_status(&mut self, status: SessionStatus) {
        let old = self.status;
        self.status = status;
        if old != status {
            info!("Status {} -> {}", old, status);
            let _ = self.publishers.events.send(PlayerEvent::StatusChanged {
                old_status: old,
                new_status: status,
                timestamp: Utc::now(),
            });
        }

        let snapshot = PlayerSnapshot {
            status,
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            prompts: self
                .session
                .as_ref()
                .map(|s| s.prompts.clone())
                .unwrap_or_default(),
            book: self.last_book.clone(),
            last_error: self.last_error.clone(),
        };
        self.publishers.snapshot.send_replace(snapshot);
    }

    fn metrics(&self) -> BufferMetrics {
        let ingest = self.buffer.stats();
        let playback = self.scheduler.stats();
        BufferMetrics {
            chunks_received: ingest.chunks_received,
            bytes_received: ingest.bytes_received,
            chunks_dropped: self.chunks_dropped,
            units_created: ingest.units_created,
            units_played: playback.units_played,
            buffer_underruns: playback.buffer_underruns,
            decode_failures: playback.decode_failures,
            queue_depth: playback.queue_depth,
            last_chunk_at: ingest.last_chunk_at,
            is_audible: playback.is_audible,
        }
    }

    /// Publish when forced or when scheduler statistics moved
    fn publish_metrics(&mut self, force: bool) {
        let playback = self.scheduler.stats();
        if !force && playback == self.last_playback {
            return;
        }
        self.last_playback = playback;

        let metrics = self.metrics();
        let changed = self.publishers.metrics.send_if_modified(|current| {
            if *current == metrics {
                false
            } else {
                *current = metrics.clone();
                true
            }
        });
        if changed {
            let _ = self
                .publishers
                .events
                .send(PlayerEvent::MetricsUpdated { metrics });
        }
    }
}

/// Next inbound event, or pending forever without a session
async fn next_inbound(session: &mut Option<Session>) -> Option<InboundEvent> {
    match session {
        Some(session) => session.inbound.recv().await,
        None => std::future::pending().await,
    }
}

/// Bound a remote call by `limit`, mapping expiry to `Error::Timeout`
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!("{} after {} ms", what, limit.as_millis()))),
    }
}
