//! Sound scheduler
//!
//! Owns the FIFO of playable units and decides when each one is heard.
//!
//! **Handoff paths:**
//! - Gapless: once the current unit's position reaches
//!   `duration − crossfade window` and another unit is queued, the next unit is
//!   started silently and a timed volume crossfade moves the gain over.
//! - Fallback: a unit's natural completion releases it and advances cleanly.
//!
//! **Unit lifecycle:** queued → current → (outgoing) → released. At most one
//! unit is current and at most one is outgoing at any instant.
//!
//! The scheduler never reads the clock itself. Every time-dependent call takes
//! `now`, and the owner drives [`SoundScheduler::tick_crossfade`] while
//! [`SoundScheduler::crossfade_running`] is true.

use super::unit::PlayableUnit;
use crate::audio::{AudioOutput, SoundEvent, SoundEventSender, SoundHandle};
use ambi_common::{FadeCurve, Handoff, PlayerEvent};
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Units that must be queued before the very first unit starts
    pub min_start_units: usize,
    /// Volume crossfade window for gapless handoff
    pub crossfade: Duration,
    pub curve: FadeCurve,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_start_units: 2,
            crossfade: Duration::from_millis(400),
            curve: FadeCurve::EqualPower,
        }
    }
}

/// Playback statistics since the last reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub units_played: u64,
    pub buffer_underruns: u64,
    pub decode_failures: u64,
    pub queue_depth: usize,
    pub is_audible: bool,
}

struct ActiveSound {
    unit_id: u64,
    duration_ms: u64,
    handle: Box<dyn SoundHandle>,
    /// Its successor has already been started
    handed_off: bool,
}

impl ActiveSound {
    fn release(mut self) {
        self.handle.release();
        debug!(unit_id = self.unit_id, "Released unit");
    }
}

/// In-flight volume crossfade
struct Crossfade {
    /// None once the outgoing unit ended on its own
    outgoing: Option<ActiveSound>,
    /// Progress accumulated before the last suspend
    elapsed_before: Duration,
    /// Set while running, cleared while suspended
    resumed_at: Option<Instant>,
}

impl Crossfade {
    fn elapsed(&self, now: Instant) -> Duration {
        match self.resumed_at {
            Some(at) => self.elapsed_before + now.saturating_duration_since(at),
            None => self.elapsed_before,
        }
    }
}

/// Queue + gapless handoff + volume crossfade
pub struct SoundScheduler {
    output: Box<dyn AudioOutput>,
    sound_events: SoundEventSender,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<PlayerEvent>,

    queue: VecDeque<PlayableUnit>,
    current: Option<ActiveSound>,
    crossfade: Option<Crossfade>,

    /// Initial playback has begun since the last reset
    started: bool,
    /// Paused by the session; nothing may start while set
    suspended: bool,

    units_played: u64,
    buffer_underruns: u64,
    decode_failures: u64,
}

impl SoundScheduler {
    pub fn new(
        output: Box<dyn AudioOutput>,
        sound_events: SoundEventSender,
        config: SchedulerConfig,
        event_tx: broadcast::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            output,
            sound_events,
            config,
            event_tx,
            queue: VecDeque::new(),
            current: None,
            crossfade: None,
            started: false,
            suspended: false,
            units_played: 0,
            buffer_underruns: 0,
            decode_failures: 0,
        }
    }

    /// Append a unit and start or continue playback when allowed
    pub fn enqueue(&mut self, unit: PlayableUnit, now: Instant) {
        let _ = self.event_tx.send(PlayerEvent::UnitQueued {
            unit_id: unit.unit_id,
            duration_ms: unit.duration_ms,
            queue_depth: self.queue.len() + 1,
        });
        debug!(unit_id = unit.unit_id, depth = self.queue.len() + 1, "Unit queued");
        self.queue.push_back(unit);

        if !self.suspended {
            self.start_if_ready(now);
        }
    }

    fn start_if_ready(&mut self, now: Instant) {
        if self.current.is_some() {
            return;
        }
        if !self.started {
            if self.queue.len() >= self.config.min_start_units {
                info!("Starting playback with {} units buffered", self.queue.len());
                self.started = true;
                self.advance(false, now);
            }
        } else if !self.queue.is_empty() {
            self.advance(false, now);
        }
    }

    /// Pop the queue head and make it current
    ///
    /// `overlap` selects a volume crossfade from the current unit instead of a
    /// clean switch. An empty queue counts as an underrun only for a
    /// non-overlap call after playback has started.
    pub fn advance(&mut self, overlap: bool, now: Instant) {
        loop {
            let Some(unit) = self.queue.pop_front() else {
                if self.started && !overlap {
                    self.buffer_underruns += 1;
                    warn!("Buffer underrun ({} total)", self.buffer_underruns);
                    let _ = self.event_tx.send(PlayerEvent::BufferUnderrun {
                        underruns: self.buffer_underruns,
                        timestamp: Utc::now(),
                    });
                }
                return;
            };

            let mut handle =
                match self
                    .output
                    .load(unit.unit_id, &unit.container, self.sound_events.clone())
                {
                    Ok(handle) => handle,
                    Err(e) => {
                        self.skip(unit.unit_id, e.to_string());
                        continue;
                    }
                };

            let crossfading = overlap && self.current.is_some() && self.crossfade.is_none();
            handle.set_gain(if crossfading { 0.0 } else { 1.0 });
            if let Err(e) = handle.play() {
                handle.release();
                self.skip(unit.unit_id, e.to_string());
                continue;
            }

            let incoming = ActiveSound {
                unit_id: unit.unit_id,
                duration_ms: handle.duration_ms(),
                handle,
                handed_off: false,
            };

            let handoff = if crossfading {
                let mut outgoing = self.current.take();
                if let Some(sound) = outgoing.as_mut() {
                    sound.handed_off = true;
                }
                self.crossfade = Some(Crossfade {
                    outgoing,
                    elapsed_before: Duration::ZERO,
                    resumed_at: Some(now),
                });
                Handoff::Crossfade
            } else {
                self.finish_crossfade();
                if let Some(previous) = self.current.take() {
                    previous.release();
                }
                Handoff::Clean
            };

            debug!(
                unit_id = incoming.unit_id,
                duration_ms = incoming.duration_ms,
                ?handoff,
                "Unit started"
            );
            let _ = self.event_tx.send(PlayerEvent::UnitStarted {
                unit_id: incoming.unit_id,
                handoff,
            });
            self.current = Some(incoming);
            self.units_played += 1;
            return;
        }
    }

    fn skip(&mut self, unit_id: u64, reason: String) {
        self.decode_failures += 1;
        warn!(unit_id, "Skipping unit that failed to load: {}", reason);
        let _ = self
            .event_tx
            .send(PlayerEvent::UnitSkipped { unit_id, reason });
    }

    /// Route one output event
    pub fn on_sound_event(&mut self, event: SoundEvent, now: Instant) {
        match event {
            SoundEvent::Position {
                unit_id,
                position_ms,
            } => self.on_position(unit_id, position_ms, now),
            SoundEvent::Finished { unit_id } => self.on_finished(unit_id, now),
        }
    }

    /// Pre-empt the end of the current unit with a crossfade into the next
    pub fn on_position(&mut self, unit_id: u64, position_ms: u64, now: Instant) {
        if self.suspended || self.crossfade.is_some() || self.queue.is_empty() {
            return;
        }
        let window_ms = self.config.crossfade.as_millis() as u64;
        let due = match &self.current {
            Some(current) if current.unit_id == unit_id && !current.handed_off => {
                position_ms >= current.duration_ms.saturating_sub(window_ms)
            }
            _ => false,
        };
        if due {
            debug!(unit_id, position_ms, "Crossfade point reached");
            self.advance(true, now);
        }
    }

    /// Natural end of a unit
    pub fn on_finished(&mut self, unit_id: u64, now: Instant) {
        if let Some(crossfade) = self.crossfade.as_mut() {
            if crossfade.outgoing.as_ref().map(|s| s.unit_id) == Some(unit_id) {
                if let Some(outgoing) = crossfade.outgoing.take() {
                    outgoing.release();
                }
                return;
            }
        }

        if self.current.as_ref().map(|s| s.unit_id) != Some(unit_id) {
            // Stale event from a unit that was already released
            return;
        }

        self.finish_crossfade();
        if let Some(finished) = self.current.take() {
            finished.release();
        }

        if !self.suspended {
            self.advance(false, now);
        }
    }

    /// Recompute crossfade gains; completes the crossfade at the end of the window
    pub fn tick_crossfade(&mut self, now: Instant) {
        let Some(crossfade) = self.crossfade.as_mut() else {
            return;
        };
        if crossfade.resumed_at.is_none() {
            return;
        }

        let window = self.config.crossfade.as_secs_f32();
        let progress = if window > 0.0 {
            crossfade.elapsed(now).as_secs_f32() / window
        } else {
            1.0
        };

        if progress >= 1.0 {
            self.finish_crossfade();
            return;
        }

        let (out_gain, in_gain) = self.config.curve.gains(progress);
        if let Some(outgoing) = crossfade.outgoing.as_mut() {
            outgoing.handle.set_gain(out_gain);
        }
        if let Some(current) = self.current.as_mut() {
            current.handle.set_gain(in_gain);
        }
    }

    /// Release the outgoing unit and bring the current unit to full gain
    fn finish_crossfade(&mut self) {
        let Some(crossfade) = self.crossfade.take() else {
            return;
        };
        if let Some(outgoing) = crossfade.outgoing {
            outgoing.release();
        }
        if let Some(current) = self.current.as_mut() {
            current.handle.set_gain(1.0);
        }
        debug!("Crossfade complete");
    }

    /// True while the owner must keep calling [`Self::tick_crossfade`]
    pub fn crossfade_running(&self) -> bool {
        !self.suspended && self.crossfade.is_some()
    }

    /// Pause current and outgoing in place and freeze any crossfade
    pub fn suspend(&mut self, now: Instant) {
        if self.suspended {
            return;
        }
        self.suspended = true;

        if let Some(crossfade) = self.crossfade.as_mut() {
            crossfade.elapsed_before = crossfade.elapsed(now);
            crossfade.resumed_at = None;
            if let Some(outgoing) = crossfade.outgoing.as_mut() {
                if let Err(e) = outgoing.handle.pause() {
                    warn!(unit_id = outgoing.unit_id, "Failed to pause unit: {}", e);
                }
            }
        }
        if let Some(current) = self.current.as_mut() {
            if let Err(e) = current.handle.pause() {
                warn!(unit_id = current.unit_id, "Failed to pause unit: {}", e);
            }
        }
    }

    /// Undo [`Self::suspend`]; advances if nothing is current
    pub fn resume(&mut self, now: Instant) {
        if !self.suspended {
            return;
        }
        self.suspended = false;

        if let Some(crossfade) = self.crossfade.as_mut() {
            crossfade.resumed_at = Some(now);
            if let Some(outgoing) = crossfade.outgoing.as_mut() {
                if let Err(e) = outgoing.handle.play() {
                    warn!(unit_id = outgoing.unit_id, "Failed to resume unit: {}", e);
                }
            }
        }
        if let Some(current) = self.current.as_mut() {
            if let Err(e) = current.handle.play() {
                warn!(unit_id = current.unit_id, "Failed to resume unit: {}", e);
            }
        }

        if self.started && self.current.is_none() {
            // Counts an underrun when nothing arrived while suspended
            self.advance(false, now);
        } else {
            self.start_if_ready(now);
        }
    }

    /// Release every unit and zero statistics
    pub fn reset(&mut self) {
        self.finish_crossfade();
        if let Some(current) = self.current.take() {
            current.release();
        }
        self.queue.clear();
        self.started = false;
        self.suspended = false;
        self.units_played = 0;
        self.buffer_underruns = 0;
        self.decode_failures = 0;
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            units_played: self.units_played,
            buffer_underruns: self.buffer_underruns,
            decode_failures: self.decode_failures,
            queue_depth: self.queue.len(),
            is_audible: self.current.is_some() && !self.suspended,
        }
    }

    pub fn current_unit_id(&self) -> Option<u64> {
        self.current.as_ref().map(|s| s.unit_id)
    }

    pub fn outgoing_unit_id(&self) -> Option<u64> {
        self.crossfade
            .as_ref()
            .and_then(|c| c.outgoing.as_ref())
            .map(|s| s.unit_id)
    }

    pub fn queued_unit_ids(&self) -> Vec<u64> {
        self.queue.iter().map(|u| u.unit_id).collect()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn output_name(&self) -> &str {
        self.output.name()
    }
}
