//! Clock-driven output without an audio device
//!
//! Every loaded sound gets a ticker task that advances its position with the
//! tokio clock while playing, reports `Position` on each tick and `Finished`
//! once the decoded duration has elapsed. Nothing is rendered, which makes this
//! the backend for headless runs and for tests under a paused clock.

use super::decode::decode_wav;
use super::output::{AudioOutput, SoundEvent, SoundEventSender, SoundHandle};
use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

#[derive(Debug)]
struct VoiceState {
    playing: bool,
    gain: f32,
    released: bool,
    position: Duration,
    /// Clock reading when playback last (re)started
    resumed_at: Option<Instant>,
}

impl VoiceState {
    fn position_now(&self, now: Instant) -> Duration {
        match self.resumed_at {
            Some(at) if self.playing => self.position + now.saturating_duration_since(at),
            _ => self.position,
        }
    }
}

type SharedVoice = Arc<Mutex<VoiceState>>;

/// Output backend driven purely by the tokio clock
pub struct VirtualOutput {
    position_interval: Duration,
}

impl VirtualOutput {
    pub fn new(position_interval_ms: u64) -> Self {
        Self {
            position_interval: Duration::from_millis(position_interval_ms.max(1)),
        }
    }
}

impl AudioOutput for VirtualOutput {
    fn load(
        &mut self,
        unit_id: u64,
        container: &[u8],
        events: SoundEventSender,
    ) -> Result<Box<dyn SoundHandle>> {
        let decoded = decode_wav(container)?;
        let duration_ms = decoded.duration_ms();

        let voice: SharedVoice = Arc::new(Mutex::new(VoiceState {
            playing: false,
            gain: 0.0,
            released: false,
            position: Duration::ZERO,
            resumed_at: None,
        }));

        tokio::spawn(run_ticker(
            unit_id,
            Duration::from_millis(duration_ms),
            Arc::clone(&voice),
            self.position_interval,
            events,
        ));

        debug!(unit_id, duration_ms, "Loaded virtual sound");
        Ok(Box::new(VirtualSound {
            unit_id,
            duration_ms,
            voice,
        }))
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

async fn run_ticker(
    unit_id: u64,
    duration: Duration,
    voice: SharedVoice,
    period: Duration,
    events: SoundEventSender,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let now = Instant::now();

        let (released, playing, position) = match voice.lock() {
            Ok(state) => (state.released, state.playing, state.position_now(now)),
            Err(_) => return,
        };

        if released {
            trace!(unit_id, "Virtual sound released");
            return;
        }
        if !playing {
            continue;
        }

        if position >= duration {
            let _ = events.send(SoundEvent::Finished { unit_id });
            if let Ok(mut state) = voice.lock() {
                state.playing = false;
                state.position = duration;
                state.resumed_at = None;
            }
            return;
        }

        let event = SoundEvent::Position {
            unit_id,
            position_ms: position.as_millis() as u64,
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

struct VirtualSound {
    unit_id: u64,
    duration_ms: u64,
    voice: SharedVoice,
}

impl VirtualSound {
    fn with_state(&self, f: impl FnOnce(&mut VoiceState)) {
        if let Ok(mut state) = self.voice.lock() {
            if !state.released {
                f(&mut state);
            }
        }
    }
}

impl SoundHandle for VirtualSound {
    fn unit_id(&self) -> u64 {
        self.unit_id
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn play(&mut self) -> Result<()> {
        self.with_state(|state| {
            if !state.playing {
                state.playing = true;
                state.resumed_at = Some(Instant::now());
            }
        });
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.with_state(|state| {
            if state.playing {
                state.position = state.position_now(Instant::now());
                state.playing = false;
                state.resumed_at = None;
            }
        });
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        self.with_state(|state| state.gain = gain.clamp(0.0, 1.0));
    }

    fn release(&mut self) {
        if let Ok(mut state) = self.voice.lock() {
            state.released = true;
            state.playing = false;
        }
    }
}

impl Drop for VirtualSound {
    fn drop(&mut self) {
        self.release();
    }
}
