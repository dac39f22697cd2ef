//! Audio output that records calls instead of rendering
//!
//! Sounds never emit events on their own; tests drive positions and
//! completions through the scheduler directly or through `OutputLog::emit`.

use ambi_common::AudioFormat;
use ambi_player::audio::wav::HEADER_LEN;
use ambi_player::audio::{AudioOutput, SoundEvent, SoundEventSender, SoundHandle};
use ambi_player::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Load(u64),
    Play(u64),
    Pause(u64),
    Gain(u64, f32),
    Release(u64),
}

#[derive(Default)]
struct LogInner {
    calls: Vec<OutputCall>,
    senders: Vec<(u64, SoundEventSender)>,
}

/// Shared view of everything the output was asked to do
#[derive(Clone, Default)]
pub struct OutputLog(Arc<Mutex<LogInner>>);

impl OutputLog {
    fn push(&self, call: OutputCall) {
        self.0.lock().unwrap().calls.push(call);
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn loaded(&self) -> Vec<u64> {
        self.ids(|c| match c {
            OutputCall::Load(id) => Some(*id),
            _ => None,
        })
    }

    pub fn played(&self) -> Vec<u64> {
        self.ids(|c| match c {
            OutputCall::Play(id) => Some(*id),
            _ => None,
        })
    }

    pub fn paused(&self) -> Vec<u64> {
        self.ids(|c| match c {
            OutputCall::Pause(id) => Some(*id),
            _ => None,
        })
    }

    pub fn released(&self) -> Vec<u64> {
        self.ids(|c| match c {
            OutputCall::Release(id) => Some(*id),
            _ => None,
        })
    }

    /// Every gain set on `unit_id`, in order
    pub fn gains(&self, unit_id: u64) -> Vec<f32> {
        self.0
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| match c {
                OutputCall::Gain(id, gain) if *id == unit_id => Some(*gain),
                _ => None,
            })
            .collect()
    }

    /// Send an event as if the sound for `event.unit_id()` produced it
    pub fn emit(&self, event: SoundEvent) -> bool {
        let inner = self.0.lock().unwrap();
        inner
            .senders
            .iter()
            .find(|(id, _)| *id == event.unit_id())
            .map(|(_, tx)| tx.send(event).is_ok())
            .unwrap_or(false)
    }

    fn ids(&self, f: impl Fn(&OutputCall) -> Option<u64>) -> Vec<u64> {
        self.0.lock().unwrap().calls.iter().filter_map(f).collect()
    }
}

pub struct RecordingOutput {
    log: OutputLog,
    failing: HashSet<u64>,
}

impl RecordingOutput {
    pub fn new() -> (Self, OutputLog) {
        let log = OutputLog::default();
        (
            Self {
                log: log.clone(),
                failing: HashSet::new(),
            },
            log,
        )
    }

    /// Loads of these unit ids fail as undecodable
    pub fn failing(mut self, unit_ids: &[u64]) -> Self {
        self.failing.extend(unit_ids.iter().copied());
        self
    }
}

impl AudioOutput for RecordingOutput {
    fn load(
        &mut self,
        unit_id: u64,
        container: &[u8],
        events: SoundEventSender,
    ) -> Result<Box<dyn SoundHandle>> {
        self.log.push(OutputCall::Load(unit_id));
        if self.failing.contains(&unit_id) {
            return Err(Error::Decode(format!("unit {} is corrupt", unit_id)));
        }
        let payload_len = container.len().saturating_sub(HEADER_LEN);
        self.log.0.lock().unwrap().senders.push((unit_id, events));
        Ok(Box::new(RecordingSound {
            unit_id,
            duration_ms: AudioFormat::PCM16_STEREO_48K.bytes_to_ms(payload_len),
            log: self.log.clone(),
            released: false,
        }))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct RecordingSound {
    unit_id: u64,
    duration_ms: u64,
    log: OutputLog,
    released: bool,
}

impl SoundHandle for RecordingSound {
    fn unit_id(&self) -> u64 {
        self.unit_id
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn play(&mut self) -> Result<()> {
        if !self.released {
            self.log.push(OutputCall::Play(self.unit_id));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if !self.released {
            self.log.push(OutputCall::Pause(self.unit_id));
        }
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        if !self.released {
            self.log.push(OutputCall::Gain(self.unit_id, gain.clamp(0.0, 1.0)));
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log.push(OutputCall::Release(self.unit_id));
        }
    }
}
