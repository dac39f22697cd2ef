//! Audio output capability
//!
//! The scheduler talks to the platform only through these two traits: an
//! [`AudioOutput`] loads wrapped units into [`SoundHandle`]s, and every handle
//! reports progress back as [`SoundEvent`]s on a channel owned by the caller.

use crate::error::Result;
use tokio::sync::mpsc;

/// Progress reported by a loaded sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEvent {
    /// Periodic playback position while the sound is playing
    Position { unit_id: u64, position_ms: u64 },
    /// The sound reached its natural end
    Finished { unit_id: u64 },
}

impl SoundEvent {
    pub fn unit_id(&self) -> u64 {
        match self {
            SoundEvent::Position { unit_id, .. } | SoundEvent::Finished { unit_id } => *unit_id,
        }
    }
}

/// Sending half given to every loaded sound
pub type SoundEventSender = mpsc::UnboundedSender<SoundEvent>;

/// Receiving half drained by the scheduler's owner
pub type SoundEventReceiver = mpsc::UnboundedReceiver<SoundEvent>;

/// One loaded, independently controllable sound
///
/// A freshly loaded sound is stopped at gain 0.0. After [`SoundHandle::release`]
/// the sound emits no further events and every other call is a no-op.
pub trait SoundHandle: Send {
    fn unit_id(&self) -> u64;

    /// Total playback length in milliseconds
    fn duration_ms(&self) -> u64;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Set the linear gain, clamped to [0.0, 1.0]
    fn set_gain(&mut self, gain: f32);

    fn release(&mut self);
}

/// Platform audio capability
pub trait AudioOutput: Send {
    /// Decode `container` and prepare it for playback
    ///
    /// # Errors
    /// Decode or device failures. The caller counts these and moves on.
    fn load(
        &mut self,
        unit_id: u64,
        container: &[u8],
        events: SoundEventSender,
    ) -> Result<Box<dyn SoundHandle>>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Available output backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Clock-driven output that renders nothing
    #[default]
    Virtual,
    /// Default system audio device
    Device,
}

impl std::str::FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "virtual" | "null" => Ok(OutputKind::Virtual),
            "device" | "default" => Ok(OutputKind::Device),
            other => Err(format!("Unknown output '{}' (expected virtual or device)", other)),
        }
    }
}

/// Open the requested backend
///
/// `position_interval_ms` is how often loaded sounds report their position.
pub fn open_output(kind: OutputKind, position_interval_ms: u64) -> Result<Box<dyn AudioOutput>> {
    match kind {
        OutputKind::Virtual => Ok(Box::new(super::VirtualOutput::new(position_interval_ms))),
        #[cfg(feature = "device")]
        OutputKind::Device => Ok(Box::new(super::DeviceOutput::open(position_interval_ms)?)),
        #[cfg(not(feature = "device"))]
        OutputKind::Device => Err(crate::error::Error::AudioOutput(
            "Built without the `device` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_kind_parsing() {
        assert_eq!("virtual".parse::<OutputKind>().unwrap(), OutputKind::Virtual);
        assert_eq!("Device".parse::<OutputKind>().unwrap(), OutputKind::Device);
        assert!("speakers".parse::<OutputKind>().is_err());
    }

    #[test]
    fn test_event_unit_id() {
        assert_eq!(SoundEvent::Finished { unit_id: 7 }.unit_id(), 7);
        assert_eq!(
            SoundEvent::Position {
                unit_id: 3,
                position_ms: 10
            }
            .unit_id(),
            3
        );
    }
}
