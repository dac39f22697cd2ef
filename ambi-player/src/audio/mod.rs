//! Audio subsystem
//!
//! PCM container wrapping, seam blending, decoding, and the output backends.

pub mod crossfade;
pub mod decode;
#[cfg(feature = "device")]
pub mod device;
pub mod output;
pub mod virtual_output;
pub mod wav;

pub use decode::{decode_wav, DecodedAudio};
#[cfg(feature = "device")]
pub use device::DeviceOutput;
pub use output::{
    open_output, AudioOutput, OutputKind, SoundEvent, SoundEventReceiver, SoundEventSender,
    SoundHandle,
};
pub use virtual_output::VirtualOutput;
