//! Test helper modules for ambi-player integration tests
//!
//! Provides reusable test doubles:
//! - RecordingOutput: AudioOutput that logs every call instead of rendering
//! - FakeControl: scripted ControlPlane with a call log
//! - FakeConnector: ChannelConnector whose server side is driven by the test

#![allow(dead_code)]

pub mod fake_channel;
pub mod fake_control;
pub mod recording_output;

pub use fake_channel::{FakeConnector, FakeServer};
pub use fake_control::FakeControl;
pub use recording_output::{OutputCall, OutputLog, RecordingOutput};

use ambi_common::{AudioFormat, BufferMetrics, SessionStatus};
use ambi_player::audio::wav;
use ambi_player::playback::PlayableUnit;
use ambi_player::Player;
use std::time::Duration;

/// Upper bound for any single wait in a test
pub const WAIT: Duration = Duration::from_secs(5);

/// Bytes of silence lasting `ms` in the stream format
pub fn silence_ms(ms: u64) -> Vec<u8> {
    vec![0u8; AudioFormat::PCM16_STEREO_48K.ms_to_bytes(ms)]
}

/// Wrapped unit of `ms` silence
pub fn unit(unit_id: u64, ms: u64) -> PlayableUnit {
    let payload = silence_ms(ms);
    PlayableUnit::new(
        unit_id,
        wav::wrap(&payload),
        payload.len(),
        &AudioFormat::PCM16_STEREO_48K,
    )
}

/// Wait until published metrics satisfy `pred`
pub async fn wait_metrics(player: &Player, pred: impl FnMut(&BufferMetrics) -> bool) -> BufferMetrics {
    let mut rx = player.watch_metrics();
    let metrics = tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("metrics condition not reached in time")
        .expect("player dropped");
    metrics.clone()
}

/// Wait until the published status equals `status`
pub async fn wait_status(player: &Player, status: SessionStatus) {
    let mut rx = player.watch_snapshot();
    tokio::time::timeout(WAIT, rx.wait_for(|s| s.status == status))
        .await
        .expect("status not reached in time")
        .expect("player dropped");
}
