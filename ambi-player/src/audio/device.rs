//! Audio output using cpal
//!
//! One output stream on the default device mixes every loaded voice. The cpal
//! stream is owned by a dedicated thread because streams are not `Send` on all
//! hosts; voices are shared with the callback through a mutex.
//!
//! Each loaded sound also gets a small monitor task that reads the voice's
//! frame position and reports it as [`SoundEvent`]s.

use super::decode::decode_wav;
use super::output::{AudioOutput, SoundEvent, SoundEventSender, SoundHandle};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Preferred device rate, matching the stream format
const TARGET_SAMPLE_RATE: u32 = 48_000;

struct Voice {
    unit_id: u64,
    samples: Arc<Vec<f32>>,
    channels: usize,
    /// Source frames advanced per device frame
    step: f64,
    position: f64,
    playing: bool,
    gain: f32,
    released: bool,
}

impl Voice {
    fn total_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    fn finished(&self) -> bool {
        self.position as usize >= self.total_frames()
    }

    /// Add this voice's next frame into `out` (interleaved, device channels)
    fn mix_into(&mut self, out: &mut [f32]) {
        if !self.playing || self.released || self.finished() {
            return;
        }
        let frame = self.position as usize;
        let base = frame * self.channels;
        for (ch, slot) in out.iter_mut().enumerate() {
            let src_ch = ch.min(self.channels - 1);
            *slot += self.samples[base + src_ch] * self.gain;
        }
        self.position += self.step;
    }
}

type Voices = Arc<Mutex<Vec<Voice>>>;

/// Output backend on the system's default audio device
pub struct DeviceOutput {
    voices: Voices,
    device_rate: u32,
    position_interval: Duration,
    device_name: String,
    shutdown: Option<std_mpsc::Sender<()>>,
    error_flag: Arc<AtomicBool>,
}

impl DeviceOutput {
    /// Open the default device and start the mixing stream
    pub fn open(position_interval_ms: u64) -> Result<Self> {
        let voices: Voices = Arc::new(Mutex::new(Vec::new()));
        let error_flag = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(u32, String)>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let thread_voices = Arc::clone(&voices);
        let thread_error = Arc::clone(&error_flag);
        std::thread::Builder::new()
            .name("ambi-audio-out".to_string())
            .spawn(move || {
                let stream = match build_stream(thread_voices, thread_error) {
                    Ok((stream, rate, name)) => {
                        let _ = ready_tx.send(Ok((rate, name)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the output is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("Audio stream thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let (device_rate, device_name) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during setup".to_string()))??;

        info!("Audio stream started on '{}' at {} Hz", device_name, device_rate);
        Ok(Self {
            voices,
            device_rate,
            position_interval: Duration::from_millis(position_interval_ms.max(1)),
            device_name,
            shutdown: Some(shutdown_tx),
            error_flag,
        })
    }

    /// Whether the stream has reported an error since opening
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn build_stream(
    voices: Voices,
    error_flag: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32, String)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (config, sample_format) = best_config(&device)?;
    let rate = config.sample_rate.0;
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        rate, config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_typed::<f32>(&device, &config, voices, error_flag)?,
        SampleFormat::I16 => build_typed::<i16>(&device, &config, voices, error_flag)?,
        SampleFormat::U16 => build_typed::<u16>(&device, &config, voices, error_flag)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    Ok((stream, rate, name))
}

/// Prefer 48 kHz stereo, otherwise take the device default
fn best_config(device: &cpal::Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported.find(|c| {
        c.channels() == 2
            && c.min_sample_rate().0 <= TARGET_SAMPLE_RATE
            && c.max_sample_rate().0 >= TARGET_SAMPLE_RATE
            && matches!(
                c.sample_format(),
                SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
            )
    });

    if let Some(c) = preferred {
        let format = c.sample_format();
        return Ok((
            c.with_sample_rate(cpal::SampleRate(TARGET_SAMPLE_RATE)).config(),
            format,
        ));
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    warn!(
        "Device has no 48 kHz stereo config, using {} Hz",
        fallback.sample_rate().0
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    voices: Voices,
    error_flag: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut frame = vec![0.0f32; channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut voices = match voices.lock() {
                    Ok(v) => v,
                    Err(_) => {
                        data.iter_mut().for_each(|s| *s = T::from_sample(0.0f32));
                        return;
                    }
                };
                for out in data.chunks_mut(channels) {
                    frame.iter_mut().for_each(|s| *s = 0.0);
                    for voice in voices.iter_mut() {
                        voice.mix_into(&mut frame);
                    }
                    for (slot, value) in out.iter_mut().zip(frame.iter()) {
                        *slot = T::from_sample(value.clamp(-1.0, 1.0));
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

impl AudioOutput for DeviceOutput {
    fn load(
        &mut self,
        unit_id: u64,
        container: &[u8],
        events: SoundEventSender,
    ) -> Result<Box<dyn SoundHandle>> {
        let decoded = decode_wav(container)?;
        let duration_ms = decoded.duration_ms();
        let source_rate = decoded.sample_rate;

        let voice = Voice {
            unit_id,
            channels: decoded.channels.max(1) as usize,
            samples: Arc::new(decoded.samples),
            step: source_rate as f64 / self.device_rate as f64,
            position: 0.0,
            playing: false,
            gain: 0.0,
            released: false,
        };

        self.voices
            .lock()
            .map_err(|_| Error::AudioOutput("Voice table poisoned".to_string()))?
            .push(voice);

        tokio::spawn(monitor_voice(
            unit_id,
            source_rate,
            Arc::clone(&self.voices),
            self.position_interval,
            events,
        ));

        debug!(unit_id, duration_ms, "Loaded device sound");
        Ok(Box::new(DeviceSound {
            unit_id,
            duration_ms,
            voices: Arc::clone(&self.voices),
        }))
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

async fn monitor_voice(
    unit_id: u64,
    source_rate: u32,
    voices: Voices,
    period: Duration,
    events: SoundEventSender,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let event = {
            let Ok(mut table) = voices.lock() else { return };
            let Some(index) = table.iter().position(|v| v.unit_id == unit_id) else {
                return;
            };
            let voice = &mut table[index];
            if voice.released {
                table.swap_remove(index);
                return;
            }
            if !voice.playing {
                continue;
            }
            if voice.finished() {
                voice.playing = false;
                SoundEvent::Finished { unit_id }
            } else {
                SoundEvent::Position {
                    unit_id,
                    position_ms: voice.position as u64 * 1000 / source_rate.max(1) as u64,
                }
            }
        };

        let finished = matches!(event, SoundEvent::Finished { .. });
        if events.send(event).is_err() || finished {
            return;
        }
    }
}

struct DeviceSound {
    unit_id: u64,
    duration_ms: u64,
    voices: Voices,
}

impl DeviceSound {
    fn with_voice(&self, f: impl FnOnce(&mut Voice)) {
        if let Ok(mut table) = self.voices.lock() {
            if let Some(voice) = table
                .iter_mut()
                .find(|v| v.unit_id == self.unit_id && !v.released)
            {
                f(voice);
            }
        }
    }
}

impl SoundHandle for DeviceSound {
    fn unit_id(&self) -> u64 {
        self.unit_id
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn play(&mut self) -> Result<()> {
        self.with_voice(|v| v.playing = true);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.with_voice(|v| v.playing = false);
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        self.with_voice(|v| v.gain = gain.clamp(0.0, 1.0));
    }

    fn release(&mut self) {
        if let Ok(mut table) = self.voices.lock() {
            table.retain(|v| v.unit_id != self.unit_id);
        }
    }
}

impl Drop for DeviceSound {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(samples: Vec<f32>, channels: usize) -> Voice {
        Voice {
            unit_id: 1,
            samples: Arc::new(samples),
            channels,
            step: 1.0,
            position: 0.0,
            playing: true,
            gain: 0.5,
            released: false,
        }
    }

    #[test]
    fn test_voice_mixes_with_gain() {
        let mut v = voice(vec![0.4, -0.4, 0.8, -0.8], 2);
        let mut frame = [0.0f32; 2];
        v.mix_into(&mut frame);
        assert!((frame[0] - 0.2).abs() < 1e-6);
        assert!((frame[1] + 0.2).abs() < 1e-6);
        assert_eq!(v.position, 1.0);
    }

    #[test]
    fn test_mono_voice_fills_both_channels() {
        let mut v = voice(vec![1.0, 0.5], 1);
        v.gain = 1.0;
        let mut frame = [0.0f32; 2];
        v.mix_into(&mut frame);
        assert_eq!(frame, [1.0, 1.0]);
    }

    #[test]
    fn test_stopped_voice_is_silent() {
        let mut v = voice(vec![1.0, 1.0], 2);
        v.playing = false;
        let mut frame = [0.0f32; 2];
        v.mix_into(&mut frame);
        assert_eq!(frame, [0.0, 0.0]);
        assert_eq!(v.position, 0.0);
    }

    #[test]
    fn test_voice_finishes_at_end() {
        let mut v = voice(vec![0.1, 0.1, 0.2, 0.2], 2);
        let mut frame = [0.0f32; 2];
        v.mix_into(&mut frame);
        v.mix_into(&mut frame);
        assert!(v.finished());
    }
}
