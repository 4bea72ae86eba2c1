//! Audio playback to speakers
//!
//! Scheduled units are mixed onto a single output stream whose frame counter
//! is the output timeline.

use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::codec::AudioBuffer;
use super::scheduler::PlaybackUnit;
use crate::{Error, Result};

/// Sample rate for playback (matches the realtime service's output audio)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Invoked once when a unit finishes playing naturally
pub type PlaybackEnd = Box<dyn FnOnce() + Send>;

/// Output device driven by the playback scheduler
pub trait AudioOutput: Send {
    /// Current position of the output timeline, in seconds
    fn now(&self) -> f64;

    /// Start `buffer` at `unit.start_at` and call `on_end` when it finishes
    ///
    /// # Errors
    ///
    /// Returns error if the unit cannot be queued on the device
    fn play(&mut self, unit: &PlaybackUnit, buffer: AudioBuffer, on_end: PlaybackEnd)
    -> Result<()>;

    /// Stop every queued or playing unit without firing their callbacks
    fn stop_all(&mut self);
}

struct MixUnit {
    start_frame: u64,
    buffer: AudioBuffer,
    on_end: Option<PlaybackEnd>,
}

impl MixUnit {
    /// Output frames this unit spans at the device rate
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn span(&self, device_rate: u32) -> u64 {
        (self.buffer.duration() * f64::from(device_rate)).ceil() as u64
    }

    /// Sample for `channel` at output frame `frame`, nearest-neighbour mapped
    /// from the buffer's own rate
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn sample(&self, frame: u64, channel: usize, device_rate: u32) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let offset = frame - self.start_frame;
        let src = if self.buffer.sample_rate() == device_rate {
            offset as usize
        } else {
            (offset as f64 * f64::from(self.buffer.sample_rate()) / f64::from(device_rate))
                as usize
        };
        let source_channel = channel.min(self.buffer.channel_count().saturating_sub(1));
        self.buffer
            .channel(source_channel)
            .get(src)
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Default)]
struct Mixer {
    frames_rendered: u64,
    units: Vec<MixUnit>,
}

impl Mixer {
    fn render(&mut self, data: &mut [f32], channels: usize, rate: u32) {
        let base = self.frames_rendered;
        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let t = base + i as u64;
            for (c, out) in frame.iter_mut().enumerate() {
                let mixed: f32 = self.units.iter().map(|u| u.sample(t, c, rate)).sum();
                *out = mixed.clamp(-1.0, 1.0);
            }
        }
        self.frames_rendered += (data.len() / channels.max(1)) as u64;

        let now = self.frames_rendered;
        let mut finished = Vec::new();
        self.units.retain_mut(|u| {
            if u.start_frame + u.span(rate) <= now {
                finished.extend(u.on_end.take());
                false
            } else {
                true
            }
        });
        for on_end in finished {
            on_end();
        }
    }
}

/// Plays scheduled units on the default output device
pub struct CpalOutput {
    rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// The stream lives on its own thread because `cpal::Stream` is not `Send`.
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(sample_rate: u32) -> Result<Self> {
        let config = output_config(sample_rate)?;
        let rate = config.sample_rate.0;
        let channels = usize::from(config.channels);
        let mixer = Arc::new(Mutex::new(Mixer::default()));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let stream_mixer = Arc::clone(&mixer);

        let thread = std::thread::Builder::new()
            .name("beacon-live-output".to_string())
            .spawn(move || {
                let stream = match build_output_stream(&config, channels, stream_mixer) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until stopped; dropping the stream closes the device
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio output stopped");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("output thread exited during startup".to_string()))??;

        tracing::debug!(sample_rate = rate, channels, "audio playback initialized");

        Ok(Self {
            rate,
            mixer,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Device sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.rate
    }
}

impl AudioOutput for CpalOutput {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> f64 {
        self.mixer
            .lock()
            .map(|m| m.frames_rendered as f64 / f64::from(self.rate))
            .unwrap_or_default()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn play(
        &mut self,
        unit: &PlaybackUnit,
        buffer: AudioBuffer,
        on_end: PlaybackEnd,
    ) -> Result<()> {
        let start_frame = (unit.start_at * f64::from(self.rate)).round() as u64;
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| Error::Audio("output mixer poisoned".to_string()))?;
        mixer.units.push(MixUnit {
            start_frame,
            buffer,
            on_end: Some(on_end),
        });
        Ok(())
    }

    fn stop_all(&mut self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.units.clear();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Find an output config at `rate`, mono preferred, stereo fallback
fn output_config(rate: u32) -> Result<StreamConfig> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supports = |channels: u16| {
        move |c: &cpal::SupportedStreamConfigRange| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(rate)
                && c.max_sample_rate() >= SampleRate(rate)
        }
    };

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(supports(1))
        .or_else(|| device.supported_output_configs().ok()?.find(supports(2)))
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    Ok(supported_config
        .with_sample_rate(SampleRate(rate))
        .config())
}

fn build_output_stream(
    config: &StreamConfig,
    channels: usize,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;
    let rate = config.sample_rate.0;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if let Ok(mut mixer) = mixer.lock() {
                    mixer.render(data, channels, rate);
                } else {
                    data.fill(0.0);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn mixer_plays_unit_at_start_frame() {
        let mut mixer = Mixer::default();
        mixer.units.push(MixUnit {
            start_frame: 2,
            buffer: AudioBuffer::mono(vec![0.5, 0.5], 4),
            on_end: None,
        });

        let mut out = vec![1.0; 6];
        mixer.render(&mut out, 1, 4);
        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.0, 0.0]);
        assert!(mixer.units.is_empty());
    }

    #[test]
    fn mixer_fires_end_once() {
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ended);
        let mut mixer = Mixer::default();
        mixer.units.push(MixUnit {
            start_frame: 0,
            buffer: AudioBuffer::mono(vec![0.1; 4], 4),
            on_end: Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        });

        let mut out = vec![0.0; 2];
        mixer.render(&mut out, 1, 4);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
        mixer.render(&mut out, 1, 4);
        mixer.render(&mut out, 1, 4);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mixer_duplicates_mono_to_stereo() {
        let mut mixer = Mixer::default();
        mixer.units.push(MixUnit {
            start_frame: 0,
            buffer: AudioBuffer::mono(vec![0.25], 4),
            on_end: None,
        });
        let mut out = vec![0.0; 2];
        mixer.render(&mut out, 2, 4);
        assert_eq!(out, vec![0.25, 0.25]);
    }
}
