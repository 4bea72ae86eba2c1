//! Audio capture from microphone
//!
//! Frames are delivered as mono f32 at the device's native rate; the
//! pipeline resamples them, so no particular rate is assumed here.

use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig};
use tokio::sync::oneshot;

use super::resample::to_mono;
use crate::{Error, Result};

/// Receives captured frames: `(mono samples, sample rate)`
pub type FrameSink = Arc<dyn Fn(Vec<f32>, u32) + Send + Sync>;

/// A live capture subscription
pub trait CaptureHandle: Send {
    /// Disconnect the capture graph. Safe to call more than once.
    fn stop(&mut self);
}

/// Source of microphone audio
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Request access and start delivering frames to `sink`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Permission`] if the device is denied or unavailable
    async fn open(&self, sink: FrameSink) -> Result<Box<dyn CaptureHandle>>;
}

/// Microphone backed by a cpal input device
#[derive(Debug, Clone, Default)]
pub struct CpalMicrophone {
    device_name: Option<String>,
}

impl CpalMicrophone {
    /// Use the named input device, or the system default when `None`
    #[must_use]
    pub const fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self, sink: FrameSink) -> Result<Box<dyn CaptureHandle>> {
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("beacon-live-capture".to_string())
            .spawn(move || {
                let stream = match start_stream(device_name.as_deref(), sink) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        ready_rx
            .await
            .map_err(|_| Error::Audio("capture thread exited during startup".to_string()))??;

        Ok(Box::new(CpalCapture {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

/// Running cpal capture stream, parked on its own thread
struct CpalCapture {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle for CpalCapture {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// List available input device names
#[must_use]
pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Find the input device and its native config
fn resolve_device(device_name: Option<&str>) -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()
            .map_err(|e| Error::Permission(format!("cannot enumerate input devices: {e}")))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Permission(format!("input device not found: {name}")))?
    } else {
        host.default_input_device()
            .ok_or_else(|| Error::Permission("no input device available".to_string()))?
    };

    let default_config = device
        .default_input_config()
        .map_err(|e| Error::Permission(format!("microphone unavailable: {e}")))?;

    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = config.sample_rate.0,
        channels = config.channels,
        "audio capture initialized"
    );

    Ok((device, config))
}

fn start_stream(device_name: Option<&str>, sink: FrameSink) -> Result<cpal::Stream> {
    let (device, config) = resolve_device(device_name)?;
    let rate = config.sample_rate.0;
    let channels = config.channels;

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                sink(to_mono(data, channels), rate);
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Permission(format!("microphone access failed: {e}")))?;

    stream
        .play()
        .map_err(|e| Error::Permission(format!("microphone could not start: {e}")))?;

    tracing::debug!("audio capture started");
    Ok(stream)
}

/// Root-mean-square energy of a run of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
