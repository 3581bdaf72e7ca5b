//! Microphone capture via cpal.
//!
//! With the `capture` feature, opens the default input device and pushes
//! mono samples, resampled to the configured rate, into the shared buffer.
//! Without it, every open fails with `SkycastError::Permission`.

use async_trait::async_trait;
#[cfg(not(feature = "capture"))]
use tracing::warn;

use skycast_core::config::RecordingConfig;
use skycast_core::error::SkycastError;

use crate::{AudioBuffer, CaptureStream, Microphone};

/// Default-input-device microphone.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    config: RecordingConfig,
}

impl CpalMicrophone {
    pub fn new(config: RecordingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }
}

/// Downmix interleaved frames to mono and resample by linear interpolation.
pub fn to_mono(data: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    let mono: Vec<f32> = if channels > 1 {
        let ch = channels as usize;
        data.chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    } else {
        data.to_vec()
    };

    if from_rate == to_rate || mono.is_empty() {
        return mono;
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (mono.len() as f64 / ratio).ceil() as usize;
    let last = mono.len() - 1;
    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx0 = (src.floor() as usize).min(last);
            let idx1 = (idx0 + 1).min(last);
            let frac = (src - idx0 as f64) as f32;
            mono[idx0] * (1.0 - frac) + mono[idx1] * frac
        })
        .collect()
}

// =============================================================================
// cpal implementation
// =============================================================================

/// Makes `cpal::Stream` storable behind `Box<dyn CaptureStream>`.
///
/// On some backends `cpal::Stream` carries a `*mut ()` marker that removes
/// the auto `Send` impl.
#[cfg(feature = "capture")]
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: the handle is only ever moved between threads and dropped to stop
// capture. Audio callbacks run on cpal's own thread and share nothing with
// the handle except the thread-safe AudioBuffer.
#[cfg(feature = "capture")]
unsafe impl Send for SendStream {}

#[cfg(feature = "capture")]
struct CpalStream {
    stream: Option<SendStream>,
}

#[cfg(feature = "capture")]
impl CaptureStream for CpalStream {
    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("Microphone released");
        }
    }
}

#[cfg(feature = "capture")]
impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(feature = "capture")]
#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self, buffer: AudioBuffer) -> Result<Box<dyn CaptureStream>, SkycastError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use tracing::{debug, error, info};

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SkycastError::Permission("no microphone available".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        debug!(device = %device_name, "Selected input device");

        let stream_config = match device.default_input_config() {
            Ok(supported) => cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            },
            Err(e) => {
                debug!(error = %e, "No default input config, requesting the recording format");
                cpal::StreamConfig {
                    channels: self.config.channels,
                    sample_rate: cpal::SampleRate(self.config.sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                }
            }
        };

        let device_rate = stream_config.sample_rate.0;
        let device_channels = stream_config.channels;
        let target_rate = self.config.sample_rate;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer.push(&to_mono(data, device_channels, device_rate, target_rate));
                },
                move |err| {
                    error!("Microphone stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SkycastError::Permission(format!("microphone access failed: {}", e)))?;

        stream
            .play()
            .map_err(|e| SkycastError::Audio(format!("failed to start microphone: {}", e)))?;

        info!(
            device = %device_name,
            device_rate,
            device_channels,
            target_rate,
            "Microphone opened"
        );
        Ok(Box::new(CpalStream {
            stream: Some(SendStream(stream)),
        }))
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

// =============================================================================
// Stub without the `capture` feature
// =============================================================================

#[cfg(not(feature = "capture"))]
#[async_trait]
impl Microphone for CpalMicrophone {
    async fn open(&self, _buffer: AudioBuffer) -> Result<Box<dyn CaptureStream>, SkycastError> {
        warn!("Built without the `capture` feature");
        Err(SkycastError::Permission(
            "microphone capture unavailable".into(),
        ))
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
