//! Narration playback.
//!
//! [`NarrationPlayer`] plays one WAV file at a time through a [`Speaker`] and
//! can stop it from another thread. With the `capture` feature the
//! [`CpalSpeaker`] writes to the default output device; without it every
//! play fails with "audio playback unavailable".

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use skycast_core::error::SkycastError;

use crate::wav::{decode_wav, WavClip};

/// Audio output device.
pub trait Speaker: Send + Sync {
    /// Play `clip`, blocking until it ends or `cancel` becomes true.
    fn play(&self, clip: &WavClip, cancel: &AtomicBool) -> Result<(), SkycastError>;
}

/// Plays narrated replies, one at a time.
pub struct NarrationPlayer {
    speaker: Arc<dyn Speaker>,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl NarrationPlayer {
    pub fn new(speaker: Arc<dyn Speaker>) -> Self {
        Self {
            speaker,
            current: Mutex::new(None),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Stop the clip that is playing. Returns whether one was.
    pub fn stop(&self) -> bool {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match current {
            Some(cancel) => {
                cancel.store(true, Ordering::SeqCst);
                info!("Playback stopped");
                true
            }
            None => false,
        }
    }

    /// Play the WAV file at `path`, blocking until it finishes or is stopped.
    ///
    /// Anything already playing is stopped first. Files that are not 16-bit
    /// PCM WAV fail with [`SkycastError::Audio`] before the device is touched.
    pub fn play_file(&self, path: &Path) -> Result<(), SkycastError> {
        let bytes = std::fs::read(path)?;
        let clip = decode_wav(&bytes).map_err(|e| match e {
            SkycastError::Audio(reason) => SkycastError::Audio(format!(
                "cannot play {} ({reason}), open it with an external player",
                path.display()
            )),
            other => other,
        })?;

        self.stop();
        let cancel = Arc::new(AtomicBool::new(false));
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&cancel));

        debug!(
            path = %path.display(),
            secs = clip.duration_secs(),
            "Playing narration"
        );
        let result = self.speaker.play(&clip, &cancel);

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, &cancel)) {
            *current = None;
        }
        result
    }
}

impl std::fmt::Debug for NarrationPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationPlayer")
            .field("playing", &self.is_playing())
            .finish()
    }
}

/// Default-output-device speaker.
#[derive(Debug, Clone, Default)]
pub struct CpalSpeaker;

impl CpalSpeaker {
    pub fn new() -> Self {
        Self
    }
}

// =============================================================================
// cpal implementation
// =============================================================================

#[cfg(feature = "capture")]
impl Speaker for CpalSpeaker {
    fn play(&self, clip: &WavClip, cancel: &AtomicBool) -> Result<(), SkycastError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use std::time::Duration;
        use tracing::error;

        use crate::capture::to_mono;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SkycastError::Audio("no audio output device".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| SkycastError::Audio(format!("no output config: {}", e)))?;
        let stream_config: cpal::StreamConfig = supported.config();
        let device_rate = stream_config.sample_rate.0;
        let device_channels = (stream_config.channels as usize).max(1);

        let mono = to_mono(&clip.samples, clip.channels, clip.sample_rate, device_rate);
        let total = mono.len();
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let mut cursor = 0usize;

        // The stream is built and dropped on this thread, so it never has to be Send.
        let stream = device
            .build_output_stream(
                &stream_config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in out.chunks_mut(device_channels) {
                        let value = mono.get(cursor).copied().unwrap_or(0.0);
                        frame.fill(value);
                        cursor += 1;
                    }
                    if cursor >= total {
                        done.store(true, Ordering::SeqCst);
                    }
                },
                move |err| {
                    error!("Speaker stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SkycastError::Audio(format!("failed to open speaker: {}", e)))?;
        stream
            .play()
            .map_err(|e| SkycastError::Audio(format!("failed to start speaker: {}", e)))?;
        info!(device_rate, device_channels, "Speaker opened");

        while !finished.load(Ordering::SeqCst) && !cancel.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(20));
        }
        drop(stream);
        Ok(())
    }
}

// =============================================================================
// Stub without the `capture` feature
// =============================================================================

#[cfg(not(feature = "capture"))]
impl Speaker for CpalSpeaker {
    fn play(&self, _clip: &WavClip, _cancel: &AtomicBool) -> Result<(), SkycastError> {
        tracing::warn!("Built without the `capture` feature");
        Err(SkycastError::Audio("audio playback unavailable".into()))
    }
}
