//! Skycast Audio crate - microphone recording into a single uploadable blob.
//!
//! The [`RecordingController`] drives one recording at a time through
//! `Idle -> Recording -> Processing -> Idle`. Audio comes from a
//! [`Microphone`], which writes mono f32 samples into a shared
//! [`AudioBuffer`] until its [`CaptureStream`] is released. Narrated replies
//! are played back by the [`NarrationPlayer`]. Real capture and playback via
//! cpal are behind the `capture` feature.

pub mod buffer;
pub mod capture;
pub mod controller;
pub mod playback;
pub mod wav;

use std::fmt;

use async_trait::async_trait;

use skycast_core::error::SkycastError;

pub use buffer::AudioBuffer;
pub use capture::CpalMicrophone;
pub use controller::{format_elapsed, RecordingController};
pub use playback::{CpalSpeaker, NarrationPlayer, Speaker};
pub use wav::{decode_wav, encode_wav, pcm16_to_wav, WavClip};

// =============================================================================
// Enums
// =============================================================================

/// Current state of the recording controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingState {
    /// Nothing is being recorded.
    Idle,
    /// The microphone is open and samples are being buffered.
    Recording,
    /// The finished blob is being handed to the completion handler.
    Processing,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "Idle"),
            RecordingState::Recording => write!(f, "Recording"),
            RecordingState::Processing => write!(f, "Processing"),
        }
    }
}

impl RecordingState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &RecordingState) -> bool {
        matches!(
            (self, target),
            (RecordingState::Idle, RecordingState::Recording)
                | (RecordingState::Recording, RecordingState::Processing)
                | (RecordingState::Processing, RecordingState::Idle)
        )
    }
}

// =============================================================================
// Traits
// =============================================================================

/// A live capture. Dropping or releasing it stops the device.
pub trait CaptureStream: Send {
    /// Stop capturing and give the device back. Must be idempotent.
    fn release(&mut self);
}

/// Source of microphone audio.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Request access to the device and start pushing samples into `buffer`.
    ///
    /// Fails with [`SkycastError::Permission`] when access is denied or no
    /// input device exists.
    async fn open(&self, buffer: AudioBuffer) -> Result<Box<dyn CaptureStream>, SkycastError>;

    /// Sample rate of the samples pushed into the buffer, in Hz.
    fn sample_rate(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_cycle_transitions() {
        assert!(RecordingState::Idle.can_transition_to(&RecordingState::Recording));
        assert!(RecordingState::Recording.can_transition_to(&RecordingState::Processing));
        assert!(RecordingState::Processing.can_transition_to(&RecordingState::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!RecordingState::Idle.can_transition_to(&RecordingState::Processing));
        assert!(!RecordingState::Recording.can_transition_to(&RecordingState::Recording));
        assert!(!RecordingState::Processing.can_transition_to(&RecordingState::Recording));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RecordingState::Idle.to_string(), "Idle");
        assert_eq!(RecordingState::Recording.to_string(), "Recording");
        assert_eq!(RecordingState::Processing.to_string(), "Processing");
    }
}
