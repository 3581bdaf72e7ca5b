//! Skycast Voice crate - text-to-speech and speech-to-text bridge.
//!
//! Wraps a third-party voice API behind the [`SpeechBridge`] trait. The two
//! operations are independent and keep no state between calls.

pub mod encoding;
pub mod elevenlabs;

use async_trait::async_trait;

use skycast_core::error::SkycastError;
use skycast_core::types::{AudioBlob, AudioHandle};

pub use elevenlabs::ElevenLabsBridge;
pub use encoding::{EncodingCandidate, EncodingStrategy};

/// Converts between text and speech.
#[async_trait]
pub trait SpeechBridge: Send + Sync {
    /// Narrate `text` and return a handle to the playable audio.
    async fn text_to_speech(&self, text: &str) -> Result<AudioHandle, SkycastError>;

    /// Transcribe `blob`. The transcript may be empty.
    async fn speech_to_text(&self, blob: &AudioBlob) -> Result<String, SkycastError>;
}
