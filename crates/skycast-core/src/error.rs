use thiserror::Error;

/// Top-level error type for Skycast.
///
/// Network and server variants come from the weather backend, auth and
/// provider variants from the speech service, permission from the microphone.
/// Every subsystem crate returns this type so `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SkycastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Voice service authentication failed: {0}")]
    Auth(String),

    #[error("Voice provider error: {0}")]
    Provider(String),

    #[error("Microphone permission denied: {0}")]
    Permission(String),

    #[error("Transcription produced no text")]
    EmptyTranscript,

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for SkycastError {
    fn from(err: toml::de::Error) -> Self {
        SkycastError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SkycastError {
    fn from(err: toml::ser::Error) -> Self {
        SkycastError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SkycastError {
    fn from(err: serde_json::Error) -> Self {
        SkycastError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Skycast operations.
pub type Result<T> = std::result::Result<T, SkycastError>;
