//! Error types for the chat pipeline.

use skycast_core::error::SkycastError;

/// Errors from the chat manager.
///
/// Backend and voice failures normally end up as chat messages; these
/// variants are what remains for callers to handle.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("a submission is already in progress")]
    Busy,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("state error: {0}")]
    State(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("voice error: {0}")]
    Voice(String),
}

impl From<SkycastError> for ChatError {
    fn from(err: SkycastError) -> Self {
        match err {
            SkycastError::Network(_)
            | SkycastError::Server { .. }
            | SkycastError::Serialization(_) => ChatError::Backend(err.to_string()),
            SkycastError::Auth(_)
            | SkycastError::Provider(_)
            | SkycastError::Permission(_)
            | SkycastError::EmptyTranscript
            | SkycastError::Audio(_) => ChatError::Voice(err.to_string()),
            _ => ChatError::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::Busy.to_string(), "a submission is already in progress");

        let err = ChatError::State("Idle -> Narrating".to_string());
        assert_eq!(err.to_string(), "state error: Idle -> Narrating");

        let err = ChatError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "storage error: disk full");
    }

    #[test]
    fn test_from_backend_failures() {
        let err: ChatError = SkycastError::Network("connection refused".into()).into();
        assert!(matches!(err, ChatError::Backend(_)));

        let err: ChatError = SkycastError::Server {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, ChatError::Backend(_)));
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_from_voice_failures() {
        for err in [
            SkycastError::Auth("bad key".into()),
            SkycastError::Permission("denied".into()),
            SkycastError::EmptyTranscript,
        ] {
            assert!(matches!(ChatError::from(err), ChatError::Voice(_)));
        }
    }

    #[test]
    fn test_from_storage_failures() {
        let err: ChatError = SkycastError::Storage("locked".into()).into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.to_string().contains("locked"));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: ChatError = SkycastError::from(io).into();
        assert!(matches!(err, ChatError::Storage(_)));
    }
}
