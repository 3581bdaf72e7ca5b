//! Per-submission state machine.
//!
//! Tracks where the current submission is in its pipeline:
//! - Idle -> AwaitingBackend -> Narrating -> Idle (typed)
//! - Idle -> AwaitingTranscription -> AwaitingBackend -> ... (spoken)
//!
//! Any waiting state may fall back to Idle on failure.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ChatError;

/// Where the in-flight submission currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing in flight. Ready for the next submission.
    Idle,
    /// Waiting for the speech bridge to transcribe a recording.
    AwaitingTranscription,
    /// Waiting for the weather backend to answer.
    AwaitingBackend,
    /// Waiting for the reply to be narrated.
    Narrating,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::AwaitingTranscription => write!(f, "AwaitingTranscription"),
            SessionState::AwaitingBackend => write!(f, "AwaitingBackend"),
            SessionState::Narrating => write!(f, "Narrating"),
        }
    }
}

impl SessionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::AwaitingBackend)
                | (SessionState::Idle, SessionState::AwaitingTranscription)
                | (SessionState::AwaitingTranscription, SessionState::AwaitingBackend)
                | (SessionState::AwaitingBackend, SessionState::Narrating)
                | (SessionState::Narrating, SessionState::Idle)
                // Failure paths
                | (SessionState::AwaitingTranscription, SessionState::Idle)
                | (SessionState::AwaitingBackend, SessionState::Idle)
        )
    }
}

/// Thread-safe holder for [`SessionState`] that validates every transition.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: Arc<Mutex<SessionState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempt to move to `target`, rejecting transitions the pipeline
    /// does not allow.
    pub fn transition(&self, target: SessionState) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.can_transition_to(&target) {
            tracing::debug!("Session state: {} -> {}", *state, target);
            *state = target;
            Ok(())
        } else {
            Err(ChatError::State(format!(
                "Invalid state transition: {} -> {}",
                *state, target
            )))
        }
    }

    /// Force the state back to Idle. Returns the state it left.
    pub fn reset(&self) -> SessionState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *state;
        if previous != SessionState::Idle {
            tracing::debug!("Session state: {} -> Idle (reset)", previous);
        }
        *state = SessionState::Idle;
        previous
    }
}

// =============================================================================
// Tests
// =============================================================================
