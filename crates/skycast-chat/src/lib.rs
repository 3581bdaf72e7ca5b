//! Skycast Chat crate - the conversation log and the submission pipeline.
//!
//! [`ChatManager`] owns the log, runs typed and spoken queries through the
//! backend and the speech bridge, and mirrors every change to the store.

pub mod error;
pub mod manager;
pub mod state;

pub use error::ChatError;
pub use manager::{
    ChatConfig, ChatEvent, ChatManager, TEXT_APOLOGY, VOICE_APOLOGY, VOICE_PLACEHOLDER,
    WELCOME_TEXT,
};
pub use state::{SessionState, StateMachine};
