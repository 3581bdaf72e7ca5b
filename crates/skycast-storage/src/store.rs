//! Conversation log and session identifier persistence.

use std::path::Path;

use tracing::{debug, info, warn};
use uuid::Uuid;

use skycast_core::error::SkycastError;
use skycast_core::types::Message;

use crate::db::Database;

/// Key holding the JSON-serialized message log.
pub const MESSAGES_KEY: &str = "skycast.messages";
/// Key holding the session identifier sent to the backend.
pub const SESSION_ID_KEY: &str = "skycast.session_id";

/// Persistent store for one chat profile.
///
/// Values are overwritten wholesale; the last write wins. Stored data is not
/// versioned, so `load` validates before trusting it.
#[derive(Debug)]
pub struct Store {
    db: Database,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, SkycastError> {
        Ok(Self {
            db: Database::new(path)?,
        })
    }

    pub fn in_memory() -> Result<Self, SkycastError> {
        Ok(Self {
            db: Database::in_memory()?,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Load the saved log.
    ///
    /// Returns `None` when nothing is saved or the saved value is not a
    /// non-empty array of messages.
    pub fn load(&self) -> Result<Option<Vec<Message>>, SkycastError> {
        let Some(raw) = self.db.get(MESSAGES_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) if messages.is_empty() => {
                warn!("Stored conversation log is empty, ignoring it");
                Ok(None)
            }
            Ok(messages) => {
                debug!(len = messages.len(), "Conversation log loaded");
                Ok(Some(messages))
            }
            Err(e) => {
                warn!(error = %e, "Stored conversation log is unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    /// Overwrite the saved log with `messages`.
    pub fn save(&self, messages: &[Message]) -> Result<(), SkycastError> {
        let raw = serde_json::to_string(messages)?;
        self.db.put(MESSAGES_KEY, &raw)
    }

    /// Drop the saved log.
    pub fn clear(&self) -> Result<(), SkycastError> {
        self.db.remove(MESSAGES_KEY)?;
        info!("Conversation log cleared");
        Ok(())
    }

    /// Return the saved session identifier, creating one on first use.
    pub fn get_or_create_session_id(&self) -> Result<String, SkycastError> {
        if let Some(id) = self.db.get(SESSION_ID_KEY)? {
            if !id.trim().is_empty() {
                return Ok(id);
            }
        }
        self.rotate_session_id()
    }

    /// Replace the session identifier with a fresh one.
    pub fn rotate_session_id(&self) -> Result<String, SkycastError> {
        let id = Uuid::new_v4().to_string();
        self.db.put(SESSION_ID_KEY, &id)?;
        info!(session_id = %id, "Session identifier created");
        Ok(id)
    }
}
