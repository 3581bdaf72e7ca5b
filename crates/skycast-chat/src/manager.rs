//! Conversation log owner and submission pipeline.
//!
//! Every log mutation is written through to the [`Store`] and announced on a
//! broadcast channel so a view can redraw and scroll to the latest entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use skycast_client::WeatherBackend;
use skycast_core::config::SkycastConfig;
use skycast_core::error::SkycastError;
use skycast_core::types::{AudioBlob, AudioHandle, Message};
use skycast_storage::Store;
use skycast_voice::SpeechBridge;

use crate::error::ChatError;
use crate::state::{SessionState, StateMachine};

pub const WELCOME_TEXT: &str =
    "Hello! I'm your Weather AI Assistant. Ask me about the weather anywhere!";
pub const TEXT_APOLOGY: &str = "Sorry, I couldn't process your request. Please try again.";
pub const VOICE_PLACEHOLDER: &str = "Processing your voice message...";
pub const VOICE_APOLOGY: &str =
    "Sorry, I couldn't understand your voice message. Please try again or type your question.";

/// Presentation events published by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The log changed; the view should show the latest entry.
    LogChanged { len: usize },
    StateChanged(SessionState),
}

/// Chat behaviour settings.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Narrate replies when a speech bridge is available.
    pub narrate: bool,
    /// Events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            narrate: true,
            event_capacity: 64,
        }
    }
}

impl From<&SkycastConfig> for ChatConfig {
    fn from(config: &SkycastConfig) -> Self {
        Self {
            narrate: config.voice.narrate,
            ..Self::default()
        }
    }
}

fn welcome() -> Message {
    Message::bot(WELCOME_TEXT)
}

fn drop_placeholders(log: &mut Vec<Message>) {
    log.retain(|m| !m.is_temporary);
}

/// Holds the busy flag for one submission. Dropping it returns the manager
/// to `Idle`.
struct BusyGuard<'a> {
    manager: &'a ChatManager,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if self.manager.state.reset() != SessionState::Idle {
            self.manager.publish(ChatEvent::StateChanged(SessionState::Idle));
        }
        self.manager.busy.store(false, Ordering::SeqCst);
    }
}

/// Sole owner of the conversation log.
pub struct ChatManager {
    store: Store,
    backend: Arc<dyn WeatherBackend>,
    speech: Option<Arc<dyn SpeechBridge>>,
    config: ChatConfig,
    log: Mutex<Vec<Message>>,
    session_id: Mutex<String>,
    busy: AtomicBool,
    state: StateMachine,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatManager {
    /// Restore the saved log (or start from the welcome message) and the
    /// session identifier.
    pub fn new(
        store: Store,
        backend: Arc<dyn WeatherBackend>,
        speech: Option<Arc<dyn SpeechBridge>>,
        config: ChatConfig,
    ) -> Result<Self, ChatError> {
        let mut log = match store.load() {
            Ok(Some(messages)) => messages,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Could not read the saved conversation, starting fresh");
                Vec::new()
            }
        };
        // A placeholder left behind by an interrupted voice submission.
        drop_placeholders(&mut log);
        if log.is_empty() {
            log.push(welcome());
        }
        if let Err(e) = store.save(&log) {
            warn!(error = %e, "Failed to persist conversation log");
        }

        let session_id = store.get_or_create_session_id()?;
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        info!(
            messages = log.len(),
            session_id = %session_id,
            narrate = config.narrate && speech.is_some(),
            "Chat manager ready"
        );

        Ok(Self {
            store,
            backend,
            speech,
            config,
            log: Mutex::new(log),
            session_id: Mutex::new(session_id),
            busy: AtomicBool::new(false),
            state: StateMachine::new(),
            event_tx,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Snapshot of the conversation log.
    pub fn messages(&self) -> Vec<Message> {
        self.lock_log().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub fn session_id(&self) -> String {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Send a typed query.
    ///
    /// Blank input is ignored. Backend and narration failures become chat
    /// messages; only [`ChatError::Busy`] is reported to the caller in
    /// normal operation.
    pub async fn submit_text(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            debug!("Ignoring blank submission");
            return Ok(());
        }
        let _busy = self.acquire()?;
        self.append(Message::user(text));
        self.round_trip(text).await
    }

    /// Transcribe a recording and send the transcript as a query.
    pub async fn submit_voice(&self, blob: &AudioBlob) -> Result<(), ChatError> {
        let _busy = self.acquire()?;
        self.transition(SessionState::AwaitingTranscription)?;
        self.append(Message::placeholder(VOICE_PLACEHOLDER));

        let text = match self.transcribe(blob).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, bytes = blob.len(), "Voice message not understood");
                self.mutate(|log| {
                    drop_placeholders(log);
                    log.push(Message::bot_error(VOICE_APOLOGY));
                });
                return Ok(());
            }
        };

        self.mutate(|log| {
            drop_placeholders(log);
            log.push(Message::user(text.as_str()));
        });
        self.round_trip(&text).await
    }

    /// Reset the log to the welcome message and start a new session.
    ///
    /// The backend is asked to forget the old session, but a new identifier
    /// is used whether or not it complies.
    pub async fn clear_history(&self) {
        let len = {
            let mut log = self.lock_log();
            *log = vec![welcome()];
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to drop the saved conversation");
            }
            log.len()
        };
        self.publish(ChatEvent::LogChanged { len });

        let previous = self.session_id();
        if let Err(e) = self.backend.clear_remote_history(&previous).await {
            warn!(error = %e, session_id = %previous, "Backend did not clear its history");
        }

        let next = match self.store.rotate_session_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to persist new session identifier");
                Uuid::new_v4().to_string()
            }
        };
        *self.session_id.lock().unwrap_or_else(PoisonError::into_inner) = next.clone();
        info!(session_id = %next, "Conversation cleared");
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    async fn round_trip(&self, text: &str) -> Result<(), ChatError> {
        self.transition(SessionState::AwaitingBackend)?;
        let session_id = self.session_id();

        let answer = match self.backend.query(text, &session_id).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Weather query failed");
                self.append(Message::bot_error(TEXT_APOLOGY));
                return Ok(());
            }
        };

        let audio = self.narrate(&answer.explanation).await?;
        debug!(
            weather = answer.weather.is_some(),
            narrated = audio.is_some(),
            "Reply received"
        );
        self.append(
            Message::bot(answer.explanation)
                .with_weather(answer.weather)
                .with_audio(audio),
        );
        Ok(())
    }

    /// Narration failures are contained: the reply goes out without audio.
    async fn narrate(&self, text: &str) -> Result<Option<AudioHandle>, ChatError> {
        let Some(speech) = self.speech.as_ref().filter(|_| self.config.narrate) else {
            return Ok(None);
        };
        self.transition(SessionState::Narrating)?;
        match speech.text_to_speech(text).await {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                warn!(error = %e, "Narration failed, replying without audio");
                Ok(None)
            }
        }
    }

    async fn transcribe(&self, blob: &AudioBlob) -> Result<String, SkycastError> {
        let speech = self
            .speech
            .as_ref()
            .ok_or_else(|| SkycastError::Provider("speech bridge is not configured".into()))?;
        let text = speech.speech_to_text(blob).await?;
        if text.trim().is_empty() {
            return Err(SkycastError::EmptyTranscript);
        }
        Ok(text)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn lock_log(&self) -> MutexGuard<'_, Vec<Message>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, ChatError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Submission rejected, another one is in flight");
            return Err(ChatError::Busy);
        }
        Ok(BusyGuard { manager: self })
    }

    fn transition(&self, target: SessionState) -> Result<(), ChatError> {
        self.state.transition(target)?;
        self.publish(ChatEvent::StateChanged(target));
        Ok(())
    }

    fn publish(&self, event: ChatEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }

    fn append(&self, message: Message) {
        self.mutate(|log| log.push(message));
    }

    /// Apply `f` to the log and write the result through to the store.
    ///
    /// The save happens under the log lock so writes land in mutation order.
    fn mutate<F: FnOnce(&mut Vec<Message>)>(&self, f: F) {
        let len = {
            let mut log = self.lock_log();
            f(&mut log);
            if let Err(e) = self.store.save(&log) {
                warn!(error = %e, "Failed to persist conversation log");
            }
            log.len()
        };
        self.publish(ChatEvent::LogChanged { len });
    }
}

impl std::fmt::Debug for ChatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatManager")
            .field("messages", &self.lock_log().len())
            .field("state", &self.state())
            .field("busy", &self.is_busy())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
