use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SkycastError};

/// Environment variable that overrides `voice.api_key`.
pub const VOICE_API_KEY_ENV: &str = "SKYCAST_VOICE_API_KEY";

/// Top-level configuration for the Skycast client.
///
/// Loaded from `~/.skycast/config.toml` by default. Each section configures
/// one collaborator; nothing is read from process-wide globals after startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkycastConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl SkycastConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SkycastConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SkycastError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Data directory with a leading `~` expanded to the home directory.
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.general.data_dir)
    }

    /// Directory that narrated replies are written to.
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir().join("audio")
    }

    /// Full path of the SQLite store.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.db_file)
    }
}

/// Expand `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the store and narrated audio.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.skycast/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Weather backend endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme, host and port of the backend.
    pub base_url: String,
    /// Path of the query endpoint (POST).
    pub query_path: String,
    /// Path of the clear-history endpoint (DELETE).
    pub clear_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            query_path: "/api/weather/query".to_string(),
            clear_path: "/api/weather/clear-chat".to_string(),
        }
    }
}

impl BackendConfig {
    pub fn query_url(&self) -> String {
        join_url(&self.base_url, &self.query_path)
    }

    pub fn clear_url(&self) -> String {
        join_url(&self.base_url, &self.clear_path)
    }
}

/// Third-party speech service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Base URL of the speech API.
    pub api_base: String,
    /// API key sent as `xi-api-key`. Overridden by `SKYCAST_VOICE_API_KEY`.
    pub api_key: String,
    /// Voice used for narration.
    pub voice_id: String,
    /// Model for text-to-speech.
    pub tts_model_id: String,
    /// Model for speech-to-text.
    pub stt_model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    /// Provider audio format for narration. `pcm_<rate>` is saved as WAV and
    /// can be played in the terminal; `mp3_*` is saved as-is.
    pub output_format: String,
    /// Whether bot replies are narrated.
    pub narrate: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io".to_string(),
            api_key: String::new(),
            voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
            tts_model_id: "eleven_monolingual_v1".to_string(),
            stt_model_id: "scribe_v1".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            output_format: "pcm_16000".to_string(),
            narrate: true,
        }
    }
}

impl VoiceConfig {
    /// The API key, preferring the environment over the config file.
    pub fn resolved_api_key(&self) -> String {
        match std::env::var(VOICE_API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => self.api_key.clone(),
        }
    }

    /// Sample rate of raw PCM narration, or `None` for encoded formats.
    pub fn pcm_sample_rate(&self) -> Option<u32> {
        self.output_format
            .strip_prefix("pcm_")
            .and_then(|rate| rate.parse().ok())
    }
}

/// Microphone recording settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Sample rate of the produced WAV blob, in Hz.
    pub sample_rate: u32,
    /// Channel count of the produced WAV blob.
    pub channels: u16,
    /// Recording is cut off after this many seconds.
    pub max_duration_secs: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            max_duration_secs: 120,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name inside the data directory.
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "skycast.db".to_string(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
