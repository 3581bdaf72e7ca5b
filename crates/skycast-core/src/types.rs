use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Conversation
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One entry in the conversation log.
///
/// Serialized with the camelCase keys used by the persisted log. Optional
/// fields are omitted when absent so stored entries stay compact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Millisecond wall-clock timestamp. Unique on a best-effort basis only.
    pub id: i64,
    pub text: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_data: Option<WeatherData>,
    /// Location of the narrated reply, if one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_temporary: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Generate a message id from the wall clock.
///
/// Two calls within the same millisecond return the same id.
pub fn next_message_id() -> i64 {
    Utc::now().timestamp_millis()
}

impl Message {
    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            id: next_message_id(),
            text: text.into(),
            sender,
            weather_data: None,
            audio_url: None,
            error: false,
            is_temporary: false,
        }
    }

    /// A turn typed or spoken by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    /// A plain assistant turn.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Bot)
    }

    /// An assistant turn reporting a failure to the user.
    pub fn bot_error(text: impl Into<String>) -> Self {
        Self {
            error: true,
            ..Self::new(text, Sender::Bot)
        }
    }

    /// A transient assistant turn shown while work is in flight.
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self {
            is_temporary: true,
            ..Self::new(text, Sender::Bot)
        }
    }

    pub fn with_weather(mut self, weather: Option<WeatherData>) -> Self {
        self.weather_data = weather;
        self
    }

    pub fn with_audio(mut self, audio: Option<AudioHandle>) -> Self {
        self.audio_url = audio.map(|a| a.to_string());
        self
    }
}

// =============================================================================
// Weather payload
// =============================================================================

/// Structured weather observation attached to a bot reply.
///
/// Only the fields the client reads are typed. The payload is serialized
/// back exactly as the backend sent it, so it survives a store round trip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct WeatherData {
    /// City name.
    pub name: Option<String>,
    pub main: Option<MainReadings>,
    pub wind: Option<Wind>,
    pub weather: Vec<Condition>,
    raw: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MainReadings {
    /// Temperature in degrees Celsius.
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    /// Relative humidity in percent.
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Wind {
    /// Wind speed in metres per second.
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
struct TypedView {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    main: Option<MainReadings>,
    #[serde(default)]
    wind: Option<Wind>,
    #[serde(default)]
    weather: Option<Vec<Condition>>,
}

impl TryFrom<Map<String, Value>> for WeatherData {
    type Error = serde_json::Error;

    fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
        let view: TypedView = serde_json::from_value(Value::Object(raw.clone()))?;
        Ok(Self {
            name: view.name,
            main: view.main,
            wind: view.wind,
            weather: view.weather.unwrap_or_default(),
            raw,
        })
    }
}

impl From<WeatherData> for Map<String, Value> {
    fn from(data: WeatherData) -> Self {
        data.raw
    }
}

impl WeatherData {
    /// Validate an untyped backend payload.
    ///
    /// Returns `None` for non-objects, payloads whose known fields have the
    /// wrong shape, and payloads with neither a temperature nor a city name.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        match serde_json::from_value::<WeatherData>(value) {
            Ok(data) if data.is_displayable() => Some(data),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed weather payload");
                None
            }
        }
    }

    /// The payload as received, including fields the client does not read.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Whether the payload carries enough to show a weather card.
    pub fn is_displayable(&self) -> bool {
        self.temperature().is_some() || self.name.as_deref().is_some_and(|n| !n.is_empty())
    }

    pub fn temperature(&self) -> Option<f64> {
        self.main.as_ref().and_then(|m| m.temp)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.main.as_ref().and_then(|m| m.humidity)
    }

    pub fn wind_speed(&self) -> Option<f64> {
        self.wind.as_ref().and_then(|w| w.speed)
    }

    /// Description of the first reported condition.
    pub fn description(&self) -> Option<&str> {
        self.weather.first().and_then(|c| c.description.as_deref())
    }

    pub fn temperature_label(&self) -> Option<String> {
        self.temperature().map(|t| format!("{}°C", t.round() as i64))
    }

    pub fn humidity_label(&self) -> Option<String> {
        self.humidity().map(|h| format!("Humidity: {}%", h))
    }

    pub fn wind_label(&self) -> Option<String> {
        self.wind_speed().map(|s| format!("Wind: {} m/s", s))
    }
}

// =============================================================================
// Audio
// =============================================================================

/// A finished recording, ready for transcription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    /// Container MIME type, e.g. `audio/wav` or `audio/webm`.
    pub mime: String,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// Guess the MIME type from a file extension.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("wav") => "audio/wav",
            Some("mp3") => "audio/mpeg",
            Some("ogg") => "audio/ogg",
            Some("m4a") => "audio/mp4",
            _ => "audio/webm",
        };
        Ok(Self::new(bytes, mime))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Playable audio produced by narration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioHandle {
    pub path: PathBuf,
}

impl AudioHandle {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl std::fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

// =============================================================================
// Tests
// =============================================================================
