//! Skycast Client crate - HTTP client for the weather/AI backend.
//!
//! Sends user queries with the session identifier and asks the backend to
//! forget a session. No retries; transport defaults apply.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use skycast_core::config::BackendConfig;
use skycast_core::error::SkycastError;
use skycast_core::types::WeatherData;

/// Header carrying the session identifier on every backend call.
pub const SESSION_HEADER: &str = "X-Session-ID";

/// Longest response body kept in a `Server` error.
const MAX_ERROR_BODY: usize = 512;

/// Backend answer to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    /// Natural-language answer shown to the user.
    pub explanation: String,
    /// Structured observation, present only when displayable.
    pub weather: Option<WeatherData>,
}

/// The remote side of a conversation.
#[async_trait]
pub trait WeatherBackend: Send + Sync {
    /// Ask the backend a question on behalf of `session_id`.
    async fn query(&self, text: &str, session_id: &str) -> Result<QueryAnswer, SkycastError>;

    /// Ask the backend to forget the history of `session_id`.
    async fn clear_remote_history(&self, session_id: &str) -> Result<(), SkycastError>;
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ai_explanation: Option<String>,
    #[serde(default)]
    weather_data: Option<Value>,
}

/// reqwest-backed [`WeatherBackend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Reuse an existing connection pool.
    pub fn with_client(http: Client, config: BackendConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

#[async_trait]
impl WeatherBackend for BackendClient {
    async fn query(&self, text: &str, session_id: &str) -> Result<QueryAnswer, SkycastError> {
        let url = self.config.query_url();
        debug!(url = %url, len = text.len(), "Sending weather query");

        let resp = self
            .http
            .post(&url)
            .header(SESSION_HEADER, session_id)
            .json(&QueryRequest { query: text })
            .send()
            .await
            .map_err(|e| SkycastError::Network(format!("query request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| SkycastError::Network(format!("read response failed: {e}")))?;

        if !status.is_success() {
            return Err(server_error(status.as_u16(), body));
        }

        let parsed: QueryResponse = serde_json::from_str(&body)?;
        let explanation = parsed
            .ai_explanation
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| server_error(status.as_u16(), "response has no ai_explanation"))?;
        let weather = parsed.weather_data.and_then(WeatherData::from_value);

        info!(
            status = status.as_u16(),
            has_weather = weather.is_some(),
            "Weather query answered"
        );
        Ok(QueryAnswer {
            explanation,
            weather,
        })
    }

    async fn clear_remote_history(&self, session_id: &str) -> Result<(), SkycastError> {
        let url = self.config.clear_url();
        let resp = self
            .http
            .delete(&url)
            .header(SESSION_HEADER, session_id)
            .send()
            .await
            .map_err(|e| SkycastError::Network(format!("clear request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(server_error(status.as_u16(), body));
        }
        info!(session_id = %session_id, "Remote chat history cleared");
        Ok(())
    }
}

fn server_error(status: u16, body: impl Into<String>) -> SkycastError {
    let mut body = body.into();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...(truncated)");
    }
    SkycastError::Server { status, body }
}
