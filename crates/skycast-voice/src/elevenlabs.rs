//! ElevenLabs-compatible implementation of [`SpeechBridge`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use skycast_audio::pcm16_to_wav;
use skycast_core::config::VoiceConfig;
use skycast_core::error::SkycastError;
use skycast_core::types::{AudioBlob, AudioHandle};

use crate::encoding::{EncodingCandidate, EncodingStrategy};
use crate::SpeechBridge;

const API_KEY_HEADER: &str = "xi-api-key";

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Speech bridge talking to the ElevenLabs v1 API.
#[derive(Debug, Clone)]
pub struct ElevenLabsBridge {
    http: Client,
    config: VoiceConfig,
    audio_dir: PathBuf,
}

impl ElevenLabsBridge {
    /// Narrated replies are written below `audio_dir`.
    pub fn new(config: VoiceConfig, audio_dir: PathBuf) -> Self {
        Self {
            http: Client::new(),
            config,
            audio_dir,
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, SkycastError> {
        let key = self.config.api_key.trim();
        if key.is_empty() {
            return Err(SkycastError::Auth("voice API key is not configured".into()));
        }
        Ok(key)
    }

    /// Send one transcription attempt labelled with `candidate`.
    async fn upload(
        &self,
        key: &str,
        blob: &AudioBlob,
        candidate: &EncodingCandidate,
    ) -> Result<Response, SkycastError> {
        let part = multipart::Part::bytes(blob.bytes.clone())
            .file_name(candidate.file_name.clone())
            .mime_str(&candidate.mime)
            .map_err(|e| SkycastError::Provider(format!("invalid mime {}: {e}", candidate.mime)))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model_id", self.config.stt_model_id.clone());

        self.http
            .post(self.endpoint("v1/speech-to-text"))
            .header(API_KEY_HEADER, key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SkycastError::Provider(format!("speech-to-text request failed: {e}")))
    }
}

#[async_trait]
impl SpeechBridge for ElevenLabsBridge {
    async fn text_to_speech(&self, text: &str) -> Result<AudioHandle, SkycastError> {
        if text.trim().is_empty() {
            return Err(SkycastError::Provider("nothing to narrate".into()));
        }
        let key = self.api_key()?;
        let url = self.endpoint(&format!("v1/text-to-speech/{}", self.config.voice_id));
        debug!(url = %url, len = text.len(), "Requesting narration");

        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, key)
            .query(&[("output_format", self.config.output_format.as_str())])
            .json(&TtsRequest {
                text,
                model_id: &self.config.tts_model_id,
                voice_settings: VoiceSettings {
                    stability: self.config.stability,
                    similarity_boost: self.config.similarity_boost,
                },
            })
            .send()
            .await
            .map_err(|e| SkycastError::Provider(format!("text-to-speech request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(provider_failure(status, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SkycastError::Provider(format!("read audio failed: {e}")))?;
        if bytes.is_empty() {
            return Err(SkycastError::Provider("provider returned no audio".into()));
        }

        // Raw PCM gets a WAV header so it can be played back locally.
        let (audio, extension) = match self.config.pcm_sample_rate() {
            Some(rate) => (pcm16_to_wav(&bytes, rate, 1), "wav"),
            None => (bytes.to_vec(), "mp3"),
        };
        let path = self
            .audio_dir
            .join(format!("{}.{extension}", Uuid::new_v4()));
        save_narration(&self.audio_dir, &path, &audio).await?;

        info!(path = %path.display(), bytes = audio.len(), "Narration saved");
        Ok(AudioHandle::new(path))
    }

    async fn speech_to_text(&self, blob: &AudioBlob) -> Result<String, SkycastError> {
        if blob.is_empty() {
            return Err(SkycastError::Provider("recording is empty".into()));
        }
        let key = self.api_key()?;
        let strategy = EncodingStrategy::for_mime(&blob.mime);
        let candidates = strategy.candidates();

        for (attempt, candidate) in candidates.iter().enumerate() {
            let resp = self.upload(key, blob, candidate).await?;
            let status = resp.status();

            if status.is_success() {
                let parsed: SttResponse = resp
                    .json()
                    .await
                    .map_err(|e| SkycastError::Provider(format!("invalid transcription: {e}")))?;
                let text = parsed.text.unwrap_or_default();
                info!(
                    attempt = attempt + 1,
                    mime = %candidate.mime,
                    len = text.len(),
                    "Recording transcribed"
                );
                return Ok(text);
            }

            let body = resp.text().await.unwrap_or_default();
            let has_next = attempt + 1 < candidates.len();
            if has_next && EncodingStrategy::is_format_rejection(status.as_u16()) {
                warn!(
                    status = status.as_u16(),
                    mime = %candidate.mime,
                    "Provider rejected recording format, trying next encoding"
                );
                continue;
            }
            return Err(provider_failure(status, &body));
        }

        Err(SkycastError::Provider("no encoding candidates".into()))
    }
}

async fn save_narration(dir: &Path, path: &Path, audio: &[u8]) -> Result<(), SkycastError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SkycastError::Provider(format!("cannot create {}: {e}", dir.display())))?;
    tokio::fs::write(path, audio)
        .await
        .map_err(|e| SkycastError::Provider(format!("cannot save {}: {e}", path.display())))
}

fn provider_failure(status: StatusCode, body: &str) -> SkycastError {
    let detail = format!(
        "{} {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.chars().take(256).collect::<String>()
    );
    if status == StatusCode::UNAUTHORIZED {
        SkycastError::Auth(detail)
    } else {
        SkycastError::Provider(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_maps_to_auth() {
        let err = provider_failure(StatusCode::UNAUTHORIZED, "invalid api key");
        assert!(matches!(err, SkycastError::Auth(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_other_statuses_map_to_provider() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::TOO_MANY_REQUESTS, StatusCode::BAD_GATEWAY] {
            assert!(matches!(
                provider_failure(status, ""),
                SkycastError::Provider(_)
            ));
        }
    }

    #[test]
    fn test_tts_request_shape() {
        let body = serde_json::to_value(TtsRequest {
            text: "It is sunny.",
            model_id: "eleven_monolingual_v1",
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.5,
            },
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "text": "It is sunny.",
                "model_id": "eleven_monolingual_v1",
                "voice_settings": {"stability": 0.5, "similarity_boost": 0.5}
            })
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_fast() {
        let bridge = ElevenLabsBridge::new(VoiceConfig::default(), std::env::temp_dir());
        let err = bridge.text_to_speech("hello").await.unwrap_err();
        assert!(matches!(err, SkycastError::Auth(_)));

        let blob = AudioBlob::new(vec![1, 2, 3], "audio/wav");
        let err = bridge.speech_to_text(&blob).await.unwrap_err();
        assert!(matches!(err, SkycastError::Auth(_)));
    }

    #[tokio::test]
    async fn test_unwritable_audio_dir_is_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("audio");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = save_narration(&blocker, &blocker.join("reply.wav"), b"RIFF")
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::Provider(msg) if msg.contains("cannot create")));
    }

    #[tokio::test]
    async fn test_blank_text_is_provider_error() {
        let bridge = ElevenLabsBridge::new(VoiceConfig::default(), std::env::temp_dir());
        let err = bridge.text_to_speech("   ").await.unwrap_err();
        assert!(matches!(err, SkycastError::Provider(_)));
    }
}
