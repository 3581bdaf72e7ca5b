//! Integration tests for the speech bridge against a local axum server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use skycast_core::config::VoiceConfig;
use skycast_core::error::SkycastError;
use skycast_core::types::AudioBlob;
use skycast_voice::{ElevenLabsBridge, SpeechBridge};

// =============================================================================
// Fake provider
// =============================================================================

#[derive(Clone, Default)]
struct Provider {
    /// MIME labels of every uploaded `file` field, in order.
    uploads: Arc<Mutex<Vec<String>>>,
    /// `model_id` fields seen on uploads.
    models: Arc<Mutex<Vec<String>>>,
    /// `(voice_id, api key, body)` of every narration request.
    narrations: Arc<Mutex<Vec<(String, String, Value)>>>,
    /// `output_format` query parameter of every narration request.
    formats: Arc<Mutex<Vec<String>>>,
    /// Status returned for uploads labelled `audio/webm`.
    webm_status: Option<StatusCode>,
    /// Status returned for every upload, overriding success.
    upload_status: Option<StatusCode>,
    transcript: String,
}

async fn speech_to_text(State(p): State<Provider>, mut form: Multipart) -> impl IntoResponse {
    let mut mime = String::new();
    while let Some(field) = form.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => mime = field.content_type().unwrap_or_default().to_string(),
            "model_id" => {
                let model = field.text().await.unwrap();
                p.models.lock().unwrap().push(model);
            }
            _ => {}
        }
    }
    p.uploads.lock().unwrap().push(mime.clone());

    if let Some(status) = p.upload_status {
        return (status, Json(json!({"detail": "rejected"}))).into_response();
    }
    if let (Some(status), "audio/webm") = (p.webm_status, mime.as_str()) {
        return (status, Json(json!({"detail": "unsupported format"}))).into_response();
    }
    Json(json!({"text": p.transcript})).into_response()
}

async fn text_to_speech(
    State(p): State<Provider>,
    Path(voice_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let key = headers
        .get("xi-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let format = query.get("output_format").cloned().unwrap_or_default();
    p.narrations.lock().unwrap().push((voice_id, key.clone(), body));
    p.formats.lock().unwrap().push(format.clone());
    if key != "test-key" {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    if format.starts_with("pcm_") {
        return ([("content-type", "audio/pcm")], vec![0x00u8, 0x40, 0x00, 0xC0]).into_response();
    }
    ([("content-type", "audio/mpeg")], vec![0xFFu8, 0xFB, 0x90, 0x64]).into_response()
}

async fn spawn(provider: Provider, api_key: &str) -> (ElevenLabsBridge, tempfile::TempDir) {
    spawn_with(provider, api_key, VoiceConfig::default()).await
}

async fn spawn_with(
    provider: Provider,
    api_key: &str,
    base: VoiceConfig,
) -> (ElevenLabsBridge, tempfile::TempDir) {
    let router = Router::new()
        .route("/v1/speech-to-text", post(speech_to_text))
        .route("/v1/text-to-speech/{voice_id}", post(text_to_speech))
        .with_state(provider);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let config = VoiceConfig {
        api_base: format!("http://{}", addr),
        api_key: api_key.to_string(),
        ..base
    };
    (ElevenLabsBridge::new(config, dir.path().join("audio")), dir)
}

fn webm_blob() -> AudioBlob {
    AudioBlob::new(vec![0x1A, 0x45, 0xDF, 0xA3, 0x00], "audio/webm")
}

// =============================================================================
// speech_to_text
// =============================================================================

#[tokio::test]
async fn test_transcription_uses_blob_label_and_model() {
    let provider = Provider {
        transcript: "What's the weather in Paris?".to_string(),
        ..Provider::default()
    };
    let (bridge, _dir) = spawn(provider.clone(), "test-key").await;

    let text = bridge.speech_to_text(&webm_blob()).await.unwrap();
    assert_eq!(text, "What's the weather in Paris?");
    assert_eq!(*provider.uploads.lock().unwrap(), vec!["audio/webm".to_string()]);
    assert_eq!(*provider.models.lock().unwrap(), vec!["scribe_v1".to_string()]);
}

#[tokio::test]
async fn test_format_rejection_retries_once_with_fallback() {
    let provider = Provider {
        webm_status: Some(StatusCode::UNSUPPORTED_MEDIA_TYPE),
        transcript: "rain in Leeds".to_string(),
        ..Provider::default()
    };
    let (bridge, _dir) = spawn(provider.clone(), "test-key").await;

    let text = bridge.speech_to_text(&webm_blob()).await.unwrap();
    assert_eq!(text, "rain in Leeds");
    assert_eq!(
        *provider.uploads.lock().unwrap(),
        vec!["audio/webm".to_string(), "audio/wav".to_string()]
    );
}

#[tokio::test]
async fn test_format_rejection_on_every_candidate_gives_up() {
    let provider = Provider {
        upload_status: Some(StatusCode::BAD_REQUEST),
        ..Provider::default()
    };
    let (bridge, _dir) = spawn(provider.clone(), "test-key").await;

    let err = bridge.speech_to_text(&webm_blob()).await.unwrap_err();
    assert!(matches!(err, SkycastError::Provider(_)));
    assert_eq!(provider.uploads.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unauthorized_upload_never_retries() {
    let provider = Provider {
        upload_status: Some(StatusCode::UNAUTHORIZED),
        ..Provider::default()
    };
    let (bridge, _dir) = spawn(provider.clone(), "test-key").await;

    let err = bridge.speech_to_text(&webm_blob()).await.unwrap_err();
    assert!(matches!(err, SkycastError::Auth(_)));
    assert_eq!(provider.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_server_failure_does_not_retry() {
    let provider = Provider {
        upload_status: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Provider::default()
    };
    let (bridge, _dir) = spawn(provider.clone(), "test-key").await;

    let err = bridge.speech_to_text(&webm_blob()).await.unwrap_err();
    assert!(matches!(err, SkycastError::Provider(_)));
    assert_eq!(provider.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_transcript_is_returned_as_is() {
    let (bridge, _dir) = spawn(Provider::default(), "test-key").await;
    let text = bridge.speech_to_text(&webm_blob()).await.unwrap();
    assert!(text.is_empty());
}

// =============================================================================
// text_to_speech
// =============================================================================

#[tokio::test]
async fn test_narration_is_saved_as_playable_wav() {
    let provider = Provider::default();
    let (bridge, dir) = spawn(provider.clone(), "test-key").await;

    let handle = bridge
        .text_to_speech("It is 18°C and cloudy in London.")
        .await
        .unwrap();

    assert!(handle.path.starts_with(dir.path().join("audio")));
    assert_eq!(handle.path.extension().unwrap(), "wav");
    let clip = skycast_audio::decode_wav(&std::fs::read(&handle.path).unwrap()).unwrap();
    assert_eq!(clip.sample_rate, 16000);
    assert_eq!(clip.channels, 1);
    assert_eq!(clip.samples.len(), 2);
    assert_eq!(*provider.formats.lock().unwrap(), vec!["pcm_16000".to_string()]);

    let narrations = provider.narrations.lock().unwrap();
    let (voice_id, key, body) = &narrations[0];
    assert_eq!(voice_id, "EXAVITQu4vr4xnSDxMaL");
    assert_eq!(key, "test-key");
    assert_eq!(body["text"], "It is 18°C and cloudy in London.");
    assert_eq!(body["model_id"], "eleven_monolingual_v1");
    assert_eq!(body["voice_settings"]["stability"], 0.5);
}

#[tokio::test]
async fn test_mp3_narration_is_saved_as_is() {
    let provider = Provider::default();
    let config = VoiceConfig {
        output_format: "mp3_44100_128".to_string(),
        ..VoiceConfig::default()
    };
    let (bridge, _dir) = spawn_with(provider.clone(), "test-key", config).await;

    let handle = bridge.text_to_speech("Sunny in Madrid.").await.unwrap();
    assert_eq!(handle.path.extension().unwrap(), "mp3");
    assert_eq!(std::fs::read(&handle.path).unwrap(), vec![0xFF, 0xFB, 0x90, 0x64]);
    assert_eq!(*provider.formats.lock().unwrap(), vec!["mp3_44100_128".to_string()]);
}

#[tokio::test]
async fn test_narration_with_rejected_key_is_auth_error() {
    let (bridge, _dir) = spawn(Provider::default(), "wrong-key").await;
    let err = bridge.text_to_speech("hello").await.unwrap_err();
    assert!(matches!(err, SkycastError::Auth(_)));
}
