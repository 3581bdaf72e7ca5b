//! Skycast binary - composition root.
//!
//! 1. Parse CLI args, load configuration, initialize tracing
//! 2. Open the store under the data directory
//! 3. Build the backend client, speech bridge, recorder and narration player
//! 4. Run the terminal chat loop

mod cli;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use skycast_audio::{CpalMicrophone, CpalSpeaker, NarrationPlayer, RecordingController};
use skycast_chat::{ChatConfig, ChatError, ChatEvent, ChatManager};
use skycast_client::BackendClient;
use skycast_core::config::SkycastConfig;
use skycast_core::error::SkycastError;
use skycast_core::types::{AudioBlob, Message};
use skycast_storage::Store;
use skycast_voice::{ElevenLabsBridge, SpeechBridge};

use cli::CliArgs;
use repl::{narration, record_blocked, render, unseen, Command, BUSY_NOTICE, HELP};

/// Build the speech bridge, or `None` when voice is off or has no API key.
fn speech_bridge(config: &SkycastConfig, disabled: bool) -> Option<Arc<dyn SpeechBridge>> {
    if disabled {
        info!("Voice features disabled");
        return None;
    }
    let mut voice = config.voice.clone();
    voice.api_key = voice.resolved_api_key();
    if voice.api_key.trim().is_empty() {
        warn!("No voice API key configured, narration and voice messages are off");
        return None;
    }
    info!(api_base = %voice.api_base, narrate = voice.narrate, "Speech bridge ready");
    Some(Arc::new(ElevenLabsBridge::new(voice, config.audio_dir())))
}

/// Print log entries as they appear.
async fn print_log(chat: Arc<ChatManager>) {
    let mut events = chat.subscribe();
    let mut shown: Vec<Message> = chat.messages();
    loop {
        match events.recv().await {
            Ok(ChatEvent::LogChanged { .. }) => {
                let current = chat.messages();
                for message in unseen(&shown, &current) {
                    println!("{}", render(message));
                }
                shown = current;
            }
            Ok(ChatEvent::StateChanged(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Display fell behind");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn report_submission(result: Result<(), ChatError>) {
    match result {
        Ok(()) => {}
        Err(ChatError::Busy) => println!("{BUSY_NOTICE}"),
        Err(e) => error!(error = %e, "Submission failed"),
    }
}

/// Play one narration on a blocking thread and report failures.
async fn play_narration(player: Arc<NarrationPlayer>, path: PathBuf) {
    let shown = path.display().to_string();
    let result = tokio::task::spawn_blocking(move || player.play_file(&path)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(SkycastError::Io(e))) => println!("Cannot read {shown}: {e}"),
        Ok(Err(e)) => println!("{e}"),
        Err(e) => error!(error = %e, "Playback task failed"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let mut config = SkycastConfig::load_or_default(&config_file);
    args.apply(&mut config);

    // Tracing. Logs go to stderr so they stay out of the conversation.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    info!("Starting Skycast v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %config_file.display(), "Configuration loaded");

    // Storage.
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = config.db_path();
    let store = match Store::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            error!(path = %db_path.display(), error = %e, "Failed to open store");
            return Err(e.into());
        }
    };
    info!(path = %db_path.display(), "Store opened");

    // Collaborators.
    let backend = Arc::new(BackendClient::new(config.backend.clone()));
    info!(url = %config.backend.query_url(), "Weather backend configured");
    let speech = speech_bridge(&config, args.no_voice);
    let chat = Arc::new(ChatManager::new(
        store,
        backend,
        speech,
        ChatConfig::from(&config),
    )?);
    let recorder = Arc::new(RecordingController::new(
        Arc::new(CpalMicrophone::new(config.recording.clone())),
        &config.recording,
    ));
    let player = Arc::new(NarrationPlayer::new(Arc::new(CpalSpeaker::new())));

    for message in chat.messages() {
        println!("{}", render(&message));
    }
    println!("(type /help for commands)");
    tokio::spawn(print_log(Arc::clone(&chat)));

    // === Chat loop ===

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Ask(text) => {
                let chat = Arc::clone(&chat);
                tokio::spawn(async move { report_submission(chat.submit_text(&text).await) });
            }
            Command::Voice(path) => match AudioBlob::from_file(&path) {
                Ok(blob) => {
                    let chat = Arc::clone(&chat);
                    tokio::spawn(async move { report_submission(chat.submit_voice(&blob).await) });
                }
                Err(e) => println!("Cannot read {}: {}", path.display(), e),
            },
            Command::Record => {
                if let Some(reason) = record_blocked(chat.is_busy(), recorder.is_recording()) {
                    println!("{reason}");
                    continue;
                }
                match recorder.start().await {
                    Ok(()) => println!("Recording... type /stop to send it."),
                    Err(SkycastError::Permission(reason)) => {
                        println!("Microphone access is needed to record voice messages ({reason}).")
                    }
                    Err(e) => println!("Cannot start recording: {e}"),
                }
            }
            Command::Stop => {
                if !recorder.is_recording() {
                    println!("Not recording. Type /record first.");
                    continue;
                }
                println!("Sending {} of audio...", recorder.format_elapsed());
                let chat = Arc::clone(&chat);
                let recorder = Arc::clone(&recorder);
                tokio::spawn(async move {
                    let result = recorder
                        .stop(move |blob| async move { chat.submit_voice(&blob).await })
                        .await;
                    report_submission(result);
                });
            }
            Command::Play(None) if player.is_playing() => {
                player.stop();
                println!("Playback stopped.");
            }
            Command::Play(n) => match narration(&chat.messages(), n) {
                Ok(path) => {
                    tokio::spawn(play_narration(Arc::clone(&player), path));
                }
                Err(reason) => println!("{reason}"),
            },
            Command::Clear => {
                chat.clear_history().await;
                println!("Conversation cleared.");
            }
            Command::History => {
                for message in chat.messages() {
                    println!("{}", render(&message));
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Invalid(reason) => println!("{reason}"),
            Command::Quit => break,
        }
    }

    player.stop();
    info!("Skycast exiting");
    Ok(())
}
