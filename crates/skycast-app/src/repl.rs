//! Terminal commands and message rendering.

use std::path::PathBuf;

use skycast_core::types::{Message, Sender};

/// Shown when input arrives while a submission is still running.
pub const BUSY_NOTICE: &str = "Still working on the previous message, please wait.";

pub const HELP: &str = "\
Type a question to ask about the weather, or:
  /voice <file>  send an audio file as a voice message
  /record        start recording from the microphone
  /stop          stop recording and send it
  /play [n]      play the latest (or nth) narrated reply, or stop playback
  /clear         clear the conversation and start a new session
  /history       show the whole conversation
  /help          show this help
  /quit          exit";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Voice(PathBuf),
    Record,
    Stop,
    /// Narrated reply to play, counted from 1. `None` means the latest.
    Play(Option<usize>),
    Clear,
    History,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Ask(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg) {
            ("voice", "") => Command::Invalid("usage: /voice <file>".to_string()),
            ("voice", path) => Command::Voice(PathBuf::from(path)),
            ("record", _) => Command::Record,
            ("stop", _) => Command::Stop,
            ("play", "") => Command::Play(None),
            ("play", n) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Command::Play(Some(n)),
                _ => Command::Invalid("usage: /play [n], where n counts narrated replies from 1".to_string()),
            },
            ("clear", _) => Command::Clear,
            ("history", _) => Command::History,
            ("help", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Invalid(format!("unknown command /{name}, try /help")),
        }
    }
}

/// Render one log entry for the terminal.
pub fn render(message: &Message) -> String {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Bot => "skycast",
    };
    let marker = if message.error { " (!)" } else { "" };
    let mut out = format!("{who}{marker}> {}", message.text);

    if let Some(weather) = &message.weather_data {
        let mut line: Vec<String> = Vec::new();
        if let Some(name) = &weather.name {
            line.push(name.clone());
        }
        line.extend(weather.temperature_label());
        line.extend(weather.description().map(str::to_string));
        line.extend(weather.humidity_label());
        line.extend(weather.wind_label());
        if !line.is_empty() {
            out.push_str("\n    ");
            out.push_str(&line.join(" | "));
        }
    }
    if let Some(audio) = &message.audio_url {
        out.push_str(&format!("\n    [audio] {audio}"));
    }
    out
}

/// Audio file of the nth narrated reply (from 1), or the latest one.
pub fn narration(log: &[Message], n: Option<usize>) -> Result<PathBuf, String> {
    let narrated: Vec<&str> = log
        .iter()
        .filter(|m| m.sender == Sender::Bot)
        .filter_map(|m| m.audio_url.as_deref())
        .collect();
    if narrated.is_empty() {
        return Err("No narrated replies yet.".to_string());
    }
    let picked = match n {
        None => narrated.last(),
        Some(n) => n.checked_sub(1).and_then(|i| narrated.get(i)),
    };
    picked.map(PathBuf::from).ok_or_else(|| {
        format!(
            "There is no narrated reply #{} ({} so far).",
            n.unwrap_or_default(),
            narrated.len()
        )
    })
}

/// Why `/record` cannot start right now, if it cannot.
pub fn record_blocked(chat_busy: bool, recording: bool) -> Option<&'static str> {
    if recording {
        Some("Already recording. Type /stop to send it.")
    } else if chat_busy {
        Some(BUSY_NOTICE)
    } else {
        None
    }
}

/// Entries of `current` not yet shown, given what was shown last time.
///
/// Entries are compared by value, so a replaced placeholder or a cleared
/// log is shown again from the first difference.
pub fn unseen<'a>(shown: &[Message], current: &'a [Message]) -> &'a [Message] {
    let common = shown
        .iter()
        .zip(current)
        .take_while(|(a, b)| a == b)
        .count();
    &current[common..]
}
