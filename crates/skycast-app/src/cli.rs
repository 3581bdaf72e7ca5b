//! CLI argument definitions for the Skycast binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use skycast_core::config::{expand_home, SkycastConfig};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SKYCAST_CONFIG";
/// Environment variable overriding `backend.base_url`.
pub const BACKEND_URL_ENV: &str = "SKYCAST_BACKEND_URL";

/// Skycast - chat with a weather assistant from the terminal.
#[derive(Parser, Debug, Default)]
#[command(name = "skycast", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the store and narrated audio.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Base URL of the weather backend.
    #[arg(short = 'b', long = "backend-url")]
    pub backend_url: Option<String>,

    /// Disable narration and voice messages.
    #[arg(long = "no-voice")]
    pub no_voice: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SKYCAST_CONFIG env var > ~/.skycast/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(p);
        }
        expand_home("~/.skycast/config.toml")
    }

    /// Apply flag and environment overrides to a loaded config.
    pub fn apply(&self, config: &mut SkycastConfig) {
        self.apply_with_env(config, std::env::var(BACKEND_URL_ENV).ok());
    }

    fn apply_with_env(&self, config: &mut SkycastConfig, env_backend_url: Option<String>) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        let backend_url = self
            .backend_url
            .clone()
            .or(env_backend_url.filter(|url| !url.trim().is_empty()));
        if let Some(url) = backend_url {
            config.backend.base_url = url;
        }
        if self.no_voice {
            config.voice.narrate = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "skycast",
            "--config",
            "/etc/skycast.toml",
            "-b",
            "http://weather.local:9000",
            "--no-voice",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/skycast.toml")));
        assert_eq!(args.backend_url.as_deref(), Some("http://weather.local:9000"));
        assert!(args.no_voice);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/skycast.toml"));
    }

    #[test]
    fn test_flag_beats_env_beats_file() {
        let mut config = SkycastConfig::default();
        config.backend.base_url = "http://from-file:8080".to_string();

        let args = CliArgs::default();
        args.apply_with_env(&mut config, Some("http://from-env:8080".to_string()));
        assert_eq!(config.backend.base_url, "http://from-env:8080");

        let args = CliArgs {
            backend_url: Some("http://from-flag:8080".to_string()),
            ..CliArgs::default()
        };
        args.apply_with_env(&mut config, Some("http://from-env:8080".to_string()));
        assert_eq!(config.backend.base_url, "http://from-flag:8080");
    }

    #[test]
    fn test_no_overrides_keeps_file_values() {
        let mut config = SkycastConfig::default();
        CliArgs::default().apply_with_env(&mut config, None);
        assert_eq!(config.backend.base_url, "http://localhost:8080");
        assert_eq!(config.general.log_level, "info");
        assert!(config.voice.narrate);
    }

    #[test]
    fn test_data_dir_and_log_level_overrides() {
        let mut config = SkycastConfig::default();
        let args = CliArgs {
            data_dir: Some(PathBuf::from("/var/lib/skycast")),
            log_level: Some("debug".to_string()),
            no_voice: true,
            ..CliArgs::default()
        };
        args.apply_with_env(&mut config, None);
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/skycast"));
        assert_eq!(config.general.log_level, "debug");
        assert!(!config.voice.narrate);
    }
}
