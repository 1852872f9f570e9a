//! Configuration management for niko-rs.
//!
//! Loads config from YAML files in standard locations. Every section and
//! field is optional; anything left out takes the default below.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::history::DEFAULT_MAX_ITEMS;
use crate::speech::SpeechBackend;
use crate::storage::default_state_path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub name: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Niko".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Chat server root, e.g. "https://niko.example.org". Empty means offline.
    pub base_url: String,
    /// Sent as `x-api-key` when there is no auth token.
    pub api_key: String,
    /// Sent as `Authorization: Bearer`.
    pub auth_token: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub enable_audio: bool,
    pub mode: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            auth_token: String::new(),
            connect_timeout_secs: 30,
            request_timeout_secs: 60,
            enable_audio: true,
            mode: "normal".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_items: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackend,
    pub command: String,
    pub args: Vec<String>,
    pub play_audio_clips: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::Console,
            command: "espeak-ng".into(),
            args: vec!["-v".into(), "tr".into()],
            play_audio_clips: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Check once at startup.
    pub enabled: bool,
    /// JSON document of the form `{"version": "x.y.z"}`.
    pub manifest_url: String,
    pub timeout_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            manifest_url: String::new(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub remote: RemoteConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    pub speech: SpeechConfig,
    pub update: UpdateConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/niko/config.yaml
    /// 3. /etc/niko/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/niko/config.yaml")),
                Some(PathBuf::from("/etc/niko/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(yaml: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(yaml)
    }
}
