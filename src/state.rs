use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::backend::StoryBackend;
use crate::events::EventEmitter;
use crate::session::SessionManager;

pub const API_URL_ENV: &str = "STORY_NARRATOR_API_URL";

/// Everything the commands act on
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub backend: Arc<dyn StoryBackend>,
    pub settings: Mutex<Settings>,
    pub events: EventEmitter,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionManager>,
        backend: Arc<dyn StoryBackend>,
        settings: Settings,
        events: EventEmitter,
    ) -> Self {
        Self {
            sessions,
            backend,
            settings: Mutex::new(settings),
            events,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Apply environment overrides on top of stored values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::info!("Using backend URL from {}: {}", API_URL_ENV, url);
                self.backend.base_url = url;
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub base_url: String,
    /// Generation of a long story can take several minutes
    pub request_timeout_s: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://0.0.0.0:8000".to_string(),
            request_timeout_s: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Output device name; `None` picks the system default
    #[serde(default)]
    pub output_device: Option<String>,
    pub position_update_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            output_device: None,
            position_update_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Stories file; defaults to the app data directory
    #[serde(default)]
    pub stories_path: Option<PathBuf>,
}
