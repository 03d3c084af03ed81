pub mod audio;
pub mod backend;
pub mod commands;
pub mod error;
pub mod events;
pub mod library;
pub mod persistence;
pub mod playback;
pub mod session;
pub mod shell;
pub mod state;

use std::sync::Arc;

use anyhow::Result;

use audio::RodioHost;
use backend::HttpBackend;
use events::EventEmitter;
use library::{ArtifactStore, JsonFileStore, MemoryStore};
use playback::PlaybackEngine;
use session::SessionManager;
use state::AppState;

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt::init();

    tracing::info!("Starting Story Narrator v{}", env!("CARGO_PKG_VERSION"));

    let settings_path = persistence::settings_path()?;
    let settings = persistence::load_settings(&settings_path).with_env_overrides();
    tracing::info!("Settings loaded (backend: {})", settings.backend.base_url);

    let (events, event_rx) = EventEmitter::channel();
    let backend = Arc::new(HttpBackend::new(&settings.backend)?);

    let stories_path = match settings.storage.stories_path.clone() {
        Some(path) => Ok(path),
        None => library::stories_path(),
    };
    let store: Arc<dyn ArtifactStore> = match stories_path {
        Ok(path) => {
            tracing::info!("Stories stored at {}", path.display());
            Arc::new(JsonFileStore::new(path))
        }
        Err(e) => {
            tracing::warn!("{}. Stories will only be kept for this session.", e);
            Arc::new(MemoryStore::new())
        }
    };

    let sessions = Arc::new(SessionManager::new(backend.clone(), store, events.clone()));
    let restored = sessions.init();
    tracing::info!("Restored {} stories from disk", restored);

    let engine = PlaybackEngine::new(
        Box::new(RodioHost::new(&settings.playback)),
        backend.clone(),
        events.clone(),
    );
    let state = AppState::new(sessions, backend, settings, events);

    // A failed refresh is already reported; the stored list stays usable
    let _ = commands::stories::load_stories(&state).await;

    shell::run(state, engine, event_rx, settings_path).await?;

    tracing::info!("Story Narrator stopped");
    Ok(())
}
