use std::path::Path;

use crate::events::Notification;
use crate::state::{AppState, Settings};

pub fn get_settings(state: &AppState) -> Settings {
    state.settings.lock().unwrap().clone()
}

/// Store new settings. Backend and audio changes apply on next start.
pub fn update_settings(state: &AppState, path: &Path, settings: Settings) -> Result<(), Notification> {
    crate::persistence::save_settings(path, &settings).map_err(|e| {
        tracing::error!("Failed to save settings: {:#}", e);
        let notification = Notification::error("Failed to save settings. Please try again.");
        state.events.notify(notification.clone());
        notification
    })?;
    *state.settings.lock().unwrap() = settings;
    tracing::info!("Settings saved to {}", path.display());
    Ok(())
}

pub fn list_output_devices() -> Vec<String> {
    crate::audio::output_device_names()
}

pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
