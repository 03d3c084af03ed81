pub mod playback;
pub mod settings;
pub mod stories;

use crate::error::StoryError;
use crate::events::Notification;
use crate::state::AppState;

/// Log a failed user action and surface it as a toast
pub(crate) fn report(state: &AppState, action: &str, err: &StoryError) -> Notification {
    tracing::error!("Failed to {}: {}", action, err);
    let notification = Notification::from_error(action, err);
    state.events.notify(notification.clone());
    notification
}
