use crate::events::Notification;
use crate::session::{Artifact, Selection, StorySettings};
use crate::state::AppState;

use super::report;

/// Refresh the list from the backend
pub async fn load_stories(state: &AppState) -> Result<Vec<Artifact>, Notification> {
    state
        .sessions
        .load_all()
        .await
        .map_err(|e| report(state, "load stories", &e))
}

pub fn list_stories(state: &AppState) -> Vec<Artifact> {
    state.sessions.snapshot()
}

/// Temporary id of the story being generated, if any
pub fn generation_status(state: &AppState) -> Option<String> {
    state.sessions.in_flight()
}

/// Start generating a story in the background. Returns the placeholder id;
/// the outcome arrives as a notification and a list change.
pub fn submit_story(state: &AppState, settings: StorySettings) -> Result<String, Notification> {
    let generation = state
        .sessions
        .begin(settings)
        .map_err(|e| report(state, "generate story", &e))?;
    let temp_id = generation.id().to_string();
    let events = state.events.clone();

    tokio::spawn(async move {
        match generation.run().await {
            Ok(story) => {
                events.notify(Notification::info(
                    "Story ready",
                    format!("'{}' is ready to listen to.", story.title),
                ));
            }
            Err(e) => {
                tracing::error!("Failed to generate story: {}", e);
                events.notify(Notification::from_error("generate story", &e));
            }
        }
    });

    Ok(temp_id)
}

pub fn select_story(state: &AppState, id: &str) -> Selection {
    let selection = state.sessions.select(id);
    if selection == Selection::NotFound {
        tracing::warn!("Selected story not found: {}", id);
    }
    selection
}
