use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::StoryError;
use crate::playback::PlaybackSession;
use crate::session::Artifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// User-facing message, rendered as a toast by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }

    /// Error toast for a failed user action. `action` reads like "generate story".
    pub fn from_error(action: &str, err: &StoryError) -> Self {
        let description = match err {
            StoryError::Validation(msg) => format!("Please complete the form: {}.", msg),
            StoryError::GenerationInProgress => {
                "A story is already being created. Please wait for it to finish.".to_string()
            }
            StoryError::Decode(_) => format!("Failed to {}: the audio could not be loaded.", action),
            _ => format!("Failed to {}. Please try again.", action),
        };
        Self::error(description)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AppEvent {
    StoriesChanged { stories: Vec<Artifact> },
    GenerationStatus { in_flight: Option<String> },
    PlaybackStatus { snapshot: PlaybackSession },
    Notification { notification: Notification },
}

/// Pushes state changes to the presentation layer. Sends never block and
/// are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: Option<UnboundedSender<AppEvent>>,
}

impl EventEmitter {
    pub fn channel() -> (Self, UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: AppEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn notify(&self, notification: Notification) {
        self.emit(AppEvent::Notification { notification });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_failures_get_generic_retry_message() {
        let err = StoryError::Backend { status: 502, body: "bad gateway".into() };
        let n = Notification::from_error("generate story", &err);
        assert_eq!(n.title, "Error");
        assert_eq!(n.description, "Failed to generate story. Please try again.");
        assert_eq!(n.variant, NotificationVariant::Destructive);
    }

    #[tokio::test]
    async fn emitter_delivers_in_order() {
        let (events, mut rx) = EventEmitter::channel();
        events.emit(AppEvent::GenerationStatus { in_flight: Some("pending-1".into()) });
        events.notify(Notification::info("Done", "Story ready"));

        assert!(matches!(
            rx.recv().await,
            Some(AppEvent::GenerationStatus { in_flight: Some(_) })
        ));
        assert!(matches!(rx.recv().await, Some(AppEvent::Notification { .. })));
    }

    #[test]
    fn disabled_emitter_is_silent() {
        EventEmitter::disabled().notify(Notification::error("ignored"));
    }
}
