use crate::error::StoryError;
use crate::events::Notification;
use crate::playback::{AudioSource, PlaybackEngine, PlaybackSession};
use crate::session::Selection;
use crate::state::AppState;

use super::report;

/// Show the player for a story: resolve its audio and attach the engine
pub async fn open_story(
    state: &AppState,
    engine: &mut PlaybackEngine,
    id: &str,
) -> Result<PlaybackSession, Notification> {
    let story = match state.sessions.select(id) {
        Selection::Open(story) => story,
        Selection::Pending => {
            return Err(Notification::info(
                "Still generating",
                "This story is not ready yet.",
            ))
        }
        Selection::NotFound => return Err(Notification::error("Story not found")),
    };

    let expected_duration = match state.backend.get_story(&story.id).await {
        Ok(record) => record.duration_seconds,
        Err(e) => {
            tracing::warn!(
                "Failed to fetch metadata for story {}: {}. Using stored duration.",
                story.id,
                e
            );
            story.audio_duration
        }
    };

    let source = AudioSource {
        url: state.backend.audio_url(&story.id),
        expected_duration: (expected_duration > 0.0).then_some(expected_duration),
    };

    engine
        .attach(source)
        .await
        .map_err(|e| report(state, "load audio", &e))?;
    Ok(engine.snapshot())
}

pub fn toggle_playback(
    state: &AppState,
    engine: &mut PlaybackEngine,
) -> Result<PlaybackSession, Notification> {
    engine
        .toggle()
        .map_err(|e| report(state, "play audio", &e))?;
    Ok(engine.snapshot())
}

/// `fraction` is the click position on the progress bar, 0.0 to 1.0
pub fn seek_playback(
    state: &AppState,
    engine: &mut PlaybackEngine,
    fraction: f64,
) -> Result<PlaybackSession, Notification> {
    engine
        .seek(fraction)
        .map_err(|e| report(state, "seek", &e))?;
    Ok(engine.snapshot())
}

pub fn close_player(engine: &mut PlaybackEngine) -> PlaybackSession {
    engine.detach();
    engine.snapshot()
}

pub fn playback_status(engine: &PlaybackEngine) -> PlaybackSession {
    engine.snapshot()
}

/// Parse a progress-bar click given as a fraction or a percentage (`"40%"`)
pub fn parse_fraction(input: &str) -> Result<f64, StoryError> {
    let input = input.trim();
    let (number, scale) = match input.strip_suffix('%') {
        Some(pct) => (pct, 100.0),
        None => (input, 1.0),
    };
    number
        .trim()
        .parse::<f64>()
        .map(|v| v / scale)
        .map_err(|_| StoryError::Validation(format!("invalid seek position '{}'", input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractions_and_percentages() {
        assert_eq!(parse_fraction("0.25").unwrap(), 0.25);
        assert_eq!(parse_fraction(" 40% ").unwrap(), 0.4);
        assert_eq!(parse_fraction("120%").unwrap(), 1.2);
        assert!(parse_fraction("half").is_err());
    }
}
