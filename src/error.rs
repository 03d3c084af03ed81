use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoryError>;

/// Failures surfaced by the session manager and the playback engine.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("A story is already being generated")]
    GenerationInProgress,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Backend returned {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("Backend sent an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("Audio could not be loaded: {0}")]
    Decode(String),
}

impl StoryError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
