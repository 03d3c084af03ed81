use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{GenerationRequest, StoryRecord};
use crate::error::{Result, StoryError};

/// Lifecycle of a story in the local list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pending,
    Ready,
}

/// A generated narrated story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub content: String,
    pub audio_duration: f64,
    pub created_at: DateTime<Utc>,
    pub status: ArtifactStatus,
    #[serde(default)]
    pub settings: Option<StorySettings>,
}

impl Artifact {
    /// Placeholder shown while the backend generates the story
    pub fn placeholder(id: String, settings: StorySettings, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: format!("Generating: {}", settings.context.trim()),
            content: String::new(),
            audio_duration: 0.0,
            created_at,
            status: ArtifactStatus::Pending,
            settings: Some(settings),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ArtifactStatus::Pending
    }

    /// Non-empty lines of the narration text
    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.content
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

impl From<StoryRecord> for Artifact {
    fn from(record: StoryRecord) -> Self {
        Self {
            id: record.id.to_string(),
            title: record.name,
            content: record.text,
            audio_duration: record.duration_seconds,
            created_at: record.created_at,
            status: ArtifactStatus::Ready,
            settings: None,
        }
    }
}

/// Target length of a generated story
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryLength {
    Short,
    Medium,
    Long,
}

impl StoryLength {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            _ => None,
        }
    }

    pub fn minutes(self) -> u32 {
        match self {
            Self::Short => 2,
            Self::Medium => 5,
            Self::Long => 10,
        }
    }
}

/// Generation parameters as entered in the form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySettings {
    pub context: String,
    pub voice: String,
    pub length: String,
}

impl StorySettings {
    pub fn new(
        context: impl Into<String>,
        voice: impl Into<String>,
        length: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            voice: voice.into(),
            length: length.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        [&self.context, &self.voice, &self.length]
            .iter()
            .all(|f| !f.trim().is_empty())
    }

    pub fn normalize(&self) -> Result<GenerationRequest> {
        if !self.is_complete() {
            return Err(StoryError::Validation(
                "context, voice and length are all required".into(),
            ));
        }
        let length = StoryLength::parse(&self.length).ok_or_else(|| {
            StoryError::Validation(format!("unknown story length '{}'", self.length))
        })?;

        Ok(GenerationRequest {
            context: self.context.trim().to_string(),
            voice: self.voice.trim().to_string(),
            length: length.minutes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_table_maps_to_minutes() {
        assert_eq!(StoryLength::parse("short").map(StoryLength::minutes), Some(2));
        assert_eq!(StoryLength::parse("Medium").map(StoryLength::minutes), Some(5));
        assert_eq!(StoryLength::parse(" long ").map(StoryLength::minutes), Some(10));
        assert_eq!(StoryLength::parse("epic"), None);
    }

    #[test]
    fn normalize_rejects_incomplete_settings() {
        let settings = StorySettings::new("black holes", "", "short");
        assert!(matches!(settings.normalize(), Err(StoryError::Validation(_))));

        let settings = StorySettings::new("black holes", "daniel", "forever");
        assert!(matches!(settings.normalize(), Err(StoryError::Validation(_))));
    }

    #[test]
    fn normalize_trims_fields() {
        let request = StorySettings::new("  black holes ", "daniel\n", "short")
            .normalize()
            .unwrap();
        assert_eq!(request.context, "black holes");
        assert_eq!(request.voice, "daniel");
        assert_eq!(request.length, 2);
    }

    #[test]
    fn paragraphs_skip_blank_lines() {
        let mut artifact = Artifact::placeholder(
            "pending-1".into(),
            StorySettings::new("stars", "daniel", "short"),
            Utc::now(),
        );
        artifact.content = "First.\n\n  Second.\n".into();
        assert_eq!(artifact.paragraphs().collect::<Vec<_>>(), vec!["First.", "Second."]);
    }
}
