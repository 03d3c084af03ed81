pub mod api;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use api::HttpBackend;

/// A story as returned by the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: u64,
    pub name: String,
    pub text: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// `created_at` as sent by the backend. Timestamps without an offset are UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub(super) fn parse(value: &str) -> Option<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

/// Body of `POST /generate-story`; `length` is in minutes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub context: String,
    pub voice: String,
    pub length: u32,
}

/// Remote text + audio generation service
#[async_trait]
pub trait StoryBackend: Send + Sync {
    async fn list_stories(&self) -> Result<Vec<StoryRecord>>;
    async fn generate_story(&self, request: &GenerationRequest) -> Result<StoryRecord>;
    async fn get_story(&self, id: &str) -> Result<StoryRecord>;
    /// Locator of the audio resource for a story
    fn audio_url(&self, id: &str) -> String;
}

/// Raw audio download, used by the playback engine
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch_audio(&self, url: &str) -> Result<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_record(created_at: &str) -> serde_json::Result<StoryRecord> {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "Tides",
            "text": "The moon pulls.",
            "created_at": created_at,
            "duration_seconds": 60
        }))
    }

    #[test]
    fn timestamps_without_offset_are_utc() {
        let expected: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(parse_record("2024-01-01T00:00:00").unwrap().created_at, expected);
        assert_eq!(parse_record("2024-01-01 00:00:00").unwrap().created_at, expected);
        assert_eq!(parse_record("2024-01-01T02:00:00+02:00").unwrap().created_at, expected);

        let micros = parse_record("2024-01-01T00:00:00.250000").unwrap().created_at;
        assert_eq!(micros.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        assert!(parse_record("yesterday").is_err());
    }
}
