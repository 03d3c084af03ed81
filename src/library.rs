use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::session::Artifact;

/// Durable story list. Every write replaces the whole list.
pub trait ArtifactStore: Send + Sync {
    /// `None` when nothing has been stored yet
    fn load(&self) -> Result<Option<Vec<Artifact>>>;
    fn save_all(&self, stories: &[Artifact]) -> Result<()>;
}

/// Default location of the stories file
pub fn stories_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot find application data directory"))?;
    Ok(data_dir.join("StoryNarrator").join("stories.json"))
}

/// Story list kept as a single JSON document on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ArtifactStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Artifact>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let stories: Vec<Artifact> = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(stories))
    }

    fn save_all(&self, stories: &[Artifact]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create stories directory")?;
        }
        let data = serde_json::to_string_pretty(stories)?;
        // The file on disk is always a complete list
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// In-process store, for tests and runs without a data directory
#[derive(Default)]
pub struct MemoryStore {
    stories: Mutex<Option<Vec<Artifact>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stories(stories: Vec<Artifact>) -> Self {
        Self {
            stories: Mutex::new(Some(stories)),
        }
    }
}

impl ArtifactStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<Artifact>>> {
        Ok(self.stories.lock().unwrap().clone())
    }

    fn save_all(&self, stories: &[Artifact]) -> Result<()> {
        *self.stories.lock().unwrap() = Some(stories.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StoryRecord;

    fn record(id: u64, name: &str) -> StoryRecord {
        StoryRecord {
            id,
            name: name.into(),
            text: "Line one.\nLine two.".into(),
            created_at: "2024-01-01T00:00:00.123456Z".parse().unwrap(),
            duration_seconds: 185.5,
        }
    }

    #[test]
    fn missing_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("stories.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("stories.json"));
        let stories: Vec<Artifact> = vec![record(7, "Black Holes"), record(3, "Tides")]
            .into_iter()
            .map(Artifact::from)
            .collect();

        store.save_all(&stories).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded, stories);
        assert_eq!(loaded[0].created_at, stories[0].created_at);
    }

    #[test]
    fn durations_survive_at_full_precision() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("stories.json"));
        let durations = [58.261112000000004, 0.1 + 0.2, 3599.9999999999995, 1.0 / 3.0];
        let stories: Vec<Artifact> = durations
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let mut r = record(i as u64, "Precise");
                r.duration_seconds = d;
                Artifact::from(r)
            })
            .collect();

        store.save_all(&stories).unwrap();
        let loaded = store.load().unwrap().unwrap();

        for (story, expected) in loaded.iter().zip(durations) {
            assert_eq!(story.audio_duration.to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stories.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::new(path).load().is_err());
    }
}
