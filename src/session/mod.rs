pub mod artifact;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

pub use artifact::{Artifact, ArtifactStatus, StoryLength, StorySettings};

use crate::backend::{GenerationRequest, StoryBackend};
use crate::error::{Result, StoryError};
use crate::events::{AppEvent, EventEmitter};
use crate::library::ArtifactStore;

const TEMP_ID_PREFIX: &str = "pending-";

/// Outcome of selecting a story from the list
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Still generating, nothing to open yet
    Pending,
    Open(Artifact),
    NotFound,
}

#[derive(Debug, Default)]
struct SessionState {
    stories: Vec<Artifact>,
    in_flight: Option<String>,
    last_temp_id: u64,
}

impl SessionState {
    fn mint_temp_id(&mut self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis().max(0) as u64;
        let n = millis.max(self.last_temp_id + 1);
        self.last_temp_id = n;
        format!("{}{}", TEMP_ID_PREFIX, n)
    }
}

fn temp_id_value(id: &str) -> Option<u64> {
    id.strip_prefix(TEMP_ID_PREFIX)?.parse().ok()
}

/// Owns the story list: optimistic placeholders, reconciliation with the
/// backend, and persistence of every change.
pub struct SessionManager {
    backend: Arc<dyn StoryBackend>,
    store: Arc<dyn ArtifactStore>,
    events: EventEmitter,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn StoryBackend>,
        store: Arc<dyn ArtifactStore>,
        events: EventEmitter,
    ) -> Self {
        Self {
            backend,
            store,
            events,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Read the persisted list. Returns the number of stories restored.
    pub fn init(&self) -> usize {
        let stories = match self.store.load() {
            Ok(Some(stories)) => stories,
            Ok(None) => {
                tracing::info!("No stored stories found. Starting with an empty list.");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("Failed to load stored stories: {:#}. Starting with an empty list.", e);
                Vec::new()
            }
        };

        for stale in stories.iter().filter(|s| s.is_pending()) {
            tracing::warn!(
                "Story '{}' was still generating when the app closed and cannot be resumed",
                stale.title
            );
        }

        let mut state = self.state.lock().unwrap();
        state.last_temp_id = stories
            .iter()
            .filter_map(|s| temp_id_value(&s.id))
            .max()
            .unwrap_or(0);
        state.stories = stories;
        state.stories.len()
    }

    pub fn snapshot(&self) -> Vec<Artifact> {
        self.state.lock().unwrap().stories.clone()
    }

    /// Temporary id of the generation currently running, if any
    pub fn in_flight(&self) -> Option<String> {
        self.state.lock().unwrap().in_flight.clone()
    }

    pub fn is_generating(&self) -> bool {
        self.state.lock().unwrap().in_flight.is_some()
    }

    pub fn find(&self, id: &str) -> Option<Artifact> {
        self.state
            .lock()
            .unwrap()
            .stories
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn select(&self, id: &str) -> Selection {
        let state = self.state.lock().unwrap();
        if state.in_flight.as_deref() == Some(id) {
            return Selection::Pending;
        }
        match state.stories.iter().find(|s| s.id == id) {
            Some(story) if story.is_pending() => Selection::Pending,
            Some(story) => Selection::Open(story.clone()),
            None => Selection::NotFound,
        }
    }

    /// Insert a placeholder for `settings` and return the handle that drives
    /// the backend call. The placeholder is visible and persisted on return.
    /// Placeholders left over from an earlier run are removed first.
    pub fn begin(self: &Arc<Self>, settings: StorySettings) -> Result<Generation> {
        let request = settings.normalize()?;

        let temp_id = {
            let mut state = self.state.lock().unwrap();
            if state.in_flight.is_some() {
                return Err(StoryError::GenerationInProgress);
            }
            let before = state.stories.len();
            state.stories.retain(|s| !s.is_pending());
            let dropped = before - state.stories.len();
            if dropped > 0 {
                tracing::warn!("Removed {} abandoned placeholder(s) before starting a new story", dropped);
            }

            let now = Utc::now();
            let temp_id = state.mint_temp_id(now);
            let placeholder = Artifact::placeholder(temp_id.clone(), settings.clone(), now);
            state.stories.insert(0, placeholder);
            state.in_flight = Some(temp_id.clone());
            self.persist(&state.stories);
            temp_id
        };

        tracing::info!("Story generation started: {}", temp_id);
        self.notify_changed();

        Ok(Generation {
            manager: Arc::clone(self),
            temp_id,
            settings,
            request,
            settled: false,
        })
    }

    /// Generate a story and wait for the outcome
    pub async fn submit(self: &Arc<Self>, settings: StorySettings) -> Result<Artifact> {
        self.begin(settings)?.run().await
    }

    /// Replace the local list with the backend's. On failure the local list
    /// is left as it was.
    pub async fn load_all(&self) -> Result<Vec<Artifact>> {
        let records = self.backend.list_stories().await?;

        let mut seen = HashSet::new();
        let mut fetched: Vec<Artifact> = records
            .into_iter()
            .map(Artifact::from)
            .filter(|s| seen.insert(s.id.clone()))
            .collect();
        fetched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let stories = {
            let mut state = self.state.lock().unwrap();
            if let Some(temp_id) = state.in_flight.clone() {
                if let Some(placeholder) = state.stories.iter().find(|s| s.id == temp_id) {
                    fetched.insert(0, placeholder.clone());
                }
            }
            state.stories = fetched;
            self.persist(&state.stories);
            state.stories.clone()
        };

        tracing::info!("Loaded {} stories from backend", stories.len());
        self.notify_changed();
        Ok(stories)
    }

    fn reconcile(&self, temp_id: &str, story: &Artifact) {
        let mut state = self.state.lock().unwrap();
        state.stories.retain(|s| s.id != temp_id && s.id != story.id);
        state.stories.insert(0, story.clone());
        if state.in_flight.as_deref() == Some(temp_id) {
            state.in_flight = None;
        }
        self.persist(&state.stories);
    }

    fn rollback(&self, temp_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.stories.retain(|s| s.id != temp_id);
        if state.in_flight.as_deref() == Some(temp_id) {
            state.in_flight = None;
        }
        self.persist(&state.stories);
    }

    fn persist(&self, stories: &[Artifact]) {
        if let Err(e) = self.store.save_all(stories) {
            tracing::error!("Failed to save stories: {:#}", e);
        }
    }

    fn notify_changed(&self) {
        let (stories, in_flight) = {
            let state = self.state.lock().unwrap();
            (state.stories.clone(), state.in_flight.clone())
        };
        self.events.emit(AppEvent::StoriesChanged { stories });
        self.events.emit(AppEvent::GenerationStatus { in_flight });
    }
}

/// A generation whose placeholder is in the list. Dropping it before
/// `run` completes removes the placeholder.
pub struct Generation {
    manager: Arc<SessionManager>,
    temp_id: String,
    settings: StorySettings,
    request: GenerationRequest,
    settled: bool,
}

impl Generation {
    pub fn id(&self) -> &str {
        &self.temp_id
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub async fn run(mut self) -> Result<Artifact> {
        let result = self.manager.backend.generate_story(&self.request).await;
        self.settled = true;

        match result {
            Ok(record) => {
                let mut story = Artifact::from(record);
                story.settings = Some(self.settings.clone());
                self.manager.reconcile(&self.temp_id, &story);
                tracing::info!("Story generated: {} -> {} ('{}')", self.temp_id, story.id, story.title);
                self.manager.notify_changed();
                Ok(story)
            }
            Err(e) => {
                self.manager.rollback(&self.temp_id);
                tracing::error!("Story generation {} failed: {}", self.temp_id, e);
                self.manager.notify_changed();
                Err(e)
            }
        }
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Story generation {} abandoned, removing placeholder", self.temp_id);
            self.manager.rollback(&self.temp_id);
            self.manager.notify_changed();
        }
    }
}
