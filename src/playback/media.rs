use bytes::Bytes;

use crate::error::Result;

pub type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaEventKind {
    TimeUpdate,
    Ended,
    LoadedMetadata,
}

/// Notifications a media handle delivers to its observers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    /// Current decoder position in seconds
    TimeUpdate(f64),
    Ended,
    LoadedMetadata { duration: f64 },
}

impl MediaEvent {
    pub fn kind(&self) -> MediaEventKind {
        match self {
            MediaEvent::TimeUpdate(_) => MediaEventKind::TimeUpdate,
            MediaEvent::Ended => MediaEventKind::Ended,
            MediaEvent::LoadedMetadata { .. } => MediaEventKind::LoadedMetadata,
        }
    }
}

pub type Listener = Box<dyn FnMut(MediaEvent) + Send>;

/// Observers registered on one handle, keyed by id
#[derive(Default)]
pub struct ListenerTable {
    next_id: ListenerId,
    listeners: Vec<(ListenerId, MediaEventKind, Listener)>,
}

impl ListenerTable {
    pub fn add(&mut self, kind: MediaEventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        self.listeners.push((self.next_id, kind, listener));
        self.next_id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn dispatch(&mut self, event: MediaEvent) {
        let kind = event.kind();
        for (_, _, listener) in self.listeners.iter_mut().filter(|(_, k, _)| *k == kind) {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Decodes fetched audio into something playable
pub trait MediaHost {
    fn open(&self, bytes: Bytes) -> Result<Box<dyn MediaHandle>>;
}

/// A decoded audio resource, owned by exactly one playback session
pub trait MediaHandle {
    fn add_listener(&mut self, kind: MediaEventKind, listener: Listener) -> ListenerId;
    fn remove_listener(&mut self, id: ListenerId) -> bool;
    /// Report `LoadedMetadata` once the duration is known. `expected_duration`
    /// is used when the stream itself does not carry one.
    fn load(&mut self, expected_duration: Option<f64>) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64) -> Result<()>;
    /// Stop output and free the decoded resource. The handle is unusable afterwards.
    fn release(&mut self);
}

/// Every observer registered for one session. `dispose` consumes it, so
/// each observer is removed exactly once.
#[must_use = "observers stay attached until the subscription is disposed"]
#[derive(Debug, Default)]
pub struct Subscription {
    ids: Vec<ListenerId>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: ListenerId) {
        self.ids.push(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns how many observers were still registered
    pub fn dispose(self, handle: &mut dyn MediaHandle) -> usize {
        self.ids
            .into_iter()
            .filter(|id| handle.remove_listener(*id))
            .count()
    }
}
