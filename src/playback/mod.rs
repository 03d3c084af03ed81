pub mod format;
pub mod media;

use std::sync::{Arc, Mutex};

use serde::Serialize;

pub use format::format_position;
pub use media::{
    Listener, ListenerId, ListenerTable, MediaEvent, MediaEventKind, MediaHandle, MediaHost,
    Subscription,
};

use crate::backend::AudioFetcher;
use crate::error::{Result, StoryError};
use crate::events::{AppEvent, EventEmitter};

/// Engine lifecycle: `Empty -> Loading -> Ready <-> {Playing, Paused} -> Released`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Empty,
    Loading,
    Ready,
    Playing,
    Paused,
    Released,
}

impl PlaybackState {
    /// Audio is loaded and transport controls apply
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Ready | Self::Playing | Self::Paused)
    }
}

/// What the player shows: source, position and transport state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub source_url: Option<String>,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub is_playing: bool,
    pub state: PlaybackState,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            source_url: None,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            is_playing: false,
            state: PlaybackState::Empty,
        }
    }
}

impl PlaybackSession {
    pub fn progress(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            (self.position_seconds / self.duration_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn clamp_position(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.duration_seconds > 0.0 {
            seconds.min(self.duration_seconds)
        } else {
            seconds
        }
    }
}

/// Resolved audio locator for one story
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub url: String,
    /// Duration from the story metadata, used when the stream has none
    pub expected_duration: Option<f64>,
}

struct Attached {
    handle: Box<dyn MediaHandle>,
    subscription: Subscription,
}

/// Loads one story's audio at a time and keeps `PlaybackSession` in step
/// with the decoder.
pub struct PlaybackEngine {
    host: Box<dyn MediaHost>,
    fetcher: Arc<dyn AudioFetcher>,
    events: EventEmitter,
    session: Arc<Mutex<PlaybackSession>>,
    active: Option<Attached>,
}

impl PlaybackEngine {
    pub fn new(host: Box<dyn MediaHost>, fetcher: Arc<dyn AudioFetcher>, events: EventEmitter) -> Self {
        Self {
            host,
            fetcher,
            events,
            session: Arc::new(Mutex::new(PlaybackSession::default())),
            active: None,
        }
    }

    pub fn snapshot(&self) -> PlaybackSession {
        self.session.lock().unwrap().clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.session.lock().unwrap().state
    }

    /// Fetch, decode and start observing `source`. Any current session is
    /// detached first. On failure the engine is left `Empty`.
    pub async fn attach(&mut self, source: AudioSource) -> Result<()> {
        if self.active.is_some() {
            self.detach();
        }

        {
            let mut session = self.session.lock().unwrap();
            *session = PlaybackSession {
                source_url: Some(source.url.clone()),
                state: PlaybackState::Loading,
                ..PlaybackSession::default()
            };
        }
        self.emit_status();

        match self.load(&source).await {
            Ok(attached) => {
                self.active = Some(attached);
                let duration = self.session.lock().unwrap().duration_seconds;
                tracing::info!("Audio ready: {} ({})", source.url, format_position(duration));
                Ok(())
            }
            Err(e) => {
                *self.session.lock().unwrap() = PlaybackSession::default();
                tracing::error!("Failed to load audio from {}: {}", source.url, e);
                self.emit_status();
                Err(e)
            }
        }
    }

    async fn load(&self, source: &AudioSource) -> Result<Attached> {
        let bytes = self.fetcher.fetch_audio(&source.url).await?;
        let mut handle = self.host.open(bytes)?;
        let subscription = self.observe(handle.as_mut());

        let loaded = handle
            .load(source.expected_duration)
            .and_then(|()| match self.state() {
                PlaybackState::Ready => Ok(()),
                _ => Err(StoryError::decode("no duration reported for audio")),
            });

        if let Err(e) = loaded {
            subscription.dispose(handle.as_mut());
            handle.release();
            return Err(e);
        }

        Ok(Attached {
            handle,
            subscription,
        })
    }

    fn observe(&self, handle: &mut dyn MediaHandle) -> Subscription {
        let mut subscription = Subscription::new();

        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        subscription.push(handle.add_listener(
            MediaEventKind::Ended,
            Box::new(move |_| {
                let snapshot = {
                    let mut s = session.lock().unwrap();
                    s.state = PlaybackState::Paused;
                    s.is_playing = false;
                    s.position_seconds = 0.0;
                    s.clone()
                };
                events.emit(AppEvent::PlaybackStatus { snapshot });
            }),
        ));

        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        subscription.push(handle.add_listener(
            MediaEventKind::TimeUpdate,
            Box::new(move |event| {
                let MediaEvent::TimeUpdate(position) = event else {
                    return;
                };
                let snapshot = {
                    let mut s = session.lock().unwrap();
                    if !s.state.is_loaded() {
                        return;
                    }
                    s.position_seconds = s.clamp_position(position);
                    s.clone()
                };
                events.emit(AppEvent::PlaybackStatus { snapshot });
            }),
        ));

        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        subscription.push(handle.add_listener(
            MediaEventKind::LoadedMetadata,
            Box::new(move |event| {
                let MediaEvent::LoadedMetadata { duration } = event else {
                    return;
                };
                if !duration.is_finite() || duration <= 0.0 {
                    return;
                }
                let snapshot = {
                    let mut s = session.lock().unwrap();
                    s.duration_seconds = duration;
                    if s.state == PlaybackState::Loading {
                        s.state = PlaybackState::Ready;
                        s.position_seconds = 0.0;
                    }
                    s.clone()
                };
                events.emit(AppEvent::PlaybackStatus { snapshot });
            }),
        ));

        subscription
    }

    /// Play when paused, pause when playing. No-op until audio is ready.
    pub fn toggle(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        let state = self.session.lock().unwrap().state;
        let next = match state {
            PlaybackState::Ready | PlaybackState::Paused => {
                active.handle.play()?;
                PlaybackState::Playing
            }
            PlaybackState::Playing => {
                active.handle.pause();
                PlaybackState::Paused
            }
            _ => return Ok(()),
        };

        {
            let mut s = self.session.lock().unwrap();
            s.state = next;
            s.is_playing = next == PlaybackState::Playing;
        }
        tracing::debug!("Playback {:?} -> {:?}", state, next);
        self.emit_status();
        Ok(())
    }

    /// Jump to `fraction` of the track, as clicked on the progress bar.
    /// Returns the new position; the next time update replaces it with the
    /// decoder's own.
    pub fn seek(&mut self, fraction: f64) -> Result<f64> {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };

        let (state, duration, position) = {
            let s = self.session.lock().unwrap();
            (s.state, s.duration_seconds, s.position_seconds)
        };
        let Some(active) = self.active.as_mut() else {
            return Ok(position);
        };
        if !state.is_loaded() {
            return Ok(position);
        }

        let target = fraction * duration;
        active.handle.seek(target)?;
        self.session.lock().unwrap().position_seconds = target;
        self.emit_status();
        Ok(target)
    }

    /// Stop playback, remove every observer and free the decoded audio
    pub fn detach(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.handle.pause();
            let removed = active.subscription.dispose(active.handle.as_mut());
            active.handle.release();
            tracing::debug!("Playback detached ({} observers removed)", removed);
        }

        {
            let mut s = self.session.lock().unwrap();
            s.state = PlaybackState::Released;
            s.is_playing = false;
        }
        self.emit_status();
    }

    fn emit_status(&self) {
        let snapshot = self.snapshot();
        self.events.emit(AppEvent::PlaybackStatus { snapshot });
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct StaticFetcher {
        fail: bool,
    }

    #[async_trait]
    impl AudioFetcher for StaticFetcher {
        async fn fetch_audio(&self, url: &str) -> Result<Bytes> {
            if self.fail {
                return Err(StoryError::Backend { status: 404, body: url.to_string() });
            }
            Ok(Bytes::from_static(b"ID3fake"))
        }
    }

    #[derive(Default)]
    struct FakeMedia {
        listeners: ListenerTable,
        duration: Option<f64>,
        playing: bool,
        position: f64,
        released: bool,
        opened: usize,
    }

    /// Media host whose handles share state with the test
    #[derive(Clone, Default)]
    struct FakeHost {
        media: Arc<Mutex<FakeMedia>>,
        undecodable: bool,
    }

    impl FakeHost {
        fn with_duration(duration: Option<f64>) -> Self {
            let host = Self::default();
            host.media.lock().unwrap().duration = duration;
            host
        }

        fn emit(&self, event: MediaEvent) {
            self.media.lock().unwrap().listeners.dispatch(event);
        }

        fn listener_count(&self) -> usize {
            self.media.lock().unwrap().listeners.len()
        }
    }

    impl MediaHost for FakeHost {
        fn open(&self, _bytes: Bytes) -> Result<Box<dyn MediaHandle>> {
            if self.undecodable {
                return Err(StoryError::decode("unsupported format"));
            }
            let mut media = self.media.lock().unwrap();
            media.opened += 1;
            media.released = false;
            media.position = 0.0;
            Ok(Box::new(FakeHandle {
                media: Arc::clone(&self.media),
            }))
        }
    }

    struct FakeHandle {
        media: Arc<Mutex<FakeMedia>>,
    }

    impl MediaHandle for FakeHandle {
        fn add_listener(&mut self, kind: MediaEventKind, listener: Listener) -> ListenerId {
            self.media.lock().unwrap().listeners.add(kind, listener)
        }

        fn remove_listener(&mut self, id: ListenerId) -> bool {
            self.media.lock().unwrap().listeners.remove(id)
        }

        fn load(&mut self, expected_duration: Option<f64>) -> Result<()> {
            let mut media = self.media.lock().unwrap();
            if let Some(duration) = media.duration.or(expected_duration) {
                media.listeners.dispatch(MediaEvent::LoadedMetadata { duration });
            }
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            self.media.lock().unwrap().playing = true;
            Ok(())
        }

        fn pause(&mut self) {
            self.media.lock().unwrap().playing = false;
        }

        fn seek(&mut self, seconds: f64) -> Result<()> {
            self.media.lock().unwrap().position = seconds;
            Ok(())
        }

        fn release(&mut self) {
            let mut media = self.media.lock().unwrap();
            media.playing = false;
            media.released = true;
        }
    }

    fn source() -> AudioSource {
        AudioSource {
            url: "http://localhost/stories/7/audio".into(),
            expected_duration: None,
        }
    }

    fn engine_with(host: &FakeHost) -> PlaybackEngine {
        PlaybackEngine::new(
            Box::new(host.clone()),
            Arc::new(StaticFetcher { fail: false }),
            EventEmitter::disabled(),
        )
    }

    async fn ready_engine(host: &FakeHost) -> PlaybackEngine {
        let mut engine = engine_with(host);
        engine.attach(source()).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn attach_reaches_ready_with_duration() {
        let host = FakeHost::with_duration(Some(200.0));
        let engine = ready_engine(&host).await;

        let s = engine.snapshot();
        assert_eq!(s.state, PlaybackState::Ready);
        assert_eq!(s.duration_seconds, 200.0);
        assert_eq!(s.position_seconds, 0.0);
        assert!(!s.is_playing);
        assert_eq!(s.source_url.as_deref(), Some("http://localhost/stories/7/audio"));
        assert_eq!(host.listener_count(), 3);
    }

    #[tokio::test]
    async fn metadata_falls_back_to_expected_duration() {
        let host = FakeHost::with_duration(None);
        let mut engine = engine_with(&host);
        engine
            .attach(AudioSource {
                expected_duration: Some(185.0),
                ..source()
            })
            .await
            .unwrap();

        assert_eq!(engine.snapshot().duration_seconds, 185.0);
    }

    #[tokio::test]
    async fn missing_duration_leaves_engine_empty_without_listeners() {
        let host = FakeHost::with_duration(None);
        let mut engine = engine_with(&host);

        let err = engine.attach(source()).await.unwrap_err();

        assert!(matches!(err, StoryError::Decode(_)));
        assert_eq!(engine.state(), PlaybackState::Empty);
        assert_eq!(host.listener_count(), 0);
        assert!(host.media.lock().unwrap().released);
    }

    #[tokio::test]
    async fn decode_failure_leaves_engine_empty() {
        let host = FakeHost {
            undecodable: true,
            ..FakeHost::with_duration(Some(10.0))
        };
        let mut engine = engine_with(&host);

        assert!(matches!(engine.attach(source()).await, Err(StoryError::Decode(_))));
        assert_eq!(engine.snapshot(), PlaybackSession::default());
    }

    #[tokio::test]
    async fn fetch_failure_leaves_engine_empty() {
        let host = FakeHost::with_duration(Some(10.0));
        let mut engine = PlaybackEngine::new(
            Box::new(host.clone()),
            Arc::new(StaticFetcher { fail: true }),
            EventEmitter::disabled(),
        );

        assert!(engine.attach(source()).await.is_err());
        assert_eq!(engine.state(), PlaybackState::Empty);
        assert_eq!(host.media.lock().unwrap().opened, 0);
    }

    #[tokio::test]
    async fn toggle_is_noop_before_ready() {
        let host = FakeHost::with_duration(Some(10.0));
        let mut engine = engine_with(&host);

        engine.toggle().unwrap();
        assert_eq!(engine.state(), PlaybackState::Empty);
        assert!(!host.media.lock().unwrap().playing);
    }

    #[tokio::test]
    async fn toggle_alternates_play_and_pause() {
        let host = FakeHost::with_duration(Some(10.0));
        let mut engine = ready_engine(&host).await;

        engine.toggle().unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(engine.snapshot().is_playing);
        assert!(host.media.lock().unwrap().playing);

        engine.toggle().unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!(!engine.snapshot().is_playing);
        assert!(!host.media.lock().unwrap().playing);
    }

    #[tokio::test]
    async fn seek_maps_fraction_and_clamps() {
        let host = FakeHost::with_duration(Some(200.0));
        let mut engine = ready_engine(&host).await;

        assert_eq!(engine.seek(0.5).unwrap(), 100.0);
        assert_eq!(engine.snapshot().position_seconds, 100.0);
        assert_eq!(host.media.lock().unwrap().position, 100.0);

        assert_eq!(engine.seek(1.2).unwrap(), 200.0);
        assert_eq!(engine.snapshot().position_seconds, 200.0);

        assert_eq!(engine.seek(-0.3).unwrap(), 0.0);
        assert_eq!(engine.snapshot().position_seconds, 0.0);

        assert_eq!(engine.seek(f64::NAN).unwrap(), 0.0);
    }

    #[tokio::test]
    async fn time_update_overrides_optimistic_seek() {
        let host = FakeHost::with_duration(Some(200.0));
        let mut engine = ready_engine(&host).await;
        engine.toggle().unwrap();

        engine.seek(0.5).unwrap();
        host.emit(MediaEvent::TimeUpdate(42.0));
        assert_eq!(engine.snapshot().position_seconds, 42.0);

        host.emit(MediaEvent::TimeUpdate(500.0));
        assert_eq!(engine.snapshot().position_seconds, 200.0);
    }

    #[tokio::test]
    async fn ended_pauses_and_rewinds() {
        let host = FakeHost::with_duration(Some(30.0));
        let mut engine = ready_engine(&host).await;
        engine.toggle().unwrap();
        host.emit(MediaEvent::TimeUpdate(29.5));

        host.emit(MediaEvent::Ended);

        let s = engine.snapshot();
        assert_eq!(s.state, PlaybackState::Paused);
        assert!(!s.is_playing);
        assert_eq!(s.position_seconds, 0.0);

        engine.toggle().unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn detach_removes_observers() {
        let host = FakeHost::with_duration(Some(200.0));
        let mut engine = ready_engine(&host).await;
        engine.toggle().unwrap();
        host.emit(MediaEvent::TimeUpdate(12.0));

        engine.detach();

        assert_eq!(engine.state(), PlaybackState::Released);
        assert_eq!(host.listener_count(), 0);
        assert!(host.media.lock().unwrap().released);
        assert!(!host.media.lock().unwrap().playing);

        host.emit(MediaEvent::TimeUpdate(99.0));
        host.emit(MediaEvent::Ended);
        assert_eq!(engine.snapshot().position_seconds, 12.0);
        assert_eq!(engine.state(), PlaybackState::Released);

        engine.toggle().unwrap();
        assert_eq!(engine.state(), PlaybackState::Released);
    }

    #[tokio::test]
    async fn reattach_replaces_previous_session() {
        let host = FakeHost::with_duration(Some(60.0));
        let mut engine = ready_engine(&host).await;
        engine.seek(0.5).unwrap();

        engine
            .attach(AudioSource {
                url: "http://localhost/stories/8/audio".into(),
                expected_duration: None,
            })
            .await
            .unwrap();

        let s = engine.snapshot();
        assert_eq!(s.source_url.as_deref(), Some("http://localhost/stories/8/audio"));
        assert_eq!(s.position_seconds, 0.0);
        assert_eq!(host.listener_count(), 3);
        assert_eq!(host.media.lock().unwrap().opened, 2);
    }

    #[tokio::test]
    async fn dropping_engine_releases_audio() {
        let host = FakeHost::with_duration(Some(60.0));
        let engine = ready_engine(&host).await;

        drop(engine);

        assert_eq!(host.listener_count(), 0);
        assert!(host.media.lock().unwrap().released);
    }
}
