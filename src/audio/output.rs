use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::error::{Result, StoryError};
use crate::playback::{
    Listener, ListenerId, ListenerTable, MediaEvent, MediaEventKind, MediaHandle, MediaHost,
};
use crate::state::PlaybackSettings;

/// Names of the output devices on the default audio host
pub fn output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        }
    }
}

fn find_output_device(name: &str) -> Option<cpal::Device> {
    let host = cpal::default_host();
    host.output_devices()
        .ok()?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
}

fn decode(bytes: &Bytes) -> Result<Decoder<Cursor<Vec<u8>>>> {
    Decoder::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| StoryError::decode(format!("Failed to decode audio: {}", e)))
}

/// Plays decoded audio through a cpal output device via rodio
pub struct RodioHost {
    device_name: Option<String>,
    tick: Duration,
}

impl RodioHost {
    pub fn new(settings: &PlaybackSettings) -> Self {
        Self {
            device_name: settings.output_device.clone(),
            tick: Duration::from_millis(settings.position_update_ms.max(10)),
        }
    }

    fn open_stream(&self) -> Result<(OutputStream, OutputStreamHandle)> {
        if let Some(name) = &self.device_name {
            match find_output_device(name) {
                Some(device) => {
                    return OutputStream::try_from_device(&device).map_err(|e| {
                        StoryError::decode(format!("Failed to open output device '{}': {}", name, e))
                    });
                }
                None => tracing::warn!("Output device '{}' not found. Using default.", name),
            }
        }
        OutputStream::try_default()
            .map_err(|e| StoryError::decode(format!("No audio output device available: {}", e)))
    }
}

impl MediaHost for RodioHost {
    fn open(&self, bytes: Bytes) -> Result<Box<dyn MediaHandle>> {
        let decoder = decode(&bytes)?;
        let duration = decoder.total_duration().map(|d| d.as_secs_f64());

        let (stream, stream_handle) = self.open_stream()?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| StoryError::decode(format!("Failed to create audio sink: {}", e)))?;
        sink.pause();
        sink.append(decoder);

        tracing::debug!(
            "Audio decoded: {} bytes, duration {:?}",
            bytes.len(),
            duration
        );

        let sink = Arc::new(sink);
        let listeners = Arc::new(Mutex::new(ListenerTable::default()));
        let running = Arc::new(AtomicBool::new(true));
        let ticker = spawn_ticker(
            Arc::clone(&sink),
            Arc::clone(&listeners),
            Arc::clone(&running),
            self.tick,
        );

        Ok(Box::new(RodioHandle {
            _stream: stream,
            sink,
            bytes,
            duration,
            listeners,
            running,
            ticker: Some(ticker),
        }))
    }
}

/// Reports position while playing and end-of-stream once the sink drains
fn spawn_ticker(
    sink: Arc<Sink>,
    listeners: Arc<Mutex<ListenerTable>>,
    running: Arc<AtomicBool>,
    tick: Duration,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut ended = false;
        while running.load(Ordering::SeqCst) {
            std::thread::sleep(tick);
            if !running.load(Ordering::SeqCst) || sink.is_paused() {
                continue;
            }
            if sink.empty() {
                if !ended {
                    ended = true;
                    sink.pause();
                    listeners.lock().unwrap().dispatch(MediaEvent::Ended);
                }
                continue;
            }
            ended = false;
            let position = sink.get_pos().as_secs_f64();
            listeners.lock().unwrap().dispatch(MediaEvent::TimeUpdate(position));
        }
    })
}

pub struct RodioHandle {
    // Output stops when the stream is dropped
    _stream: OutputStream,
    sink: Arc<Sink>,
    bytes: Bytes,
    duration: Option<f64>,
    listeners: Arc<Mutex<ListenerTable>>,
    running: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
}

impl RodioHandle {
    /// Queue the track again after it has played to the end
    fn requeue_if_drained(&self) -> Result<()> {
        if self.sink.empty() {
            self.sink.append(decode(&self.bytes)?);
        }
        Ok(())
    }
}

impl MediaHandle for RodioHandle {
    fn add_listener(&mut self, kind: MediaEventKind, listener: Listener) -> ListenerId {
        self.listeners.lock().unwrap().add(kind, listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.lock().unwrap().remove(id)
    }

    fn load(&mut self, expected_duration: Option<f64>) -> Result<()> {
        if let Some(duration) = self.duration.or(expected_duration) {
            self.listeners
                .lock()
                .unwrap()
                .dispatch(MediaEvent::LoadedMetadata { duration });
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.requeue_if_drained()?;
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.requeue_if_drained()?;
        let target = Duration::from_secs_f64(if seconds.is_finite() { seconds.max(0.0) } else { 0.0 });
        self.sink
            .try_seek(target)
            .map_err(|e| StoryError::decode(format!("Seek failed: {}", e)))
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                tracing::error!("Playback ticker thread panicked");
            }
        }
        self.sink.stop();
        self.listeners.lock().unwrap().clear();
    }
}

impl Drop for RodioHandle {
    fn drop(&mut self) {
        if self.ticker.is_some() {
            self.release();
        }
    }
}
