use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;

use super::{AudioFetcher, GenerationRequest, StoryBackend, StoryRecord};
use crate::error::{Result, StoryError};
use crate::state::BackendSettings;

const USER_AGENT: &str = "StoryNarrator/0.1";
const AUDIO_MIME: &str = "audio/mpeg";

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_s))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turns a non-success status into `StoryError::Backend`, keeping the body for the log
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!("Backend request to {} failed with {}: {}", url, status, body);
    Err(StoryError::Backend {
        status: status.as_u16(),
        body,
    })
}

/// Parses a successful response body. Transport failures stay `Network`.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let url = resp.url().to_string();
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!("Unexpected response from {}: {}", url, e);
        StoryError::InvalidResponse(e.to_string())
    })
}

#[async_trait]
impl StoryBackend for HttpBackend {
    async fn list_stories(&self) -> Result<Vec<StoryRecord>> {
        let resp = self.client.get(self.url("/stories")).send().await?;
        let stories: Vec<StoryRecord> = read_json(check_status(resp).await?).await?;
        tracing::debug!("Fetched {} stories", stories.len());
        Ok(stories)
    }

    async fn generate_story(&self, request: &GenerationRequest) -> Result<StoryRecord> {
        tracing::info!(
            "Requesting story generation (voice: {}, length: {} min)",
            request.voice,
            request.length
        );
        let resp = self
            .client
            .post(self.url("/generate-story"))
            .json(request)
            .send()
            .await?;
        let story: StoryRecord = read_json(check_status(resp).await?).await?;
        Ok(story)
    }

    async fn get_story(&self, id: &str) -> Result<StoryRecord> {
        let resp = self
            .client
            .get(self.url(&format!("/stories/{}", id)))
            .send()
            .await?;
        let story: StoryRecord = read_json(check_status(resp).await?).await?;
        Ok(story)
    }

    fn audio_url(&self, id: &str) -> String {
        self.url(&format!("/stories/{}/audio", id))
    }
}

#[async_trait]
impl AudioFetcher for HttpBackend {
    async fn fetch_audio(&self, url: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, AUDIO_MIME)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let total_size = resp.content_length().unwrap_or(0);
        let mut buf = BytesMut::with_capacity(total_size as usize);
        let mut stream = resp.bytes_stream();
        let start_time = Instant::now();

        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }

        if buf.is_empty() {
            return Err(StoryError::decode(format!("empty audio body from {}", url)));
        }

        tracing::info!(
            "Audio fetched: {} ({} bytes in {:.2}s)",
            url,
            buf.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(buf.freeze())
    }
}
