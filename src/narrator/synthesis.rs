//! Speech synthesis client.
//!
//! The synthesis service takes `{ text, voiceId? }` and answers with binary
//! audio, or a non-success status with a JSON `{ error }` body.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SynthesisConfig;
use crate::error::{NarrationError, Result};

/// One paragraph to synthesize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(rename = "voiceId", skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, voice_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            voice_id,
        }
    }
}

/// Anything that can turn a paragraph into playable audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Synthesis over HTTP.
pub struct HttpSynthesizer {
    endpoint: String,
    api_key: String,
    max_retries: u32,
    retry_delay: Duration,
    client: Client,
}

impl HttpSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(NarrationError::Config(
                "synthesis.endpoint is not set".to_string(),
            ));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| NarrationError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            client,
        })
    }

    async fn request_once(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if !self.api_key.is_empty() {
            builder = builder
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NarrationError::synthesis(format!("TTS request timed out: {e}"))
            } else {
                NarrationError::synthesis(format!("TTS request failed: {e}"))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("TTS request failed: {}", status.as_u16()));
            return Err(NarrationError::synthesis_status(status.as_u16(), message));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| NarrationError::synthesis(format!("TTS response body failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let t_start = Instant::now();
        let mut attempt = 0;

        loop {
            match self.request_once(request).await {
                Ok(audio) => {
                    debug!(
                        "Synthesized {} chars -> {} bytes ({:.0}ms)",
                        request.text.len(),
                        audio.len(),
                        t_start.elapsed().as_secs_f64() * 1000.0
                    );
                    return Ok(audio);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!("{e}; retrying ({attempt}/{})", self.max_retries);
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keeps the most recent clips in memory, keyed by voice and text.
pub struct CachingSynthesizer {
    inner: Arc<dyn SpeechSynthesizer>,
    capacity: usize,
    clips: Mutex<ClipCache>,
}

#[derive(Default)]
struct ClipCache {
    entries: HashMap<SynthesisRequest, Arc<Vec<u8>>>,
    order: VecDeque<SynthesisRequest>,
}

impl CachingSynthesizer {
    pub fn new(inner: Arc<dyn SpeechSynthesizer>, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            clips: Mutex::new(ClipCache::default()),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.clips.lock().unwrap().entries.len()
    }
}

#[async_trait]
impl SpeechSynthesizer for CachingSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let cached = self.clips.lock().unwrap().entries.get(request).cloned();
        if let Some(clip) = cached {
            debug!("Clip cache hit ({} chars)", request.text.len());
            return Ok(clip.as_ref().clone());
        }

        let audio = self.inner.synthesize(request).await?;
        if self.capacity == 0 {
            return Ok(audio);
        }

        let mut cache = self.clips.lock().unwrap();
        if !cache.entries.contains_key(request) {
            while cache.order.len() >= self.capacity {
                if let Some(oldest) = cache.order.pop_front() {
                    cache.entries.remove(&oldest);
                }
            }
            cache.order.push_back(request.clone());
            cache.entries.insert(request.clone(), Arc::new(audio.clone()));
        }
        Ok(audio)
    }
}

/// Build the synthesizer described by the config.
pub fn create_synthesizer(config: &SynthesisConfig) -> Result<Arc<dyn SpeechSynthesizer>> {
    let http: Arc<dyn SpeechSynthesizer> = Arc::new(HttpSynthesizer::new(config)?);
    info!(
        "Synthesis endpoint: {} (timeout: {}, retries: {})",
        config.endpoint,
        config
            .request_timeout()
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "none".into()),
        config.max_retries
    );
    if config.cache_capacity > 0 {
        Ok(Arc::new(CachingSynthesizer::new(http, config.cache_capacity)))
    } else {
        Ok(http)
    }
}
