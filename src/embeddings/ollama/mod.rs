#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::EmbeddingProvider;
use crate::RagError;
use crate::config::EmbeddingConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const BACKOFF_START_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 8_000;

/// Embedding function served by an Ollama instance
///
/// All HTTP calls are blocking; the async `embed` moves them onto the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    model_id: String,
    batch_size: usize,
    dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TaggedModel>,
}

#[derive(Debug, Deserialize)]
struct TaggedModel {
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Transient,
    Fatal,
}

fn classify(error: &ureq::Error) -> Retry {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 => Retry::Transient,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Retry::Transient,
        _ => Retry::Fatal,
    }
}

/// Delay before retry number `attempt` (1-based), doubling up to a cap
fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_START_MS.saturating_mul(factor).min(BACKOFF_CAP_MS))
}

/// Ollama reports pulled models with an explicit tag; a bare name means `:latest`
fn same_model(configured: &str, served: &str) -> bool {
    fn with_tag(name: &str) -> String {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:latest")
        }
    }
    with_tag(configured) == with_tag(served)
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .embedding_url()
            .context("Invalid Ollama address in embedding config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            model_id: format!("ollama:{}:{}", config.model, config.dimension),
            batch_size: (config.batch_size as usize).max(1),
            dimension: config.dimension as usize,
            agent: Self::agent(REQUEST_TIMEOUT),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into()
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Check that the server answers and serves the configured model
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.validate_model()
            .with_context(|| format!("Ollama at {} failed the health check", self.base_url))?;
        info!("Ollama at {} serves {}", self.base_url, self.model);
        Ok(())
    }

    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let served = self.served_models()?;
        if served.iter().any(|name| same_model(&self.model, name)) {
            debug!("Model {} is available", self.model);
            return Ok(());
        }

        warn!("Model {} not found, server has {:?}", self.model, served);
        bail!(
            "Model '{}' is not pulled on the server. Available models: {:?}",
            self.model,
            served
        )
    }

    /// Names of the models the server has pulled
    #[inline]
    pub fn served_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/api/tags")?;
        let body = self
            .send_with_retry("list models", || {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })?;

        let tags: TagsResponse =
            serde_json::from_str(&body).context("Unexpected /api/tags response")?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }

    /// Embed `texts` in request-sized batches, preserving order
    #[inline]
    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            let embedded = self
                .embed_request(batch)
                .with_context(|| format!("Embedding batch {} ({} texts)", index + 1, batch.len()))?;
            vectors.extend(embedded);
        }
        debug!("Embedded {} texts with {}", vectors.len(), self.model);
        Ok(vectors)
    }

    fn embed_request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("/api/embed")?;
        let payload = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            input: batch,
        })
        .context("Failed to encode embed request")?;

        let body = self.send_with_retry("embed", || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse =
            serde_json::from_str(&body).context("Unexpected /api/embed response")?;
        self.check_embeddings(batch.len(), response.embeddings)
    }

    /// One vector per input, each of the configured width
    fn check_embeddings(&self, expected: usize, embeddings: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
        if embeddings.len() != expected {
            bail!(
                "Sent {} texts but received {} embeddings",
                expected,
                embeddings.len()
            );
        }
        if let Some(vector) = embeddings.iter().find(|v| v.len() != self.dimension) {
            bail!(
                "Model '{}' returned {} dimensions, expected {}",
                self.model,
                vector.len(),
                self.dimension
            );
        }
        Ok(embeddings)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Cannot build {path} from {}", self.base_url))
    }

    fn send_with_retry<F>(&self, operation: &str, mut send: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let error = match send() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            if classify(&error) == Retry::Fatal {
                warn!("{} failed without retry: {}", operation, error);
                return Err(anyhow!("{operation} request rejected: {error}"));
            }
            if attempt >= self.retry_attempts {
                error!(
                    "{} against {} failed after {} attempts: {}",
                    operation, self.base_url, attempt, error
                );
                return Err(anyhow!("{operation} request failed: {error}"));
            }

            let delay = backoff_delay(attempt);
            warn!(
                "{} attempt {}/{} failed ({}), retrying in {:?}",
                operation, attempt, self.retry_attempts, error, delay
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || client.embed_blocking(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {e}")))?
            .map_err(|e| RagError::Embedding(format!("{e:#}")))
    }
}
