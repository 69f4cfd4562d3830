//! Network-backed embedding providers and provider dispatch.
//!
//! [`OpenAiEmbedder`] calls the OpenAI embeddings API with batching and
//! exponential backoff; [`create_embedder`] picks a provider from
//! configuration. The offline `hashed` provider lives in `folio-core`
//! so the core crate can test retrieval without HTTP.
//!
//! # Retry strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) retry.
//! - Other 4xx fail immediately.
//! - Network errors retry.
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use folio_core::embedding::{Embedder, HashEmbedder};
use folio_core::error::{Error, Result};

use crate::config::EmbeddingConfig;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Instantiate the embedding provider named by `config.provider`.
///
/// `"hashed"` needs no credentials; `"openai"` requires the
/// `OPENAI_API_KEY` environment variable. Unknown names are rejected by
/// config validation, but this dispatch re-checks so it is safe to call
/// with a hand-built config.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hashed" => Ok(Arc::new(HashEmbedder::new(config.dims)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(Error::config(format!(
            "unknown embedding provider '{}': must be hashed or openai",
            other
        ))),
    }
}

/// Embedding provider backed by `POST /v1/embeddings`.
///
/// Texts are sent in batches of `batch_size`; each batch is retried with
/// exponential backoff on transient failures. Every failure surfaces as
/// [`Error::Embedding`].
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// Build a provider from configuration.
    ///
    /// Fails with [`Error::Config`] when `model` is unset or
    /// `OPENAI_API_KEY` is missing from the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for openai provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::config("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model,
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            api_key,
            client,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, delay_secs = delay.as_secs(), "retrying embeddings request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(OPENAI_EMBEDDINGS_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            Error::Embedding(format!("invalid embeddings response: {}", e))
                        })?;
                        return self.parse_response(&json, batch.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Embedding(format!(
                            "embeddings API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error other than 429: retrying cannot help.
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(Error::Embedding(format!(
                        "embeddings API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::Embedding(format!("network error: {}", e)));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("embedding failed after retries".to_string())))
    }

    fn parse_response(&self, json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Embedding("response missing data array".to_string()))?;

        if data.len() != expected {
            return Err(Error::Embedding(format!(
                "response carries {} embeddings for {} inputs",
                data.len(),
                expected
            )));
        }

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let values = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| Error::Embedding("response item missing embedding".to_string()))?;

            if values.len() != self.dims {
                return Err(Error::Embedding(format!(
                    "model returned {} dims, configured for {}",
                    values.len(),
                    self.dims
                )));
            }

            let vec: Vec<f32> = values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            embeddings.push(vec);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all.extend(self.embed_batch(batch).await?);
        }
        Ok(all)
    }
}
