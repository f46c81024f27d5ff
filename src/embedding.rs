//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two backends:
//! - **[`OpenAIProvider`]** — `POST /v1/embeddings`, batched, requires
//!   `OPENAI_API_KEY`.
//! - **[`OllamaProvider`]** — local Ollama embeddings endpoint, no credential.
//!
//! Provider selection is asymmetric with the LLM factory on purpose: an
//! unknown embedding provider name falls back to Ollama with a warning so
//! ingestion keeps working, while an unknown LLM provider is a hard
//! configuration error (generation failures are user-visible).
//!
//! Also provides vector utilities for BLOB storage and similarity:
//! [`vec_to_blob`], [`blob_to_vec`], [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! HTTP 429 and 5xx responses and network errors are retried with
//! exponential backoff (1s, 2s, 4s, ... capped at 2^5); other 4xx responses
//! fail immediately.

use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Default model per backend, used when `embedding.model` is not set.
const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OLLAMA_MODEL: &str = "nomic-embed-text";

/// Trait for embedding providers.
///
/// Construction validates configuration only; no network call is made until
/// [`embed_texts`] (kept as a free function due to async trait limitations).
pub trait EmbeddingProvider: Send + Sync {
    /// Backend identifier (`"openai"` or `"ollama"`).
    fn name(&self) -> &str;
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
}

/// Create the [`EmbeddingProvider`] selected by configuration.
///
/// | Config value | Provider |
/// |--------------|----------|
/// | `"openai"` | [`OpenAIProvider`] (fails without `OPENAI_API_KEY`) |
/// | `"ollama"` | [`OllamaProvider`] |
/// | anything else | [`OllamaProvider`], with a stderr warning |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config))),
        other => {
            eprintln!(
                "Warning: embedding provider '{}' is not configured; falling back to ollama",
                other
            );
            Ok(Box::new(OllamaProvider::new(config)))
        }
    }
}

/// Embed a batch of texts using the configured provider.
///
/// Dispatches on the provider's name; returns one vector per input text, in
/// input order.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    match provider.name() {
        "openai" => embed_openai(provider.model_name(), config, texts).await,
        "ollama" => embed_ollama(provider.model_name(), config, texts).await,
        other => Err(Error::Embedding(format!(
            "no embedding backend for provider '{}'",
            other
        ))),
    }
}

/// Embed a single query text.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let results = embed_texts(provider, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
pub struct OpenAIProvider {
    model: String,
}

impl OpenAIProvider {
    /// Fails with a configuration error if `OPENAI_API_KEY` is unset or empty.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if key.is_empty() {
            return Err(Error::Configuration(
                "OPENAI_API_KEY is required for the openai embedding provider".to_string(),
            ));
        }
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
}

async fn embed_openai(
    model: &str,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| Error::Configuration("OPENAI_API_KEY not set".to_string()))?;

    let client = http_client(config.timeout_secs)?;
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let json = post_with_retry(
        &client,
        config.max_retries,
        "https://api.openai.com/v1/embeddings",
        &body,
        &[("Authorization", format!("Bearer {}", api_key))],
    )
    .await?;

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Embedding("invalid OpenAI response: missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Embedding("invalid OpenAI response: missing embedding".into()))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }

    Ok(embeddings)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama server. Requires no credential.
pub struct OllamaProvider {
    model: String,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            base_url: config.ollama_base_url.clone(),
        }
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }
    fn model_name(&self) -> &str {
        &self.model
    }
}

/// The Ollama embeddings endpoint takes one prompt per request.
async fn embed_ollama(
    model: &str,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let client = http_client(config.timeout_secs)?;
    let url = format!(
        "{}/api/embeddings",
        config.ollama_base_url.trim_end_matches('/')
    );

    let mut embeddings = Vec::with_capacity(texts.len());
    for text in texts {
        let body = serde_json::json!({
            "model": model,
            "prompt": text,
        });

        let json = post_with_retry(&client, config.max_retries, &url, &body, &[]).await?;

        let embedding = json
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::Embedding("invalid Ollama response: missing embedding".into())
            })?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }

    Ok(embeddings)
}

// ============ Shared HTTP plumbing ============

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Embedding(e.to_string()))
}

/// POST JSON with retry/backoff. 429 and 5xx retry; other 4xx fail fast.
async fn post_with_retry(
    client: &reqwest::Client,
    max_retries: u32,
    url: &str,
    body: &serde_json::Value,
    headers: &[(&str, String)],
) -> Result<serde_json::Value> {
    let mut last_err: Option<Error> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).json(body);
        for (name, value) in headers {
            req = req.header(*name, value);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| Error::Embedding(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(Error::Embedding(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                return Err(Error::Embedding(format!(
                    "embedding API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(Error::Embedding(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Embedding("embedding failed after retries".into())))
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn ollama_provider_needs_no_credential() {
        let config = EmbeddingConfig::default();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn unknown_provider_falls_back_to_ollama() {
        let config = EmbeddingConfig {
            provider: "gemini".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn provider_construction_is_idempotent() {
        let config = EmbeddingConfig {
            model: Some("custom-embed".to_string()),
            ..EmbeddingConfig::default()
        };
        let a = create_provider(&config).unwrap();
        let b = create_provider(&config).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.model_name(), b.model_name());
    }
}
