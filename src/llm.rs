//! LLM provider abstraction and implementations.
//!
//! Defines the [`LlmProvider`] trait and four backends selected by
//! configuration: OpenAI, Anthropic, Gemini, and Ollama. Construction only
//! validates configuration (presence of the required credential); the first
//! network call happens at [`generate`] time.
//!
//! Unlike the embedding factory, an unknown provider name here is a hard
//! configuration error: a misconfigured generator is user-visible and must
//! not be papered over.
//!
//! Retries follow the same policy as the embedding calls: 429/5xx/network
//! errors back off exponentially, other 4xx fail immediately.

use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";
const DEFAULT_OLLAMA_MODEL: &str = "deepseek-r1:8b";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// Trait for text-generation providers.
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Backend identifier (`"openai"`, `"anthropic"`, `"gemini"`, `"ollama"`).
    fn name(&self) -> &str;
    /// Model identifier.
    fn model_name(&self) -> &str;
}

/// A configured backend: name, model, and the resolved credential.
#[derive(Debug)]
struct Backend {
    name: &'static str,
    model: String,
}

impl LlmProvider for Backend {
    fn name(&self) -> &str {
        self.name
    }
    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create the [`LlmProvider`] selected by configuration.
///
/// # Errors
///
/// - `Configuration` when a key-backed provider's credential is absent or
///   empty (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`).
/// - `Configuration` for any provider name outside the enumerated set.
pub fn create_provider(config: &LlmConfig) -> Result<Box<dyn LlmProvider>> {
    let backend = match config.provider.as_str() {
        "openai" => {
            require_env("OPENAI_API_KEY")?;
            Backend {
                name: "openai",
                model: model_or(config, DEFAULT_OPENAI_MODEL),
            }
        }
        "anthropic" => {
            require_env("ANTHROPIC_API_KEY")?;
            Backend {
                name: "anthropic",
                model: model_or(config, DEFAULT_ANTHROPIC_MODEL),
            }
        }
        "gemini" => {
            require_env("GEMINI_API_KEY")?;
            Backend {
                name: "gemini",
                model: model_or(config, DEFAULT_GEMINI_MODEL),
            }
        }
        "ollama" => Backend {
            name: "ollama",
            model: model_or(config, DEFAULT_OLLAMA_MODEL),
        },
        other => {
            return Err(Error::Configuration(format!(
                "unsupported LLM provider: '{}' (expected openai, anthropic, gemini, or ollama)",
                other
            )))
        }
    };

    Ok(Box::new(backend))
}

fn model_or(config: &LlmConfig, default: &str) -> String {
    config.model.clone().unwrap_or_else(|| default.to_string())
}

fn require_env(name: &str) -> Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    if value.is_empty() {
        return Err(Error::Configuration(format!("{} is not set", name)));
    }
    Ok(value)
}

/// Generate a text completion for `prompt` using the configured provider.
pub async fn generate(
    provider: &dyn LlmProvider,
    config: &LlmConfig,
    prompt: &str,
) -> Result<String> {
    match provider.name() {
        "openai" => generate_openai(provider.model_name(), config, prompt).await,
        "anthropic" => generate_anthropic(provider.model_name(), config, prompt).await,
        "gemini" => generate_gemini(provider.model_name(), config, prompt).await,
        "ollama" => generate_ollama(provider.model_name(), config, prompt).await,
        other => Err(Error::Generation(format!(
            "no generation backend for provider '{}'",
            other
        ))),
    }
}

async fn generate_openai(model: &str, config: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = require_env("OPENAI_API_KEY")?;
    let body = serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
    });

    let json = post_with_retry(
        config,
        "https://api.openai.com/v1/chat/completions",
        &body,
        &[("Authorization", format!("Bearer {}", api_key))],
    )
    .await?;

    json.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Generation("invalid OpenAI response: missing content".into()))
}

async fn generate_anthropic(model: &str, config: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = require_env("ANTHROPIC_API_KEY")?;
    let body = serde_json::json!({
        "model": model,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "messages": [{ "role": "user", "content": prompt }],
    });

    let json = post_with_retry(
        config,
        "https://api.anthropic.com/v1/messages",
        &body,
        &[
            ("x-api-key", api_key),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ],
    )
    .await?;

    json.pointer("/content/0/text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Generation("invalid Anthropic response: missing text".into()))
}

async fn generate_gemini(model: &str, config: &LlmConfig, prompt: &str) -> Result<String> {
    let api_key = require_env("GEMINI_API_KEY")?;
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        model, api_key
    );
    let body = serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
    });

    let json = post_with_retry(config, &url, &body, &[]).await?;

    json.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Generation("invalid Gemini response: missing text".into()))
}

async fn generate_ollama(model: &str, config: &LlmConfig, prompt: &str) -> Result<String> {
    let url = format!(
        "{}/api/generate",
        config.ollama_base_url.trim_end_matches('/')
    );
    let body = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
    });

    let json = post_with_retry(config, &url, &body, &[]).await?;

    json.get("response")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Generation("invalid Ollama response: missing response field".into()))
}

/// POST JSON with retry/backoff. 429 and 5xx retry; other 4xx fail fast.
async fn post_with_retry(
    config: &LlmConfig,
    url: &str,
    body: &serde_json::Value,
    headers: &[(&str, String)],
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| Error::Generation(e.to_string()))?;

    let mut last_err: Option<Error> = None;

    for attempt in 0..=config.max_retries {
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
                        .map_err(|e| Error::Generation(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(Error::Generation(format!(
                        "LLM API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                return Err(Error::Generation(format!(
                    "LLM API error {}: {}",
                    status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(Error::Generation(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Generation("generation failed after retries".into())))
}
