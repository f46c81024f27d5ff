//! HTTP API server.
//!
//! Exposes the question-answering pipeline and document management over a
//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method   | Path                 | Description |
//! |----------|----------------------|-------------|
//! | `GET`    | `/health`            | Health check (no auth) |
//! | `POST`   | `/chat`              | Ask the general persona |
//! | `POST`   | `/chat/delia`        | Ask the EDSL assistant |
//! | `POST`   | `/documents/ingest`  | Ingest a file by path |
//! | `GET`    | `/documents/stats`   | Index statistics |
//! | `DELETE` | `/documents/clear`   | Remove all indexed content |
//! | `GET`    | `/documents/list`    | Indexed source file names |
//!
//! # Authentication
//!
//! Every endpoint except `/health` requires `Authorization: Bearer <token>`,
//! where the token is derived from `[server].secret_key` with HMAC-SHA256
//! (`ragdesk token` prints it). When no secret key is configured the check
//! is disabled, for local development.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `bad_request` (400), `configuration`
//! (500), `upstream_error` (502), `index_unavailable` (503).
//!
//! `/chat/delia` never returns a pipeline error: failures are folded into
//! the answer body with HTTP 200 (see [`crate::chain::RagChain::ask_delia`]).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chain::Persona;
use crate::error::Error;
use crate::ingest;
use crate::models::{DeliaAnswer, IndexStats, UserLevel};
use crate::state::AppState;

/// Domain-separation context for API token derivation.
const TOKEN_CONTEXT: &[u8] = b"ragdesk-api-token";

type HmacSha256 = Hmac<Sha256>;

/// Starts the HTTP server. Binds to `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();

    if state.config.server.secret_key.is_none() {
        eprintln!("Warning: [server].secret_key is not set; API authentication is disabled");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/chat/delia", post(handle_chat_delia))
        .route("/documents/ingest", post(handle_ingest))
        .route("/documents/stats", get(handle_stats))
        .route("/documents/clear", delete(handle_clear))
        .route("/documents/list", get(handle_list))
        .layer(cors)
        .with_state(state);

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ API tokens ============

/// Derive the API bearer token from the configured secret key.
pub fn derive_token(secret_key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(TOKEN_CONTEXT);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a presented token against the secret key in constant time.
fn verify_token(secret_key: &str, presented: &str) -> bool {
    let Ok(raw) = hex::decode(presented) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(TOKEN_CONTEXT);
    mac.verify_slice(&raw).is_ok()
}

/// Enforce bearer auth on a protected endpoint. A missing secret key
/// disables the check entirely.
fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(secret_key) = state.config.server.secret_key.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if verify_token(secret_key, presented) {
        Ok(())
    } else {
        Err(unauthorized("missing or invalid bearer token"))
    }
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline error to its HTTP representation: caller mistakes are 400,
/// configuration problems 500, backend failures 502, storage failures 503.
fn classify_error(err: Error) -> AppError {
    let message = err.to_string();
    let (status, code) = match err {
        Error::UnsupportedFormat(_) | Error::Load(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        Error::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
        Error::Embedding(_) | Error::Generation(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        Error::IndexUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable"),
    };
    AppError {
        status,
        code: code.to_string(),
        message,
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    model: String,
}

/// Handler for `POST /chat`.
///
/// Runs the general persona: retrieve, assemble the prompt, generate.
async fn handle_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    require_auth(&state, &headers)?;

    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let chain = state
        .chain(Persona::General)
        .await
        .map_err(classify_error)?;
    let answer = chain
        .ask_general(&req.question)
        .await
        .map_err(classify_error)?;

    Ok(Json(ChatResponse {
        answer,
        model: chain.model_name().to_string(),
    }))
}

// ============ POST /chat/delia ============

#[derive(Deserialize)]
struct DeliaRequest {
    question: String,
    #[serde(default)]
    user_level: UserLevel,
}

/// Handler for `POST /chat/delia`.
///
/// Runs the specialized persona. Pipeline failures do not become HTTP
/// errors: the structured answer carries the apology and the error text, so
/// this handler fails only on auth or an empty question.
async fn handle_chat_delia(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<DeliaRequest>,
) -> Result<Json<DeliaAnswer>, AppError> {
    require_auth(&state, &headers)?;

    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let answer = match state.chain(Persona::Specialized).await {
        Ok(chain) => chain.ask_delia(&req.question, req.user_level).await,
        Err(e) => crate::chain::delia_failure(req.user_level, e.to_string()),
    };

    Ok(Json(answer))
}

// ============ POST /documents/ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    path: PathBuf,
}

#[derive(Serialize)]
struct IngestResponse {
    source: String,
    chunks_added: u64,
}

/// Handler for `POST /documents/ingest`.
///
/// Loads the file at `path` on the server's filesystem, chunks it, and adds
/// it to the index.
async fn handle_ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    require_auth(&state, &headers)?;

    let added = ingest::run_ingest(&state, &req.path)
        .await
        .map_err(classify_error)?;

    Ok(Json(IngestResponse {
        source: req.path.display().to_string(),
        chunks_added: added,
    }))
}

// ============ GET /documents/stats ============

async fn handle_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<IndexStats>, AppError> {
    require_auth(&state, &headers)?;

    let index = state.index().await.map_err(classify_error)?;
    let stats = index.stats().await.map_err(classify_error)?;
    Ok(Json(stats))
}

// ============ DELETE /documents/clear ============

#[derive(Serialize)]
struct ClearResponse {
    cleared: bool,
}

async fn handle_clear(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, AppError> {
    require_auth(&state, &headers)?;

    let index = state.index().await.map_err(classify_error)?;
    index.clear().await.map_err(classify_error)?;
    Ok(Json(ClearResponse { cleared: true }))
}

// ============ GET /documents/list ============

#[derive(Serialize)]
struct ListResponse {
    sources: Vec<String>,
}

async fn handle_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ListResponse>, AppError> {
    require_auth(&state, &headers)?;

    let index = state.index().await.map_err(classify_error)?;
    let sources = index.list_sources().await.map_err(classify_error)?;
    Ok(Json(ListResponse { sources }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_derivation_is_deterministic() {
        let a = derive_token("s3cret");
        let b = derive_token("s3cret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // hex-encoded SHA-256 output
    }

    #[test]
    fn different_keys_give_different_tokens() {
        assert_ne!(derive_token("alpha"), derive_token("beta"));
    }

    #[test]
    fn derived_token_verifies() {
        let token = derive_token("s3cret");
        assert!(verify_token("s3cret", &token));
    }

    #[test]
    fn wrong_or_malformed_token_is_rejected() {
        let token = derive_token("s3cret");
        assert!(!verify_token("other-key", &token));
        assert!(!verify_token("s3cret", "not-hex!"));
        assert!(!verify_token("s3cret", ""));
    }

    #[test]
    fn error_classification_maps_statuses() {
        let cases = [
            (
                Error::UnsupportedFormat(".docx".into()),
                StatusCode::BAD_REQUEST,
            ),
            (Error::Load("boom".into()), StatusCode::BAD_REQUEST),
            (
                Error::Configuration("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (Error::Embedding("boom".into()), StatusCode::BAD_GATEWAY),
            (Error::Generation("boom".into()), StatusCode::BAD_GATEWAY),
            (
                Error::IndexUnavailable("boom".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(classify_error(err).status, status);
        }
    }
}
