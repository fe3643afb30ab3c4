//! Webhook receiver.
//!
//! Accepts GitHub webhook deliveries, verifies their signature, and routes
//! them through the source's adapter. Items that come back are persisted with
//! the same store calls the sync pipeline uses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/webhooks/{source}` | Receive a delivery for a configured source |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unauthorized", "message": "signature mismatch" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).
//!
//! # Signatures
//!
//! When the source names a `webhook_secret_env` and that variable is set,
//! `X-Hub-Signature-256` must be `sha256=` followed by the hex HMAC-SHA256 of
//! the raw body. Without a secret, deliveries are accepted unsigned.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use hubsync_core::store::Store;

use crate::config::Config;
use crate::credentials::{CredentialsProvider, EnvCredentials};
use crate::ingest::store_item;
use crate::sqlite_store::SqliteStore;
use crate::traits::AdapterRegistry;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: AdapterRegistry,
    pub store: Arc<dyn Store>,
    pub credentials: Arc<dyn CredentialsProvider>,
}

/// Starts the webhook server on `[server].bind`, backed by the configured
/// SQLite database and environment credentials.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(config).await?);
    let credentials: Arc<dyn CredentialsProvider> = Arc::new(EnvCredentials);
    let registry = AdapterRegistry::from_config(config, store.clone(), credentials.clone())?;

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        store,
        credentials,
    };

    println!("Webhook server listening on http://{}", bind_addr);
    for id in config.source_ids() {
        println!("  POST /webhooks/{}", id);
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// The application router, without a listener.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhooks/{source}", post(handle_webhook))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Check a `sha256=<hex>` signature against the raw body.
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_digest) = header.and_then(|h| h.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` signature for `body`, as GitHub would send it.
pub fn sign(secret: &[u8], body: &[u8]) -> anyhow::Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("invalid webhook secret: {}", e))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

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

// ============ POST /webhooks/{source} ============

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum WebhookResponse {
    Stored { external_id: String },
    Ignored,
}

async fn handle_webhook(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let source = state
        .config
        .source(&source_id)
        .map_err(|_| not_found(format!("unknown source '{}'", source_id)))?;

    let secret = state
        .credentials
        .webhook_secret(&source)
        .await
        .map_err(internal)?;
    if let Some(secret) = secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(secret.as_bytes(), &body, signature) {
            warn!(source = %source.id, "webhook signature rejected");
            return Err(unauthorized("missing or invalid X-Hub-Signature-256"));
        }
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| bad_request("missing X-GitHub-Event header"))?
        .to_string();
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("invalid JSON payload: {}", e)))?;

    let adapter = state.registry.for_source(&source).map_err(internal)?;
    let Some(item) = adapter
        .handle_webhook(&source, &event, &payload)
        .await
        .map_err(internal)?
    else {
        return Ok(Json(WebhookResponse::Ignored));
    };

    store_item(state.store.as_ref(), &source.id, &item)
        .await
        .map_err(internal)?;
    info!(source = %source.id, %event, external_id = %item.external_id, "webhook item stored");

    Ok(Json(WebhookResponse::Stored {
        external_id: item.external_id,
    }))
}
