use crate::backend;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::keys::KeyStore;
use crate::logging::SharedLogger;
use crate::models::ModelTable;
use crate::relay;
use crate::translate::{normalize, NormalizedRequest, RequestShape};

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: GatewayConfig,
    pub models: ModelTable,
    pub client: reqwest::Client,
    pub keys: KeyStore,
    pub admin_key: String,
    pub logger: SharedLogger,
}

const API_KEY_HEADER: &str = "x-api-key";
const ADMIN_KEY_HEADER: &str = "x-api-admin";

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/complete", post(handle_complete))
        .route("/v1/messages", post(handle_messages))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .route("/keys", get(handle_list_keys).post(handle_create_key))
        .route("/keys/:key", delete(handle_delete_key))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error shaping
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: &'static str,
    message: String,
    /// Echo of the offending request body, present for validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    request_body: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ApiErrorResponse {
    error: ApiError,
}

impl ApiErrorResponse {
    fn from_gateway(err: &GatewayError) -> Self {
        let (error_type, request_body) = match err {
            GatewayError::Validation { body, .. } => {
                ("invalid_request_error", Some(body.clone()))
            }
            GatewayError::UnknownModel { .. } => ("invalid_request_error", None),
            GatewayError::MalformedChunk { .. } => ("api_error", None),
            _ => ("api_error", None),
        };
        Self {
            error: ApiError {
                error_type,
                message: err.to_string(),
                request_body,
            },
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            error: ApiError {
                error_type: "permission_error",
                message: message.into(),
                request_body: None,
            },
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: ApiError {
                error_type: "not_found_error",
                message: message.into(),
                request_body: None,
            },
        }
    }
}

fn error_response(err: &GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(ApiErrorResponse::from_gateway(err))).into_response()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if state.keys.contains(presented) {
        return Ok(());
    }

    state.logger.warn("auth", "Rejected request with invalid API key");
    Err((
        StatusCode::FORBIDDEN,
        Json(ApiErrorResponse::forbidden("Invalid API key")),
    )
        .into_response())
}

fn require_admin_key(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.admin_key.is_empty() && presented == state.admin_key {
        return Ok(());
    }

    state.logger.warn("auth", "Rejected request with invalid admin key");
    Err((
        StatusCode::FORBIDDEN,
        Json(ApiErrorResponse::forbidden("Invalid admin API key")),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Completion endpoints
// ---------------------------------------------------------------------------

async fn handle_complete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, headers, body, RequestShape::LegacyComplete).await
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, headers, body, RequestShape::Messages).await
}

/// The two completion endpoints differ only in shape; everything past
/// normalization is shared.
async fn dispatch(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
    shape: RequestShape,
) -> Response {
    if let Err(rejection) = require_api_key(&state, &headers) {
        return rejection;
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            state
                .logger
                .error("server", format!("Unparseable request body: {e}"));
            let err = GatewayError::validation(
                shape.required_fields()[0],
                serde_json::Value::String(String::from_utf8_lossy(&body).into_owned()),
            );
            return error_response(&err);
        }
    };

    let normalized = match normalize(&raw, shape, &state.models) {
        Ok(n) => n,
        Err(e) => {
            state.logger.error("server", format!("Rejected request: {e}"));
            return error_response(&e);
        }
    };

    state.logger.info(
        "server",
        format!(
            "Request shape={shape:?} model={} streaming={}",
            normalized.model_id, normalized.stream
        ),
    );

    if normalized.stream {
        handle_streaming(state, &normalized).await
    } else {
        handle_blocking(state, &normalized).await
    }
}

async fn handle_blocking(state: Arc<AppState>, req: &NormalizedRequest) -> Response {
    match backend::invoke_blocking(&state.client, &state.config, req, &state.logger).await {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            state.logger.error("server", format!("Invoke error: {e}"));
            error_response(&e)
        }
    }
}

async fn handle_streaming(state: Arc<AppState>, req: &NormalizedRequest) -> Response {
    let chunks =
        match backend::invoke_streaming(&state.client, &state.config, req, &state.logger).await {
            Ok(s) => s,
            Err(e) => {
                state
                    .logger
                    .error("server", format!("Streaming setup error: {e}"));
                return error_response(&e);
            }
        };

    let logger = state.logger.clone();
    let frames = relay::relay(chunks);

    // Frames already sent stand; a fatal error becomes one terminal
    // error event and then the stream ends.
    let event_stream = frames.map(move |result| -> Result<Event, Infallible> {
        match result {
            Ok(frame) => Ok(Event::default().event(frame.event).data(frame.data)),
            Err(e) => {
                logger.error("server", format!("Relay error: {e}"));
                let payload = serde_json::to_string(&ApiErrorResponse::from_gateway(&e))
                    .unwrap_or_else(|_| "{}".to_string());
                Ok(Event::default().event("error").data(payload))
            }
        }
    });

    Sse::new(event_stream).into_response()
}

// ---------------------------------------------------------------------------
// Key management (admin)
// ---------------------------------------------------------------------------

async fn handle_list_keys(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_admin_key(&state, &headers) {
        return rejection;
    }
    Json(state.keys.list()).into_response()
}

async fn handle_create_key(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_admin_key(&state, &headers) {
        return rejection;
    }

    match state.keys.issue() {
        Ok(key) => {
            state.logger.info("keys", "Issued a new API key");
            Json(serde_json::json!({ "api_key": key })).into_response()
        }
        Err(e) => {
            state.logger.error("keys", format!("Failed to issue key: {e}"));
            error_response(&e)
        }
    }
}

async fn handle_delete_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    if let Err(rejection) = require_admin_key(&state, &headers) {
        return rejection;
    }

    match state.keys.revoke(&key) {
        Ok(true) => {
            state.logger.info("keys", "Revoked an API key");
            Json(serde_json::json!({ "detail": "API key deleted" })).into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiErrorResponse::not_found("API key not found")),
        )
            .into_response(),
        Err(e) => {
            state.logger.error("keys", format!("Failed to revoke key: {e}"));
            error_response(&e)
        }
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let models: Vec<serde_json::Value> = state
        .models
        .public_names()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": "bedrock",
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}
