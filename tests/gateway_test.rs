use base64::Engine;
use bedrock_gateway::config::{AuthConfig, BackendConfig, GatewayConfig};
use bedrock_gateway::{build_router, AppState, KeyStore, SharedLogger};

use axum::extract::Path;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

// ────────────────────────────────────────────────────────────────
// Stub Bedrock backend
// ────────────────────────────────────────────────────────────────

async fn stub_invoke(Path(model_id): Path<String>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "completion": format!("Hello from {model_id}"),
        "stop_reason": "stop_sequence",
    }))
}

async fn stub_invoke_stream(Path(_model_id): Path<String>) -> impl IntoResponse {
    let encode = |payload: &str| {
        let b64 = base64::engine::general_purpose::STANDARD.encode(payload);
        format!("{{\"chunk\":{{\"bytes\":\"{b64}\"}}}}\n")
    };

    let body = [
        encode(r#"{"type":"message_start","seq":1}"#),
        encode(r#"{"type":"content_block_delta","seq":2}"#),
        encode(r#"{"seq":3}"#),
        encode(r#"{"type":"message_stop","seq":4}"#),
    ]
    .concat();

    ([("content-type", "application/json")], body)
}

async fn spawn_stub_backend() -> SocketAddr {
    let app = Router::new()
        .route("/model/:model_id/invoke", post(stub_invoke))
        .route(
            "/model/:model_id/invoke-with-response-stream",
            post(stub_invoke_stream),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ────────────────────────────────────────────────────────────────
// Gateway fixture
// ────────────────────────────────────────────────────────────────

struct Gateway {
    addr: SocketAddr,
    api_key: String,
    _tmp: tempfile::TempDir,
}

async fn spawn_gateway(backend_addr: SocketAddr, credential_env: &str) -> Gateway {
    std::env::set_var(credential_env, "test-credential");

    let tmp = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        port: 0,
        backend: BackendConfig {
            region: "us-west-2".to_string(),
            base_url: Some(format!("http://{backend_addr}")),
            credential_env: credential_env.to_string(),
        },
        models: HashMap::new(),
        default_model: None,
        auth: AuthConfig {
            admin_key_env: "UNUSED_ADMIN_ENV".to_string(),
            keys_file: tmp.path().join("keys.json"),
        },
    };

    let keys = KeyStore::load(&config.auth.keys_file).unwrap();
    let api_key = keys.issue().unwrap();

    let state = Arc::new(AppState {
        models: config.model_table(),
        client: reqwest::Client::new(),
        keys,
        admin_key: "admin-secret".to_string(),
        logger: SharedLogger::new(tmp.path().join("gateway.log")).unwrap(),
        config,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Gateway {
        addr,
        api_key,
        _tmp: tmp,
    }
}

// ────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_legacy_blocking_roundtrip() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_BLOCKING").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/v1/complete", gw.addr))
        .header("x-api-key", &gw.api_key)
        .json(&serde_json::json!({"prompt": "hi", "max_tokens_to_sample": 10}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = resp.text().await.unwrap();
    // Default backend id was used since the body named no model.
    assert!(body.contains("anthropic.claude-3-haiku-20240307-v1:0"));
}

#[tokio::test]
async fn test_messages_streaming_roundtrip() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_STREAMING").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/v1/messages", gw.addr))
        .header("x-api-key", &gw.api_key)
        .json(&serde_json::json!({
            "model": "claude-3-haiku-20240307",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 50,
            "stream": true,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = resp.text().await.unwrap();

    // One frame per chunk, in backend order, default type applied to the
    // chunk without a discriminator.
    let start = body.find("event: message_start").expect("missing message_start");
    let delta = body
        .find("event: content_block_delta")
        .expect("missing content_block_delta");
    let default = body.find("event: completion").expect("missing default event");
    let stop = body.find("event: message_stop").expect("missing message_stop");
    assert!(start < delta && delta < default && default < stop);

    assert!(body.contains(r#"data: {"seq":3}"#));
}

#[tokio::test]
async fn test_missing_required_field_is_400() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_VALIDATION").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/v1/complete", gw.addr))
        .header("x-api-key", &gw.api_key)
        .json(&serde_json::json!({"prompt": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    // The offending body is echoed for diagnostics.
    assert_eq!(body["error"]["request_body"]["prompt"], "hi");
}

#[tokio::test]
async fn test_unknown_model_is_400() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_UNKNOWN_MODEL").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/v1/messages", gw.addr))
        .header("x-api-key", &gw.api_key)
        .json(&serde_json::json!({
            "model": "unknown-model",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 50,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unknown-model"));
}

#[tokio::test]
async fn test_invalid_api_key_is_403() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_AUTH").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/v1/complete", gw.addr))
        .header("x-api-key", "not-a-real-key")
        .json(&serde_json::json!({"prompt": "hi", "max_tokens_to_sample": 10}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_admin_key_management() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_ADMIN").await;
    let client = reqwest::Client::new();

    // Wrong admin key is rejected.
    let resp = client
        .get(format!("http://{}/keys", gw.addr))
        .header("x-api-admin", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Issue a key.
    let resp = client
        .post(format!("http://{}/keys", gw.addr))
        .header("x-api-admin", "admin-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let new_key = body["api_key"].as_str().unwrap().to_string();
    assert!(new_key.starts_with("bedrock-sk-"));

    // It shows up in the listing.
    let resp = client
        .get(format!("http://{}/keys", gw.addr))
        .header("x-api-admin", "admin-secret")
        .send()
        .await
        .unwrap();
    let keys: Vec<String> = resp.json().await.unwrap();
    assert!(keys.contains(&new_key));

    // Revoke it; a second delete is a 404.
    let resp = client
        .delete(format!("http://{}/keys/{new_key}", gw.addr))
        .header("x-api-admin", "admin-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("http://{}/keys/{new_key}", gw.addr))
        .header("x-api-admin", "admin-secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_health_endpoint() {
    let backend = spawn_stub_backend().await;
    let gw = spawn_gateway(backend, "TEST_BEDROCK_CRED_HEALTH").await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/health", gw.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}
