#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use documate_gateway::api::{router, AppState};
use documate_gateway::config::{GatewayConfig, Secrets};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use wiremock::MockServer;

pub const SECRET_NAMES: &[&str] = &[
    "HUMANIZER_1",
    "DOCUMATE_GEMINI_1",
    "AGENT_1",
    "GROQ_API_KEY",
    "GEMINI_API_KEY",
    "GRADER_1",
    "FLASHCARD_1",
    "QUIZ_1",
    "DOCUMATE_SEARCH_1",
    "DOCUMATE_SEARCHID_1",
];

/// Chat traffic lives under this prefix on the mock server.
pub const CHAT_PREFIX: &str = "/openai/v1";

/// Defaults with every provider pointed at the mock server.
pub fn test_config(server: &MockServer) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.providers.gemini_base_url = server.uri();
    config.providers.groq_base_url = format!("{}{}", server.uri(), CHAT_PREFIX);
    config.providers.search_base_url = server.uri();
    config.upstream_timeout_secs = 5;
    config
}

/// Every secret set to `secret-<NAME>`.
pub fn all_secrets() -> Secrets {
    SECRET_NAMES
        .iter()
        .fold(Secrets::default(), |s, name| s.with(*name, format!("secret-{}", name)))
}

pub fn app(config: GatewayConfig, secrets: Secrets) -> Router {
    router(AppState::new(config, secrets))
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// A generate-content response carrying one text part.
pub fn gemini_text(text: &str) -> Value {
    serde_json::json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    })
}

/// A chat-completion response carrying one message.
pub fn chat_text(text: &str) -> Value {
    serde_json::json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    })
}
