// Pass-through handlers: chat completion, single-shot generation and the
// two streaming relays

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::{ApiError, AppState, JsonBody};
use crate::proxy::stream::{Framing, RelayStream};
use crate::proxy::translator::{ContentPart, GenerateRequest};
use crate::proxy::ProxyError;

fn streaming_response(content_type: &'static str, body: RelayStream) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Option<Value>,
    pub temperature: Option<Value>,
    pub top_p: Option<Value>,
    pub max_tokens: Option<Value>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    fn upstream_body(&self, model: &str, messages: &Value) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert("messages".to_string(), messages.clone());
        for (key, value) in [
            ("temperature", &self.temperature),
            ("top_p", &self.top_p),
            ("max_tokens", &self.max_tokens),
        ] {
            if let Some(value) = value.as_ref().filter(|v| !v.is_null()) {
                body.insert(key.to_string(), value.clone());
            }
        }
        body.insert("stream".to_string(), Value::Bool(self.stream));
        Value::Object(body)
    }
}

/// Chat completion pass-through. The upstream JSON is returned unchanged;
/// `stream: true` relays the text deltas instead.
pub async fn chat(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let profile = &state.config.endpoints.chat;
    let credential = state
        .credential(profile, None)
        .map_err(|_| ApiError::internal("Server configuration error: API key missing."))?;

    let model = request.model.as_deref().filter(|m| !m.trim().is_empty());
    let (Some(model), Some(messages)) = (model, request.messages.as_ref()) else {
        return Err(ApiError::bad_request(
            "Missing required parameters: model or messages. Check request body format.",
        ));
    };

    let body = request.upstream_body(model, messages);

    if request.stream {
        let relay = state
            .chat
            .stream_text(model, &body, &credential, Framing::Sse, CancellationToken::new())
            .await
            .map_err(ApiError::from)?;
        return Ok(streaming_response("text/plain; charset=utf-8", relay));
    }

    match state.chat.send(model, &body, &credential).await {
        Ok(response) => Ok(Json(response).into_response()),
        Err(ProxyError::UpstreamHttp { status, message }) => Err(ApiError::new(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message,
        )),
        Err(e) => {
            tracing::error!("Chat request failed: {}", e);
            Err(ApiError::internal(format!("Internal Server Error: {}", e.detail())))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub parts: Value,
    pub api_key: Option<String>,
}

/// Single-shot generation with the endpoint's fixed model, `{ text }` back.
pub async fn generate(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<GenerateBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.generate;
    let credential = state
        .credential(profile, request.api_key.as_deref())
        .map_err(|_| {
            ApiError::internal("Configuration Error: No Gemini API Key found (Server or Client).")
        })?;
    let model = profile
        .primary_model()
        .ok_or_else(|| ApiError::internal("Configuration Error: no model configured."))?;

    let parts = ContentPart::parse_all(&request.parts).map_err(ApiError::from)?;
    let body = GenerateRequest::from_parts(parts).into_value();

    match state.gemini.send_text(model, &body, &credential).await {
        Ok(text) => Ok(Json(serde_json::json!({ "text": text }))),
        Err(ProxyError::UpstreamHttp { status, message }) => Err(ApiError::new(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            format!("Gemini Error: {}", message),
        )),
        Err(ProxyError::MalformedResponse(_)) => {
            Err(ApiError::internal("Gemini returned no content."))
        }
        Err(e) => Err(ApiError::internal(format!("Server Error: {}", e.detail()))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamBody {
    pub model: Option<String>,
    #[serde(default)]
    pub parts: Value,
    pub api_key: Option<String>,
    /// `"json"` selects the JSON-array stream instead of SSE
    pub alt: Option<String>,
}

/// Streams generated text to the caller as plain text. Errors are plain
/// text too, since the client renders whatever arrives.
pub async fn stream(
    State(state): State<AppState>,
    request: Result<JsonBody<StreamBody>, ApiError>,
) -> Result<Response, ApiError> {
    let JsonBody(request) = request.map_err(ApiError::text)?;

    let Some(model) = request.model.as_deref().filter(|m| !m.trim().is_empty()) else {
        return Err(ApiError::bad_request("Error: Model ID is required.").text());
    };

    let profile = &state.config.endpoints.stream;
    let credential = state
        .credential(profile, request.api_key.as_deref())
        .map_err(|_| ApiError::internal("Error: Missing Gemini API Key.").text())?;

    let parts = ContentPart::parse_all(&request.parts)
        .map_err(|e| ApiError::bad_request(format!("Error: {}", e)).text())?;
    let body = GenerateRequest::from_parts(parts)
        .with_default_safety()
        .into_value();

    let framing = match request.alt.as_deref() {
        Some("json") => Framing::JsonArray,
        _ => Framing::Sse,
    };

    let relay = state
        .gemini
        .stream_text(model, &body, &credential, framing, CancellationToken::new())
        .await
        .map_err(|e| match e {
            ProxyError::UpstreamHttp { status, message } => ApiError::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                format!("Google API Error: {}", message),
            )
            .text(),
            other => {
                tracing::error!("Stream setup failed: {}", other);
                ApiError::internal(format!("Error: {}", other.detail())).text()
            }
        })?;

    Ok(streaming_response("text/plain; charset=utf-8", relay))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBody {
    pub model: Option<String>,
    pub contents: Option<Value>,
    pub custom_key: Option<String>,
}

/// Relays the upstream event stream byte-for-byte for the browser extension.
pub async fn agent(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AgentBody>,
) -> Result<Response, ApiError> {
    let profile = &state.config.endpoints.agent;
    let credential = state
        .credential(profile, request.custom_key.as_deref())
        .map_err(|_| ApiError::internal("Server Configuration Error: API Key missing."))?;

    let Some(model) = request.model.as_deref().filter(|m| !m.trim().is_empty()) else {
        return Err(ApiError::bad_request("Model is required."));
    };
    let Some(contents) = request.contents else {
        return Err(ApiError::bad_request("Contents are required."));
    };

    let body = GenerateRequest::new(contents).into_value();
    let relay = state
        .gemini
        .stream_raw(model, &body, &credential, CancellationToken::new())
        .await
        .map_err(|e| match e {
            ProxyError::UpstreamHttp { status, message } => ApiError::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                format!("Gemini API Error: {}", status),
            )
            .with_message(message),
            other => ApiError::internal(other.detail()),
        })?;

    Ok(streaming_response("text/event-stream", relay))
}
