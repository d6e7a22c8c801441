// Caller-facing error responses

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::proxy::ProxyError;

/// How an error body is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFormat {
    /// `{ "error": ..., "message"?: ... }`
    Json,
    /// `{ "success": false, "error": ... }`
    Envelope,
    /// Plain text, for streaming endpoints
    Text,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub message: Option<String>,
    pub format: ErrorFormat,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: None,
            format: ErrorFormat::Json,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn envelope(mut self) -> Self {
        self.format = ErrorFormat::Envelope;
        self
    }

    pub fn text(mut self) -> Self {
        self.format = ErrorFormat::Text;
        self
    }

    /// Status from a proxy error, falling back to 502 for codes axum cannot
    /// represent.
    pub fn status_of(err: &ProxyError) -> StatusCode {
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_GATEWAY)
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        ApiError::new(ApiError::status_of(&err), err.detail())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        ApiError::bad_request("Bad Request").with_message(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.format {
            ErrorFormat::Json => {
                let body = match self.message {
                    Some(message) => json!({ "error": self.error, "message": message }),
                    None => json!({ "error": self.error }),
                };
                (self.status, Json(body)).into_response()
            }
            ErrorFormat::Envelope => {
                let body = json!({ "success": false, "error": self.error });
                (self.status, Json(body)).into_response()
            }
            ErrorFormat::Text => {
                let body = match self.message {
                    Some(message) => format!("{}: {}", self.error, message),
                    None => self.error,
                };
                (
                    self.status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    body,
                )
                    .into_response()
            }
        }
    }
}

/// JSON body extractor whose rejection is an `ApiError`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);
