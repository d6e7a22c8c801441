// Upstream proxy - one client for both chat-completion and generate-content

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::credential::ResolvedCredential;
use super::stream::{self, DeltaSchema, FrameDecoder, Framing, RelayStream};
use super::ProxyError;

/// Which upstream API family a proxy talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// OpenAI-compatible `POST /chat/completions`
    Chat,
    /// `POST /v1beta/models/{model}:generateContent`
    GenerateContent,
}

impl Capability {
    pub fn delta_schema(&self) -> DeltaSchema {
        match self {
            Capability::Chat => DeltaSchema::ChatCompletion,
            Capability::GenerateContent => DeltaSchema::GenerateContent,
        }
    }

    /// The primary text of a buffered response.
    pub fn first_text<'a>(&self, body: &'a Value) -> Option<&'a str> {
        match self {
            Capability::Chat => body
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str()),
            Capability::GenerateContent => body
                .get("candidates")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("content"))
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.get(0))
                .and_then(|p| p.get("text"))
                .and_then(|t| t.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    capability: Capability,
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl UpstreamProxy {
    pub fn new(
        capability: Capability,
        base_url: &str,
        http_client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            capability,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            timeout,
        }
    }

    fn url(&self, model: &str, framing: Option<Framing>) -> String {
        match (self.capability, framing) {
            (Capability::Chat, _) => format!("{}/chat/completions", self.base_url),
            (Capability::GenerateContent, None) => {
                format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
            }
            (Capability::GenerateContent, Some(framing)) => format!(
                "{}/v1beta/models/{}:streamGenerateContent?alt={}",
                self.base_url,
                model,
                match framing {
                    Framing::Sse => "sse",
                    Framing::JsonArray => "json",
                }
            ),
        }
    }

    fn request(&self, url: &str, credential: &ResolvedCredential) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json");
        match self.capability {
            Capability::Chat => {
                builder.header("Authorization", format!("Bearer {}", credential.value()))
            }
            Capability::GenerateContent => builder.header("x-goog-api-key", credential.value()),
        }
    }

    /// Buffered call. The model goes in the URL for generate-content and is
    /// expected inside `body` for chat.
    pub async fn send(
        &self,
        model: &str,
        body: &Value,
        credential: &ResolvedCredential,
    ) -> Result<Value, ProxyError> {
        let url = self.url(model, None);
        tracing::debug!("POST {} (model {})", url, model);

        let response = self
            .request(&url, credential)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = upstream_error_message(&text, status);
            tracing::warn!("Upstream {} returned {}: {}", url, status, message);
            return Err(ProxyError::UpstreamHttp {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| ProxyError::MalformedResponse(format!("response is not JSON: {}", e)))
    }

    /// Buffered call that also pulls out the primary text.
    pub async fn send_text(
        &self,
        model: &str,
        body: &Value,
        credential: &ResolvedCredential,
    ) -> Result<String, ProxyError> {
        let response = self.send(model, body, credential).await?;
        self.capability
            .first_text(&response)
            .map(str::to_string)
            .ok_or_else(|| {
                ProxyError::MalformedResponse("response has no text content".to_string())
            })
    }

    /// Open a streaming call. Non-2xx statuses are returned as errors with
    /// the raw upstream body, before any byte is relayed.
    pub async fn open_stream(
        &self,
        model: &str,
        body: &Value,
        credential: &ResolvedCredential,
        framing: Framing,
    ) -> Result<reqwest::Response, ProxyError> {
        let url = self.url(model, Some(framing));
        tracing::debug!("POST {} (streaming, model {})", url, model);

        let response = self
            .request(&url, credential)
            .header(
                "Accept",
                if framing == Framing::Sse {
                    "text/event-stream"
                } else {
                    "application/json"
                },
            )
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Upstream stream {} returned {}", url, status);
            return Err(ProxyError::UpstreamHttp {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }

    pub fn decoder(&self, framing: Framing) -> FrameDecoder {
        FrameDecoder::new(framing, self.capability.delta_schema())
    }

    /// Open a stream and relay its text deltas.
    pub async fn stream_text(
        &self,
        model: &str,
        body: &Value,
        credential: &ResolvedCredential,
        framing: Framing,
        cancel: CancellationToken,
    ) -> Result<RelayStream, ProxyError> {
        let response = self.open_stream(model, body, credential, framing).await?;
        Ok(stream::relay_text(
            response.bytes_stream(),
            self.decoder(framing),
            cancel,
        ))
    }

    /// Open a stream and relay its bytes untouched.
    pub async fn stream_raw(
        &self,
        model: &str,
        body: &Value,
        credential: &ResolvedCredential,
        cancel: CancellationToken,
    ) -> Result<RelayStream, ProxyError> {
        let response = self.open_stream(model, body, credential, Framing::Sse).await?;
        Ok(stream::relay_raw(response.bytes_stream(), cancel))
    }
}

/// `error.message` from a JSON error body, else the raw body, else the
/// status reason.
fn upstream_error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Upstream request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
