// Proxy module - credential resolution, model rotation, stream relay and
// the payload/response shaping shared by every handler

pub mod credential;
pub mod postprocess;
pub mod router;
pub mod schema;
pub mod stream;
pub mod translator;
pub mod upstream;

use thiserror::Error;

pub use credential::{CredentialResolver, CredentialSource, ResolvedCredential};
pub use router::{AttemptOutcome, CandidateAttempt, Rotated, Rotation, RotationOrder};
pub use upstream::{Capability, UpstreamProxy};

/// Failure taxonomy shared by the upstream proxy and the rotation engine.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("upstream returned {status}: {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("all {attempts} candidates failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        last: Box<ProxyError>,
    },
}

impl ProxyError {
    /// HTTP status a single-provider handler should answer with.
    pub fn status(&self) -> u16 {
        match self {
            ProxyError::Validation(_) => 400,
            ProxyError::UpstreamHttp { status, .. } => *status,
            ProxyError::Configuration(_)
            | ProxyError::MalformedResponse(_)
            | ProxyError::Network(_)
            | ProxyError::Exhausted { .. } => 500,
        }
    }

    /// Message without the variant prefix, as shown to callers.
    pub fn detail(&self) -> String {
        match self {
            ProxyError::UpstreamHttp { message, .. } => message.clone(),
            ProxyError::Exhausted { last, .. } => last.detail(),
            other => other.to_string(),
        }
    }

    /// Whether the rotation engine should move on to the next candidate.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamHttp { .. }
                | ProxyError::MalformedResponse(_)
                | ProxyError::Network(_)
        )
    }
}

/// A 2xx answer with no usable text is a soft failure, so the rotation
/// moves on to the next model.
pub fn non_empty(text: String) -> Result<String, ProxyError> {
    if text.trim().is_empty() {
        Err(ProxyError::MalformedResponse("model returned empty text".to_string()))
    } else {
        Ok(text)
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Network(format!("request timed out: {}", e))
        } else {
            ProxyError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::Configuration("x".into()).status(), 500);
        assert_eq!(ProxyError::Validation("x".into()).status(), 400);
        assert_eq!(
            ProxyError::UpstreamHttp {
                status: 429,
                message: "quota".into()
            }
            .status(),
            429
        );
        assert_eq!(ProxyError::Network("reset".into()).status(), 500);
    }

    #[test]
    fn test_exhausted_embeds_last_error() {
        let err = ProxyError::Exhausted {
            attempts: 3,
            last: Box::new(ProxyError::UpstreamHttp {
                status: 503,
                message: "overloaded".into(),
            }),
        };
        assert!(err.to_string().contains("overloaded"));
        assert_eq!(err.detail(), "overloaded");
    }

    #[test]
    fn test_empty_model_text_is_soft_failure() {
        let err = non_empty(" \n ".to_string()).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedResponse(_)));
        assert!(err.is_retryable());
        assert_eq!(non_empty("ok".to_string()).unwrap(), "ok");
    }

    #[test]
    fn test_configuration_is_not_retryable() {
        assert!(!ProxyError::Configuration("missing".into()).is_retryable());
        assert!(ProxyError::MalformedResponse("empty".into()).is_retryable());
    }
}
