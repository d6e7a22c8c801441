// Model rotation - tries candidate models one at a time until one succeeds

use std::future::Future;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::ProxyError;

/// How the candidate list is arranged before a rotation starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationOrder {
    /// Configured order, first entry is the preferred model
    #[default]
    Ordered,
    /// Fresh random order per request to spread load across models
    Shuffled,
}

impl RotationOrder {
    pub fn arrange(&self, models: &[String]) -> Vec<String> {
        let mut arranged = models.to_vec();
        if *self == RotationOrder::Shuffled {
            arranged.shuffle(&mut rand::rng());
        }
        arranged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    HttpError(u16),
    /// 2xx with an unusable body
    SoftFailure,
    NetworkError,
}

impl AttemptOutcome {
    fn from_error(err: &ProxyError) -> Self {
        match err {
            ProxyError::UpstreamHttp { status, .. } => AttemptOutcome::HttpError(*status),
            ProxyError::Network(_) => AttemptOutcome::NetworkError,
            _ => AttemptOutcome::SoftFailure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAttempt {
    pub model: String,
    pub outcome: AttemptOutcome,
}

/// Result of a successful rotation.
#[derive(Debug)]
pub struct Rotated<T> {
    pub model: String,
    pub value: T,
    pub attempts: Vec<CandidateAttempt>,
}

#[derive(Debug, Clone)]
pub struct Rotation {
    candidates: Vec<String>,
}

impl Rotation {
    pub fn new(models: &[String], order: RotationOrder) -> Self {
        Self {
            candidates: order.arrange(models),
        }
    }

    /// Attempt each candidate in sequence, stopping at the first success.
    ///
    /// Upstream HTTP errors, malformed bodies and network failures move on to
    /// the next candidate. Configuration and validation errors abort at once
    /// since no other model would fare better.
    pub async fn run<T, F, Fut>(self, mut attempt: F) -> Result<Rotated<T>, ProxyError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ProxyError>>,
    {
        if self.candidates.is_empty() {
            return Err(ProxyError::Configuration(
                "No candidate models configured".to_string(),
            ));
        }

        let total = self.candidates.len();
        let mut attempts: Vec<CandidateAttempt> = Vec::with_capacity(total);
        let mut last_error: Option<ProxyError> = None;

        for model in self.candidates {
            attempts.push(CandidateAttempt {
                model: model.clone(),
                outcome: AttemptOutcome::Pending,
            });
            let index = attempts.len() - 1;

            tracing::debug!("Trying model {} ({}/{})", model, index + 1, total);
            match attempt(model.clone()).await {
                Ok(value) => {
                    attempts[index].outcome = AttemptOutcome::Success;
                    if index > 0 {
                        tracing::info!("Model {} succeeded after {} failures", model, index);
                    }
                    return Ok(Rotated {
                        model,
                        value,
                        attempts,
                    });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Model {} failed: {}", model, e);
                    attempts[index].outcome = AttemptOutcome::from_error(&e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last = last_error.unwrap_or_else(|| {
            ProxyError::MalformedResponse("no candidate produced a result".to_string())
        });
        tracing::error!("All {} candidate models failed", total);
        Err(ProxyError::Exhausted {
            attempts: total,
            last: Box::new(last),
        })
    }
}
