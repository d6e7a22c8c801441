// Credential resolution - caller-supplied key or server secret

use std::fmt;
use std::sync::Arc;

use super::ProxyError;
use crate::config::Secrets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    CallerSupplied,
    ServerEnv,
}

/// A key chosen for exactly one upstream call. The value never appears in
/// `Debug` output.
#[derive(Clone)]
pub struct ResolvedCredential {
    pub source: CredentialSource,
    value: String,
}

impl ResolvedCredential {
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("source", &self.source)
            .field("value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CredentialResolver {
    secrets: Arc<Secrets>,
    min_caller_key_len: usize,
}

impl CredentialResolver {
    pub fn new(secrets: Arc<Secrets>, min_caller_key_len: usize) -> Self {
        Self {
            secrets,
            min_caller_key_len,
        }
    }

    /// Pick the caller key when it looks real, else the named secret.
    pub fn resolve(
        &self,
        caller_key: Option<&str>,
        secret_name: &str,
    ) -> Result<ResolvedCredential, ProxyError> {
        if let Some(key) = caller_key.map(str::trim) {
            if key.chars().count() > self.min_caller_key_len {
                return Ok(ResolvedCredential {
                    source: CredentialSource::CallerSupplied,
                    value: key.to_string(),
                });
            }
            if !key.is_empty() {
                tracing::debug!("Ignoring implausible caller-supplied key");
            }
        }

        match self.secrets.get(secret_name) {
            Some(value) => Ok(ResolvedCredential {
                source: CredentialSource::ServerEnv,
                value: value.to_string(),
            }),
            None => {
                tracing::error!("Secret {} is not configured", secret_name);
                Err(ProxyError::Configuration(format!(
                    "Server configuration error: {} is not set",
                    secret_name
                )))
            }
        }
    }

    /// Look up a secret that has no caller override.
    pub fn server_secret(&self, secret_name: &str) -> Result<ResolvedCredential, ProxyError> {
        self.resolve(None, secret_name)
    }
}
