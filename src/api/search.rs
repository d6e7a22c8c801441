// Web search client (Google Programmable Search)

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::proxy::{ProxyError, ResolvedCredential};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    http_client: reqwest::Client,
    base_url: String,
    num_results: u32,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(
        http_client: reqwest::Client,
        base_url: &str,
        num_results: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            num_results,
            timeout,
        }
    }

    pub async fn search(
        &self,
        key: &ResolvedCredential,
        engine_id: &str,
        query: &str,
    ) -> Result<Vec<SearchHit>, ProxyError> {
        let url = format!(
            "{}/customsearch/v1?cx={}&q={}&num={}",
            self.base_url,
            urlencoding::encode(engine_id),
            urlencoding::encode(query),
            self.num_results
        );

        let response = self
            .http_client
            .get(&url)
            .header("x-goog-api-key", key.value())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::MalformedResponse(e.to_string()))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            tracing::warn!("Search API returned {}: {}", status, message);
            return Err(ProxyError::UpstreamHttp {
                status: if status.is_success() { 500 } else { status.as_u16() },
                message,
            });
        }

        let hits = match body.get("items") {
            Some(items) => serde_json::from_value(items.clone())
                .map_err(|e| ProxyError::MalformedResponse(e.to_string()))?,
            None => Vec::new(),
        };
        Ok(hits)
    }
}

/// Render hits as numbered blocks for the caller.
pub fn format_results(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "ID: {}\nTITLE: {}\nURL: {}\nSNIPPET: {}",
                i + 1,
                hit.title,
                hit.link,
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
