// Research tools: page scraping, web search and citation building

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::search::format_results;
use super::{ApiError, AppState, JsonBody};
use crate::proxy::schema::strip_code_fence;
use crate::proxy::translator::{ChatMessage, ChatRequest};
use crate::proxy::{non_empty, ProxyError, ResolvedCredential, Rotation};

const QUERY_CONTEXT_CHARS: usize = 200;
const DEFAULT_CITATION_STYLE: &str = "APA";

#[derive(Debug, Deserialize)]
pub struct ScrapeBody {
    pub urls: Option<Value>,
}

/// Fetch each URL concurrently. Per-page failures are reported inline.
pub async fn scrape(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ScrapeBody>,
) -> Result<Json<Value>, ApiError> {
    let Some(Value::Array(items)) = request.urls else {
        return Err(ApiError::bad_request("No URLs provided"));
    };

    let results = state.pages.scrape_all(&items).await;
    let loaded = results.iter().filter(|r| r.is_ok()).count();
    tracing::info!("Scraped {}/{} pages", loaded, results.len());

    Ok(Json(json!({ "results": results })))
}

/// Search API key and engine id, both server-held.
fn search_keys(state: &AppState) -> Result<(ResolvedCredential, ResolvedCredential), ProxyError> {
    let search = &state.config.search;
    let key = state.credentials.server_secret(&search.key_secret)?;
    let engine = state.credentials.server_secret(&search.engine_secret)?;
    Ok((key, engine))
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<SearchBody>,
) -> Result<Json<Value>, ApiError> {
    let (key, engine) = search_keys(&state)
        .map_err(|_| ApiError::internal("Configuration Error: Search keys missing on server."))?;

    let Some(query) = request.query.as_deref().filter(|q| !q.trim().is_empty()) else {
        return Err(ApiError::bad_request("Query is required."));
    };

    let hits = state
        .search
        .search(&key, engine.value(), query)
        .await
        .map_err(|e| match e {
            ProxyError::UpstreamHttp { message, .. } => {
                ApiError::internal(format!("Google Search Error: {}", message))
            }
            other => ApiError::internal(format!("Server Error: {}", other.detail())),
        })?;

    if hits.is_empty() {
        return Ok(Json(json!({ "results": [] })));
    }
    Ok(Json(json!({ "results": format_results(&hits) })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationBody {
    pub context: Option<String>,
    pub style: Option<String>,
    pub output_type: Option<String>,
    pub api_key: Option<String>,
}

fn query_prompt(context: &str) -> String {
    let excerpt: String = context.chars().take(QUERY_CONTEXT_CHARS).collect();
    format!(
        "Generate a google search query for: \"{}\". Return ONLY the query string.",
        excerpt
    )
}

fn clean_query(raw: &str) -> Result<String, ProxyError> {
    let query = raw.replace('"', "").trim().to_string();
    if query.is_empty() {
        return Err(ProxyError::MalformedResponse(
            "model returned an empty search query".to_string(),
        ));
    }
    Ok(query)
}

fn bibliography_prompt(style: &str, today: &str, sources: &str) -> String {
    format!(
        "Create a bibliography in {} style for these sources. Include \"Accessed {}\". Return plain text list. Sources: {}",
        style, today, sources
    )
}

fn insertion_prompt(context: &str, style: &str, today: &str, sources: &str) -> String {
    format!(
        "Insert citations into text: \"{context}\".\n\
         Style: {style}. Sources: {sources}.\n\
         Rules: Cite EVERY sentence. Return JSON: {{ \"insertions\": [{{ \"anchor\": \"phrase\", \"source_id\": 1, \"citation_text\": \"...\" }}], \"formatted_citations\": {{ \"1\": \"Full Citation (Accessed {today})\" }} }}"
    )
}

fn parse_insertions(text: &str) -> Result<Value, ProxyError> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ProxyError::MalformedResponse(format!("citation result is not JSON: {}", e)))
}

fn citation_failure(e: ProxyError) -> ApiError {
    match e {
        ProxyError::Validation(msg) => ApiError::bad_request(msg).envelope(),
        other => ApiError::internal(other.detail()).envelope(),
    }
}

/// Four-step pipeline: a model writes a search query, the search results
/// are fetched as sources, then a model formats citations from them.
pub async fn citation(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CitationBody>,
) -> Result<Json<Value>, ApiError> {
    let profile = &state.config.endpoints.citation;
    let credential = state
        .credential(profile, request.api_key.as_deref())
        .map_err(citation_failure)?;
    let (search_key, engine) = search_keys(&state).map_err(citation_failure)?;

    let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) else {
        return Err(ApiError::bad_request("Context is required.").envelope());
    };
    let style = request
        .style
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CITATION_STYLE);
    let bibliography = request.output_type.as_deref() == Some("bibliography");

    let chat = &state.chat;
    let credential = &credential;

    let prompt = query_prompt(context);
    let prompt = &prompt;
    let query = Rotation::new(&profile.models, profile.rotation)
        .run(move |model| async move {
            let body = ChatRequest::new(model.as_str(), vec![ChatMessage::user(prompt.as_str())])
                .into_value();
            clean_query(&chat.send_text(&model, &body, credential).await?)
        })
        .await
        .map_err(citation_failure)?
        .value;
    tracing::info!("Citation search query: {}", query);

    let hits = state
        .search
        .search(&search_key, engine.value(), &query)
        .await
        .map_err(citation_failure)?;
    let links: Vec<String> = hits.into_iter().map(|hit| hit.link).collect();

    let sources = state.citation_pages.collect_sources(&links).await;
    let source_context = serde_json::to_string(&sources)
        .map_err(|e| ApiError::internal(e.to_string()).envelope())?;

    let today = chrono::Local::now().format("%B %-d, %Y").to_string();
    let prompt = if bibliography {
        bibliography_prompt(style, &today, &source_context)
    } else {
        insertion_prompt(context, style, &today, &source_context)
    };
    let prompt = &prompt;

    let result = Rotation::new(&profile.models, profile.rotation)
        .run(move |model| async move {
            let mut request =
                ChatRequest::new(model.as_str(), vec![ChatMessage::user(prompt.as_str())]);
            if !bibliography {
                request = request.json_mode();
            }
            let text = chat.send_text(&model, &request.into_value(), credential).await?;
            if bibliography {
                non_empty(text).map(Value::String)
            } else {
                parse_insertions(&text)
            }
        })
        .await
        .map_err(citation_failure)?
        .value;

    Ok(Json(json!({
        "success": true,
        "sources": sources,
        "result": result
    })))
}
