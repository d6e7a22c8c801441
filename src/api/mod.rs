// HTTP API Server module

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    handler::Handler,
    http::{Method, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{EndpointProfile, GatewayConfig, Secrets};
use crate::proxy::postprocess::PostProcessor;
use crate::proxy::{Capability, CredentialResolver, ProxyError, ResolvedCredential, UpstreamProxy};

pub mod error;
mod handlers;
mod research;
pub mod scraper;
pub mod search;
mod study;
mod writing;

pub use error::{ApiError, JsonBody};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable per-process state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub credentials: CredentialResolver,
    pub gemini: UpstreamProxy,
    pub chat: UpstreamProxy,
    pub pages: scraper::PageFetcher,
    pub citation_pages: scraper::PageFetcher,
    pub search: search::SearchClient,
    pub postprocessor: PostProcessor,
}

impl AppState {
    pub fn new(config: GatewayConfig, secrets: Secrets) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        let timeout = Duration::from_secs(config.upstream_timeout_secs);

        Self {
            credentials: CredentialResolver::new(Arc::new(secrets), config.caller_key_min_len),
            gemini: UpstreamProxy::new(
                Capability::GenerateContent,
                &config.providers.gemini_base_url,
                http_client.clone(),
                timeout,
            ),
            chat: UpstreamProxy::new(
                Capability::Chat,
                &config.providers.groq_base_url,
                http_client.clone(),
                timeout,
            ),
            pages: scraper::PageFetcher::new(http_client.clone(), config.scrape.clone()),
            citation_pages: scraper::PageFetcher::new(
                http_client.clone(),
                config.citation_scrape.clone(),
            ),
            search: search::SearchClient::new(
                http_client,
                &config.providers.search_base_url,
                config.search.num_results,
                timeout,
            ),
            postprocessor: PostProcessor::new(),
            config: Arc::new(config),
        }
    }

    /// Resolve the key for one endpoint, honouring its caller-key policy.
    pub fn credential(
        &self,
        profile: &EndpointProfile,
        caller_key: Option<&str>,
    ) -> Result<ResolvedCredential, ProxyError> {
        let caller_key = caller_key.filter(|_| profile.allow_caller_key);
        self.credentials.resolve(caller_key, &profile.secret)
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not Found")
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok"
    }))
}

/// POST-only route: OPTIONS answers a bare 200, anything else is a 405.
fn endpoint<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    post(handler).options(preflight).fallback(method_not_allowed)
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "request",
            id = %uuid::Uuid::new_v4(),
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    Router::new()
        .route("/", get(root))
        .route("/api/chat", endpoint(handlers::chat))
        .route("/api/generate", endpoint(handlers::generate))
        .route("/api/stream", endpoint(handlers::stream))
        .route("/api/agent", endpoint(handlers::agent))
        .route("/api/humanize", endpoint(writing::humanize))
        .route("/api/grade", endpoint(writing::grade))
        .route("/api/grade/rubric", endpoint(writing::grade_rubric))
        .route("/api/flashcards", endpoint(study::flashcards))
        .route("/api/quiz", endpoint(study::quiz))
        .route("/api/study-guide", endpoint(study::study_guide))
        .route("/api/scrape", endpoint(research::scrape))
        .route("/api/search", endpoint(research::search))
        .route("/api/citation", endpoint(research::citation))
        .fallback(not_found)
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

pub async fn start_server(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("API server stopped");
        })
        .await?;

    Ok(())
}
