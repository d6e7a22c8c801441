// Configuration module for the DocuMate gateway

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::proxy::router::RotationOrder;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "DOCUMATE_CONFIG";

const GROQ_MODELS: &[&str] = &[
    "qwen/qwen3-32b",
    "llama-3.1-8b-instant",
    "meta-llama/llama-4-maverick-17b-128e-instruct",
    "meta-llama/llama-4-scout-17b-16e-instruct",
    "meta-llama/llama-guard-4-12b",
    "meta-llama/llama-prompt-guard-2-22m",
    "meta-llama/llama-prompt-guard-2-86m",
    "moonshotai/kimi-k2-instruct-0905",
];

const FLASHCARD_MODELS: &[&str] = &[
    "gemini-2.5-flash-lite",
    "gemini-live-2.5-flash-preview",
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.0-flash-live-001",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];

const GRADER_MODELS: &[&str] = &["gemini-2.0-flash", "gemini-1.5-pro", "gemini-1.5-flash"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Caller-supplied keys must be longer than this to be used.
    #[serde(default = "default_caller_key_min_len")]
    pub caller_key_min_len: usize,

    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    #[serde(default = "default_citation_scrape")]
    pub citation_scrape: ScrapeConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            caller_key_min_len: default_caller_key_min_len(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            providers: ProvidersConfig::default(),
            endpoints: EndpointsConfig::default(),
            search: SearchConfig::default(),
            scrape: ScrapeConfig::default(),
            citation_scrape: default_citation_scrape(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_caller_key_min_len() -> usize {
    20
}

fn default_upstream_timeout_secs() -> u64 {
    120
}

fn default_citation_scrape() -> ScrapeConfig {
    ScrapeConfig {
        max_urls: 10,
        timeout_ms: 6000,
        user_agent: "Mozilla/5.0 (compatible; DocuMate/1.0)".to_string(),
        max_content_chars: Some(3000),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProvidersConfig {
    pub gemini_base_url: String,
    pub groq_base_url: String,
    pub search_base_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
            groq_base_url: "https://api.groq.com/openai/v1".to_string(),
            search_base_url: "https://www.googleapis.com".to_string(),
        }
    }
}

/// Per-endpoint upstream settings: which secret to use, whether callers may
/// bring their own key, and the candidate models to rotate through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EndpointProfile {
    pub secret: String,
    #[serde(default)]
    pub allow_caller_key: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub rotation: RotationOrder,
}

impl EndpointProfile {
    fn new(secret: &str, allow_caller_key: bool, models: &[&str], rotation: RotationOrder) -> Self {
        Self {
            secret: secret.to_string(),
            allow_caller_key,
            models: models.iter().map(|m| m.to_string()).collect(),
            rotation,
        }
    }

    /// First configured model, used by single-model endpoints.
    pub fn primary_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EndpointsConfig {
    pub chat: EndpointProfile,
    pub generate: EndpointProfile,
    pub stream: EndpointProfile,
    pub agent: EndpointProfile,
    pub humanize: EndpointProfile,
    pub grade: EndpointProfile,
    pub rubric_grade: EndpointProfile,
    pub flashcards: EndpointProfile,
    pub quiz: EndpointProfile,
    pub study_guide: EndpointProfile,
    pub citation: EndpointProfile,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        use RotationOrder::{Ordered, Shuffled};
        Self {
            chat: EndpointProfile::new("HUMANIZER_1", false, &[], Ordered),
            generate: EndpointProfile::new("DOCUMATE_GEMINI_1", true, &["gemini-2.0-flash"], Ordered),
            stream: EndpointProfile::new("DOCUMATE_GEMINI_1", true, &[], Ordered),
            agent: EndpointProfile::new("AGENT_1", true, &[], Ordered),
            humanize: EndpointProfile::new("GROQ_API_KEY", true, GROQ_MODELS, Ordered),
            grade: EndpointProfile::new("GEMINI_API_KEY", true, GRADER_MODELS, Ordered),
            rubric_grade: EndpointProfile::new("GRADER_1", false, &["gemini-1.5-flash"], Ordered),
            flashcards: EndpointProfile::new("FLASHCARD_1", false, FLASHCARD_MODELS, Shuffled),
            quiz: EndpointProfile::new("QUIZ_1", false, &[], Ordered),
            study_guide: EndpointProfile::new("GEMINI_API_KEY", false, &[], Ordered),
            citation: EndpointProfile::new("GROQ_API_KEY", true, GROQ_MODELS, Ordered),
        }
    }
}

impl EndpointsConfig {
    fn profiles(&self) -> [&EndpointProfile; 11] {
        [
            &self.chat,
            &self.generate,
            &self.stream,
            &self.agent,
            &self.humanize,
            &self.grade,
            &self.rubric_grade,
            &self.flashcards,
            &self.quiz,
            &self.study_guide,
            &self.citation,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SearchConfig {
    pub key_secret: String,
    pub engine_secret: String,
    pub num_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            key_secret: "DOCUMATE_SEARCH_1".to_string(),
            engine_secret: "DOCUMATE_SEARCHID_1".to_string(),
            num_results: 10,
        }
    }
}

/// Limits for a concurrent page fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScrapeConfig {
    pub max_urls: usize,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub max_content_chars: Option<usize>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_urls: 8,
            timeout_ms: 4000,
            user_agent: "Mozilla/5.0 (compatible; DocuMateBot/1.0)".to_string(),
            max_content_chars: None,
        }
    }
}

impl ScrapeConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl GatewayConfig {
    /// Load the config from `DOCUMATE_CONFIG`, the per-user config dir, or
    /// built-in defaults, then apply host/port environment overrides.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::info!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        tracing::info!("Config loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("DOCUMATE_HOST") {
            if !host.trim().is_empty() {
                self.host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("DOCUMATE_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid DOCUMATE_PORT value: {}", port))?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        };
        format!("{}:{}", host, self.port)
    }

    /// Every environment secret name referenced by this config.
    pub fn secret_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .endpoints
            .profiles()
            .iter()
            .map(|p| p.secret.as_str())
            .collect();
        names.push(&self.search.key_secret);
        names.push(&self.search.engine_secret);
        names.sort_unstable();
        names.dedup();
        names
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("documate-gateway").join("config.yaml"))
}

/// Snapshot of secret values taken once at start-up.
#[derive(Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    pub fn from_env(config: &GatewayConfig) -> Self {
        let mut secrets = Self::default();
        for name in config.secret_names() {
            match std::env::var(name) {
                Ok(value) => secrets = secrets.with(name, value),
                Err(_) => tracing::warn!("Secret {} is not set", name),
            }
        }
        secrets
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.values.insert(name.into(), value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Secrets").field("names", &names).finish()
    }
}
