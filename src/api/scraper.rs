// Page fetcher - concurrent fetch of web pages with per-URL timeouts

use std::collections::HashMap;

use ::scraper::{ElementRef, Html, Node, Selector};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::ScrapeConfig;

/// Elements dropped before text extraction on the scrape endpoint.
pub const SCRAPE_STRIP: &[&str] = &["script", "style", "nav", "footer", "svg", "noscript"];

/// Elements dropped before text extraction when gathering citation sources.
pub const CITATION_STRIP: &[&str] = &["script", "style", "nav", "footer", "svg", "header"];

const SUMMARY_THRESHOLD_WORDS: usize = 500;
const SUMMARY_HEAD_WORDS: usize = 400;
const SUMMARY_TAIL_WORDS: usize = 100;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));
static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMeta {
    pub author: String,
    pub date: String,
    pub site: String,
}

/// Text and metadata pulled out of one HTML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub title: String,
    pub meta: PageMeta,
    pub text: String,
}

impl Page {
    pub fn parse(html: &str, strip: &[&str]) -> Self {
        let document = Html::parse_document(html);
        let title = document
            .select(&TITLE)
            .next()
            .map(|t| collapse_whitespace(&t.text().collect::<String>()))
            .unwrap_or_default();

        let root = document
            .select(&BODY)
            .next()
            .unwrap_or_else(|| document.root_element());
        let mut text = String::new();
        collect_text(root, strip, &mut text);

        Self {
            title,
            meta: extract_meta(&document),
            text: collapse_whitespace(&text),
        }
    }
}

/// Text nodes under `element`, skipping stripped subtrees and comments.
fn collect_text(element: ElementRef<'_>, strip: &[&str], out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) if strip.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, strip, out);
                }
            }
            _ => {}
        }
    }
}

fn extract_meta(document: &Html) -> PageMeta {
    let mut by_key: HashMap<String, String> = HashMap::new();
    for tag in document.select(&META) {
        let element = tag.value();
        let key = element.attr("name").or_else(|| element.attr("property"));
        if let (Some(key), Some(content)) = (key, element.attr("content")) {
            by_key
                .entry(key.to_ascii_lowercase())
                .or_insert_with(|| content.trim().to_string());
        }
    }

    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| by_key.get(*k).filter(|v| !v.is_empty()).cloned())
            .unwrap_or_default()
    };
    PageMeta {
        author: pick(&["author", "article:author"]),
        date: pick(&["date", "article:published_time"]),
        site: pick(&["og:site_name"]),
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Whole text when short, otherwise the opening and closing words.
pub fn summarize_words(text: &str) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    if words.len() < SUMMARY_THRESHOLD_WORDS {
        return text.to_string();
    }
    format!(
        "{} ... [SECTION SKIPPED] ... {}",
        words[..SUMMARY_HEAD_WORDS].join(" "),
        words[words.len() - SUMMARY_TAIL_WORDS..].join(" ")
    )
}

/// Per-URL result of a scrape fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScrapeOutcome {
    Ok {
        url: String,
        meta: PageMeta,
        content: String,
    },
    Failed {
        url: String,
        error: String,
    },
}

impl ScrapeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, ScrapeOutcome::Ok { .. })
    }

    /// A `urls` entry that is not a string, echoed back as JSON text.
    pub fn invalid(entry: &Value) -> Self {
        ScrapeOutcome::Failed {
            url: entry.to_string(),
            error: "Invalid URL".to_string(),
        }
    }
}

/// A fetched page numbered for citation prompts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: usize,
    pub title: String,
    pub link: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct PageFetcher {
    http_client: reqwest::Client,
    config: ScrapeConfig,
}

impl PageFetcher {
    pub fn new(http_client: reqwest::Client, config: ScrapeConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// GET one page, bounded by the configured timeout.
    pub async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let fetch = async {
            let response = self
                .http_client
                .get(url)
                .header("User-Agent", &self.config.user_agent)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err("Failed to load".to_string());
            }
            response.text().await.map_err(|e| e.to_string())
        };

        match tokio::time::timeout(self.config.timeout(), fetch).await {
            Ok(result) => result,
            Err(_) => Err(format!("Timed out after {} ms", self.config.timeout_ms)),
        }
    }

    pub async fn scrape(&self, url: &str) -> ScrapeOutcome {
        match self.fetch_html(url).await {
            Ok(html) => {
                let page = Page::parse(&html, SCRAPE_STRIP);
                ScrapeOutcome::Ok {
                    url: url.to_string(),
                    meta: page.meta,
                    content: summarize_words(&page.text),
                }
            }
            Err(error) => {
                tracing::warn!("Scrape of {} failed: {}", url, error);
                ScrapeOutcome::Failed {
                    url: url.to_string(),
                    error,
                }
            }
        }
    }

    /// Scrape up to `max-urls` entries concurrently. Results keep input order
    /// and a failed or non-string entry never fails the batch.
    pub async fn scrape_all(&self, entries: &[Value]) -> Vec<ScrapeOutcome> {
        let batch = entries.iter().take(self.config.max_urls);
        join_all(batch.map(|entry| async move {
            match entry.as_str() {
                Some(url) => self.scrape(url).await,
                None => ScrapeOutcome::invalid(entry),
            }
        }))
        .await
    }

    /// Fetch pages for citation, keeping only the ones that loaded and
    /// numbering them from 1.
    pub async fn collect_sources(&self, urls: &[String]) -> Vec<Source> {
        let batch = urls.iter().take(self.config.max_urls);
        let pages = join_all(batch.map(|url| async move {
            match self.fetch_html(url).await {
                Ok(html) => Some((url.clone(), Page::parse(&html, CITATION_STRIP))),
                Err(e) => {
                    tracing::debug!("Skipping source {}: {}", url, e);
                    None
                }
            }
        }))
        .await;

        pages
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(i, (link, page))| Source {
                id: i + 1,
                title: if page.title.is_empty() {
                    "Untitled".to_string()
                } else {
                    page.title
                },
                link,
                content: truncate_chars(&page.text, self.config.max_content_chars),
            })
            .collect()
    }
}

fn truncate_chars(text: &str, limit: Option<usize>) -> String {
    match limit {
        Some(limit) => text.chars().take(limit).collect(),
        None => text.to_string(),
    }
}
