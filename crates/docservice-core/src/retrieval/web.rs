//! DuckDuckGo text-search retriever.
//!
//! Queries the HTML endpoint, which answers ordinary questions with ranked
//! results (the Instant Answer API only covers encyclopedic topics), and
//! scrapes titles, snippets, and target URLs out of the result page.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use tracing::debug;

use super::{Retriever, NO_RESULTS};
use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs;

pub const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Web context from DuckDuckGo text search.
#[derive(Debug, Clone)]
pub struct DuckDuckGoRetriever {
    endpoint: String,
    max_results: usize,
    http: Client,
}

impl DuckDuckGoRetriever {
    pub fn new(max_results: usize, timeout: Duration) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, max_results, timeout)
    }

    pub fn with_endpoint(endpoint: &str, max_results: usize, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("docservice/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            max_results,
            http,
        })
    }

    async fn fetch(&self, query: &str) -> std::result::Result<String, reqwest::Error> {
        self.http
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl Retriever for DuckDuckGoRetriever {
    async fn retrieve(&self, query: &str) -> String {
        match self.fetch(query).await {
            Ok(page) => format_results(&page, self.max_results),
            Err(e) => {
                METRICS.inc_backend_failures();
                obs::emit_backend_failure("web_search", &e.to_string());
                NO_RESULTS.to_string()
            }
        }
    }
}

/// One organic search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

fn title_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a\s[^>]*class="[^"]*result__a[^"]*"[^>]*>(.*?)</a>"#)
            .expect("result title pattern is valid")
    })
}

fn snippet_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<(?:a|td|div|span)\s[^>]*class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|td|div|span)>"#)
            .expect("result snippet pattern is valid")
    })
}

fn href_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]*)""#).expect("href pattern is valid"))
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

/// Pull up to `max_results` hits out of a result page. A snippet belongs to
/// the title before it; hits without any text are skipped.
pub fn parse_results(page: &str, max_results: usize) -> Vec<SearchHit> {
    let titles: Vec<_> = title_pattern().captures_iter(page).collect();
    let mut hits = Vec::new();

    for (i, caps) in titles.iter().enumerate() {
        if hits.len() >= max_results {
            break;
        }
        let (Some(anchor), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let block_end = titles
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(page.len());
        let snippet = snippet_pattern()
            .captures(&page[anchor.end()..block_end])
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()))
            .unwrap_or_default();
        let url = href_pattern()
            .captures(anchor.as_str())
            .and_then(|c| c.get(1))
            .map(|m| target_url(&decode_entities(m.as_str())))
            .unwrap_or_default();

        let title = clean_text(inner.as_str());
        if title.is_empty() && snippet.is_empty() {
            continue;
        }
        hits.push(SearchHit {
            title,
            snippet,
            url,
        });
    }
    hits
}

/// Render hits as `Title / Summary / Source` blocks.
pub fn format_results(page: &str, max_results: usize) -> String {
    let hits = parse_results(page, max_results);
    debug!(results = hits.len(), "web search formatted");
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "Title: {}\nSummary: {}\nSource: {}\n",
                hit.title, hit.snippet, hit.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Result links go through a redirect; the real target is its `uddg` parameter.
fn target_url(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
            .unwrap_or(absolute),
        Err(_) => href.to_string(),
    }
}

fn clean_text(fragment: &str) -> String {
    let stripped = tag_pattern().replace_all(fragment, "");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
