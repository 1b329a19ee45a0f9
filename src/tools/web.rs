//! Web access tools: URL fetching and search.
//!
//! Shared plumbing lives in [`WebClient`]: one reqwest client, an LRU
//! response cache, and a token-bucket rate limiter so a chatty model can't
//! hammer remote hosts.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use lru::LruCache;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Mutex;
use url::Url;

use super::{ToolArgs, ToolExecutor};

const MAX_FETCH_CHARS: usize = 50_000;
const MAX_SEARCH_RESULTS: usize = 10;
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const CACHE_SIZE: usize = 32;
const USER_AGENT: &str = "artifice/0.1";

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Shared HTTP state for the web tools.
pub struct WebClient {
    http: reqwest::Client,
    cache: Mutex<LruCache<String, String>>,
    limiter: DirectLimiter,
}

impl WebClient {
    pub fn new() -> Self {
        let quota = Quota::per_minute(std::num::NonZeroU32::new(30).expect("nonzero"));
        Self {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("reqwest client"),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_SIZE).expect("nonzero"),
            )),
            limiter: RateLimiter::direct(quota),
        }
    }

    async fn get(&self, url: &str) -> Result<String, String> {
        if let Some(cached) = self.cache.lock().expect("cache poisoned").get(url) {
            return Ok(cached.clone());
        }

        self.limiter
            .check()
            .map_err(|_| "Error: web request rate limit exceeded, try again shortly".to_string())?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Error fetching URL: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("Error fetching URL: HTTP {}", response.status()));
        }

        let html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|e| format!("Error reading response: {e}"))?;

        let text = if html { html2md::parse_html(&body) } else { body };

        self.cache
            .lock()
            .expect("cache poisoned")
            .put(url.to_string(), text.clone());
        Ok(text)
    }
}

impl Default for WebClient {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("Error: Invalid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(format!(
                "Error: Invalid URL scheme '{other}'. Only http and https are supported."
            ))
        }
    }
    if url.host_str().is_none() {
        return Err("Error: Invalid URL: missing network location (domain).".to_string());
    }
    Ok(url)
}

fn truncate_chars(text: String) -> String {
    if text.chars().count() <= MAX_FETCH_CHARS {
        return text;
    }
    let total = text.chars().count();
    let mut out: String = text.chars().take(MAX_FETCH_CHARS).collect();
    out.push_str(&format!("\n... (truncated, {total} total chars)"));
    out
}

/// `web_fetch` — fetch a URL, converting HTML to markdown.
pub struct WebFetchTool(pub Arc<WebClient>);

#[async_trait]
impl ToolExecutor for WebFetchTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let raw = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| "Error: missing required argument 'url'".to_string())?;
        let url = validate_url(raw)?;
        tracing::debug!("fetching url: {url}");
        let text = self.0.get(url.as_str()).await?;
        Ok(truncate_chars(text))
    }
}

/// `web_search` — DuckDuckGo HTML search, scraped into a result list.
pub struct WebSearchTool(pub Arc<WebClient>);

#[async_trait]
impl ToolExecutor for WebSearchTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| "Error: missing required argument 'query'".to_string())?;
        tracing::debug!("web search: {query}");

        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );

        // Bypass the markdown conversion: we want the raw result markup.
        self.0.limiter.check().map_err(|_| {
            "Error: web request rate limit exceeded, try again shortly".to_string()
        })?;
        let response = self
            .0
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("Error searching: {e}"))?;
        let body = response
            .text()
            .await
            .map_err(|e| format!("Error reading search results: {e}"))?;

        let results = parse_search_results(&body);
        if results.is_empty() {
            return Ok(format!("No results found for '{query}'"));
        }

        let mut out = format!("Search results for '{query}':\n\n");
        for (i, (title, href, snippet)) in results.iter().enumerate() {
            out.push_str(&format!("{}. {title}\n   {href}\n", i + 1));
            if !snippet.is_empty() {
                out.push_str(&format!("   {snippet}\n"));
            }
            out.push('\n');
        }
        Ok(out)
    }
}

/// Scrape DuckDuckGo HTML results into (title, href, snippet) triples.
fn parse_search_results(html: &str) -> Vec<(String, String, String)> {
    let document = Html::parse_document(html);
    let result_sel = Selector::parse(".result").expect("static selector");
    let link_sel = Selector::parse("a.result__a").expect("static selector");
    let snippet_sel = Selector::parse(".result__snippet").expect("static selector");

    let mut results = Vec::new();
    for result in document.select(&result_sel) {
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = link.text().collect::<String>().trim().to_string();
        if title.is_empty() || href.is_empty() {
            continue;
        }
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        results.push((title, href.to_string(), snippet));
        if results.len() >= MAX_SEARCH_RESULTS {
            break;
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("https://example.com/page").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_truncate_long_text() {
        let long = "x".repeat(MAX_FETCH_CHARS + 100);
        let out = truncate_chars(long);
        assert!(out.contains("truncated"));
        assert!(out.len() < MAX_FETCH_CHARS + 200);

        let short = "short".to_string();
        assert_eq!(truncate_chars(short.clone()), short);
    }

    #[test]
    fn test_parse_search_results() {
        let html = r#"
            <div class="result">
              <a class="result__a" href="https://one.example">First Hit</a>
              <a class="result__snippet">A snippet about the first hit.</a>
            </div>
            <div class="result">
              <a class="result__a" href="https://two.example">Second <b>Hit</b></a>
            </div>
        "#;
        let results = parse_search_results(html);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "First Hit");
        assert_eq!(results[0].1, "https://one.example");
        assert!(results[0].2.contains("snippet"));
        assert_eq!(results[1].0, "Second Hit");
    }

    #[test]
    fn test_parse_search_results_empty() {
        assert!(parse_search_results("<html><body>nope</body></html>").is_empty());
    }
}
