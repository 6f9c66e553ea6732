//! OpenGraph / title metadata fetcher.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::FetchError;
use crate::models::LinkMetadata;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAYS_MS: [u64; 2] = [500, 1000];

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Per-host request pacing, guarded by a mutex — a map of
/// host -> last request instant.
pub struct HostPacer {
    delay: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl HostPacer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    /// Sleep, if necessary, so that this host has not been hit within the
    /// configured delay window, then record this attempt.
    pub async fn wait_for(&self, host: &str) {
        let sleep_for = {
            let mut guard = self.last_request.lock().expect("host pacer lock poisoned");
            let now = Instant::now();
            let sleep_for = guard
                .get(host)
                .and_then(|last| self.delay.checked_sub(now.duration_since(*last)));
            guard.insert(host.to_owned(), now + sleep_for.unwrap_or_default());
            sleep_for
        };
        if let Some(d) = sleep_for {
            tokio::time::sleep(d).await;
        }
    }
}

impl Default for HostPacer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

pub struct MetadataFetcher {
    http2_client: Client,
    http1_client: Client,
    pacer: HostPacer,
}

impl MetadataFetcher {
    #[must_use]
    pub fn new(per_host_delay: Duration) -> Self {
        let http2_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build http/2 client");
        let http1_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .http1_only()
            .build()
            .expect("failed to build http/1.1 client");
        Self {
            http2_client,
            http1_client,
            pacer: HostPacer::new(per_host_delay),
        }
    }

    /// Fetch and parse OpenGraph / title metadata for `url`.
    pub async fn fetch(&self, url: &str) -> Result<LinkMetadata, FetchError> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default();
        self.pacer.wait_for(&host).await;

        let body = match self.fetch_body(url, &self.http2_client).await {
            Ok(body) => body,
            Err(FetchError::Transient(msg)) if looks_like_h2_stream_error(&msg) => {
                debug!(url, "http/2 stream error, retrying over http/1.1");
                self.fetch_with_retries(url, &self.http1_client).await?
            }
            Err(FetchError::Transient(_)) => self.fetch_with_retries(url, &self.http2_client).await?,
            Err(e) => return Err(e),
        };

        Ok(parse_metadata(&body))
    }

    async fn fetch_with_retries(&self, url: &str, client: &Client) -> Result<String, FetchError> {
        let mut last_err = None;
        for delay_ms in RETRY_DELAYS_MS {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            match self.fetch_body(url, client).await {
                Ok(body) => return Ok(body),
                Err(FetchError::Permanent(e)) => return Err(FetchError::Permanent(e)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(FetchError::RetriesExhausted(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn fetch_body(&self, url: &str, client: &Client) -> Result<String, FetchError> {
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), status.as_str()));
        }

        let bytes = resp.bytes().await.map_err(|e| classify_reqwest_error(&e))?;
        let truncated = &bytes[..bytes.len().min(MAX_BODY_BYTES)];
        Ok(String::from_utf8_lossy(truncated).into_owned())
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        return FetchError::from_status(status.as_u16(), &err.to_string());
    }
    if err.is_timeout() || err.is_connect() {
        return FetchError::Transient(err.to_string());
    }
    FetchError::Transient(err.to_string())
}

fn looks_like_h2_stream_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("http2") || lower.contains("h2") || lower.contains("stream error") || lower.contains("goaway")
}

fn parse_metadata(html: &str) -> LinkMetadata {
    let document = Html::parse_document(html);

    let title = meta_content(&document, "og:title").or_else(|| first_text(&document, "title"));
    let description =
        meta_content(&document, "og:description").or_else(|| meta_named(&document, "description"));
    let image = meta_content(&document, "og:image").or_else(|| meta_named(&document, "twitter:image"));

    LinkMetadata {
        title: non_empty(title),
        description: non_empty(description),
        image_url: non_empty(image),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

fn meta_content(doc: &Html, property: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[property="{property}"]"#)).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_owned)
}

fn meta_named(doc: &Html, name: &str) -> Option<String> {
    let selector = Selector::parse(&format!(r#"meta[name="{name}"]"#)).ok()?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_owned)
}

fn first_text(doc: &Html, tag: &str) -> Option<String> {
    let selector = Selector::parse(tag).ok()?;
    doc.select(&selector).next().map(|el| el.text().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_opengraph_tags_preferentially() {
        let html = r#"
            <html><head>
                <title>Fallback Title</title>
                <meta property="og:title" content="OG Title">
                <meta property="og:description" content="OG Desc">
                <meta property="og:image" content="https://cdn/x.jpg">
            </head></html>
        "#;
        let meta = parse_metadata(html);
        assert_eq!(meta.title.as_deref(), Some("OG Title"));
        assert_eq!(meta.description.as_deref(), Some("OG Desc"));
        assert_eq!(meta.image_url.as_deref(), Some("https://cdn/x.jpg"));
    }

    #[test]
    fn falls_back_to_title_tag_and_meta_description() {
        let html = r#"
            <html><head>
                <title>Plain Title</title>
                <meta name="description" content="Plain Desc">
                <meta name="twitter:image" content="https://cdn/y.jpg">
            </head></html>
        "#;
        let meta = parse_metadata(html);
        assert_eq!(meta.title.as_deref(), Some("Plain Title"));
        assert_eq!(meta.description.as_deref(), Some("Plain Desc"));
        assert_eq!(meta.image_url.as_deref(), Some("https://cdn/y.jpg"));
    }

    #[test]
    fn missing_fields_are_non_fatal() {
        let html = "<html><head></head><body></body></html>";
        let meta = parse_metadata(html);
        assert!(meta.is_empty());
    }

    #[test]
    fn classifies_permanent_vs_transient_status() {
        assert!(FetchError::from_status(404, "").is_permanent());
        assert!(FetchError::from_status(401, "").is_permanent());
        assert!(!FetchError::from_status(503, "").is_permanent());
        assert!(!FetchError::from_status(500, "").is_permanent());
    }

    #[tokio::test]
    async fn host_pacer_serializes_same_host_requests() {
        let pacer = HostPacer::new(Duration::from_millis(50));
        let start = Instant::now();
        pacer.wait_for("example.com").await;
        pacer.wait_for("example.com").await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn host_pacer_does_not_delay_distinct_hosts() {
        let pacer = HostPacer::new(Duration::from_secs(5));
        let start = Instant::now();
        pacer.wait_for("a.example.com").await;
        pacer.wait_for("b.example.com").await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
