//! URL canonicalization and extraction.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

const TRACKING_PREFIXES: &[&str] = &["utm_"];
const TRACKING_EXACT: &[&str] = &["fbclid", "gclid", "mc_eid", "ref", "ref_src"];

/// Normalize a raw URL string to its canonical form. On any parse failure,
/// the original string is returned unchanged so downstream stages still
/// attempt insertion.
#[must_use]
pub fn canonicalize(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => canonicalize_parsed(url),
        Err(_) => raw.to_owned(),
    }
}

fn canonicalize_parsed(mut url: Url) -> String {
    url.set_fragment(None);

    let scheme = url.scheme().to_lowercase();
    let _ = url.set_scheme(&scheme);

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        let _ = url.set_host(Some(&lower));
    }

    let default_port = match scheme.as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if url.port() == default_port {
        let _ = url.set_port(None);
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0));

    if params.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &params {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    let path = url.path().to_owned();
    if path != "/" && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_lowercase();
    TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p)) || TRACKING_EXACT.contains(&lower.as_str())
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\bhttps?://[^\s<>"']+\.(?:com|org|net|io|dev|co|edu|gov|app|xyz|me|to|info|biz|us|uk|ca|news|social|blog)(?:/[^\s<>"']*)?"#)
            .expect("static url pattern is valid")
    })
}

/// Extract URL-shaped substrings from free text. Not deduplicated — the
/// canonical form plus the store's ON-CONFLICT upsert handle duplicates
/// downstream.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    url_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ')', '"', '\'']).to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_scheme_and_host() {
        assert_eq!(
            canonicalize("HTTPS://Example.COM/a"),
            "https://example.com/a"
        );
    }

    #[test]
    fn strips_default_ports() {
        assert_eq!(canonicalize("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(canonicalize("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(canonicalize("http://example.com:8080/a"), "http://example.com:8080/a");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(canonicalize("https://example.com/a/"), "https://example.com/a");
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn removes_fragment() {
        assert_eq!(canonicalize("https://example.com/a#frag"), "https://example.com/a");
    }

    #[test]
    fn drops_tracking_params_and_sorts_remaining() {
        let got = canonicalize("https://x.com/?utm_source=x&B=2&a=1&fbclid=zzz");
        assert_eq!(got, "https://x.com/?a=1&b=2");
    }

    #[test]
    fn query_param_order_is_insensitive() {
        assert_eq!(
            canonicalize("https://x.com/?b=2&a=1"),
            canonicalize("https://x.com?a=1&b=2")
        );
    }

    #[test]
    fn is_idempotent() {
        let once = canonicalize("https://Example.COM:443/a/?utm_source=x&B=2&a=1#frag");
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn combines_all_normalization_rules_together() {
        assert_eq!(
            canonicalize("https://Example.COM:443/a/?utm_source=x&B=2&a=1#frag"),
            "https://example.com/a?a=1&b=2"
        );
        assert_eq!(
            canonicalize("http://example.com/a?a=1&b=2"),
            "http://example.com/a?a=1&b=2"
        );
    }

    #[test]
    fn unparseable_input_returned_unchanged() {
        let raw = "not a url at all";
        assert_eq!(canonicalize(raw), raw);
    }

    #[test]
    fn extracts_http_and_https_urls_from_text() {
        let text = "check this out https://example.com/post and also http://foo.io/bar.";
        let urls = extract_urls(text);
        assert_eq!(urls, vec!["https://example.com/post", "http://foo.io/bar"]);
    }

    #[test]
    fn extraction_is_not_deduplicated() {
        let text = "https://example.com/x and again https://example.com/x";
        let urls = extract_urls(text);
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn extraction_trims_trailing_punctuation() {
        let text = "see (https://example.com/x).";
        let urls = extract_urls(text);
        assert_eq!(urls, vec!["https://example.com/x"]);
    }
}
