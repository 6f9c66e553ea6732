//! Authenticated, paginated XRPC client for `app.bsky.feed.getAuthorFeed`
//! and `app.bsky.graph.getFollows`.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::FetchError;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedItem {
    pub post: PostView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: AuthorView,
    pub record: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorView {
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetAuthorFeedResponse {
    pub feed: Vec<FeedItem>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileView {
    pub did: String,
    pub handle: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetFollowsResponse {
    pub follows: Vec<ProfileView>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    access_jwt: tokio::sync::RwLock<Option<String>>,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build http client");
        Self {
            http,
            base_url: base_url.into(),
            access_jwt: tokio::sync::RwLock::new(None),
        }
    }

    /// Authenticate once, caching the bearer token for subsequent calls.
    /// Returns the operator's own DID so callers can exclude it from
    /// downstream crawls.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<String, FetchError> {
        let url = format!("{}/xrpc/com.atproto.server.createSession", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "identifier": identifier, "password": password }))
            .send()
            .await
            .map_err(|e| classify(&e))?;

        if !resp.status().is_success() {
            return Err(FetchError::from_status(resp.status().as_u16(), "createSession"));
        }

        let parsed: CreateSessionResponse = resp.json().await.map_err(|e| classify(&e))?;
        *self.access_jwt.write().await = Some(parsed.access_jwt);
        Ok(parsed.did)
    }

    async fn auth_header(&self) -> Option<String> {
        self.access_jwt.read().await.clone().map(|t| format!("Bearer {t}"))
    }

    /// Fetch one page of a handle's feed.
    pub async fn get_author_feed(
        &self,
        actor: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<GetAuthorFeedResponse, FetchError> {
        let url = format!("{}/xrpc/app.bsky.feed.getAuthorFeed", self.base_url);
        let mut req = self.http.get(&url).query(&[("actor", actor), ("limit", &limit.to_string())]);
        if let Some(c) = cursor {
            req = req.query(&[("cursor", c)]);
        }
        if let Some(h) = self.auth_header().await {
            req = req.header("Authorization", h);
        }
        let resp = req.send().await.map_err(|e| classify(&e))?;
        if !resp.status().is_success() {
            return Err(FetchError::from_status(resp.status().as_u16(), "getAuthorFeed"));
        }
        resp.json().await.map_err(|e| classify(&e))
    }

    /// Fetch all pages of `actor`'s follows, draining with a fixed
    /// inter-page pacing of 100ms.
    pub async fn get_follows(&self, actor: &str) -> Result<Vec<ProfileView>, FetchError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let url = format!("{}/xrpc/app.bsky.graph.getFollows", self.base_url);
            let mut req = self.http.get(&url).query(&[("actor", actor), ("limit", "100")]);
            if let Some(c) = &cursor {
                req = req.query(&[("cursor", c.as_str())]);
            }
            if let Some(h) = self.auth_header().await {
                req = req.header("Authorization", h);
            }
            let resp = req.send().await.map_err(|e| classify(&e))?;
            if !resp.status().is_success() {
                return Err(FetchError::from_status(resp.status().as_u16(), "getFollows"));
            }
            let page: GetFollowsResponse = resp.json().await.map_err(|e| classify(&e))?;
            debug!(actor, page_size = page.follows.len(), "fetched follows page");
            let next = page.cursor.clone();
            all.extend(page.follows);
            match next {
                Some(c) if !c.is_empty() => {
                    cursor = Some(c);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                _ => break,
            }
        }
        Ok(all)
    }
}

fn classify(err: &reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        return FetchError::from_status(status.as_u16(), &err.to_string());
    }
    FetchError::Transient(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_author_feed_response_shape() {
        let json = serde_json::json!({
            "feed": [
                {
                    "post": {
                        "uri": "at://did:plc:abc/app.bsky.feed.post/1",
                        "cid": "bafy1",
                        "author": {"did": "did:plc:abc", "handle": "abc.bsky.social"},
                        "record": {"text": "hello", "createdAt": "2026-01-01T00:00:00Z"}
                    }
                }
            ],
            "cursor": "next-page"
        });
        let parsed: GetAuthorFeedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.feed.len(), 1);
        assert_eq!(parsed.cursor.as_deref(), Some("next-page"));
        assert_eq!(parsed.feed[0].post.author.did, "did:plc:abc");
    }

    #[test]
    fn parses_create_session_response_shape() {
        let json = serde_json::json!({
            "accessJwt": "jwt-token",
            "refreshJwt": "refresh-token",
            "handle": "operator.bsky.social",
            "did": "did:plc:operator"
        });
        let parsed: CreateSessionResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.access_jwt, "jwt-token");
        assert_eq!(parsed.did, "did:plc:operator");
    }

    #[test]
    fn parses_follows_response_shape() {
        let json = serde_json::json!({
            "follows": [
                {"did": "did:plc:a", "handle": "a.bsky.social", "displayName": "A", "avatar": null}
            ],
            "cursor": null
        });
        let parsed: GetFollowsResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.follows.len(), 1);
        assert!(parsed.cursor.is_none());
    }
}
