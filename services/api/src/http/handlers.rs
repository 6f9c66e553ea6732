use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use trawl_core::trending::{Identity, TrendingQuery};
use trawl_core::{canonical, repo};

use super::response::{bad_request, internal_error, not_found};
use super::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    hours: Option<i64>,
    limit: Option<i64>,
    degree: Option<i32>,
}

pub async fn get_trending(State(state): State<AppState>, Query(params): Query<TrendingParams>) -> impl IntoResponse {
    let hours = params.hours.unwrap_or(24);
    let limit = params.limit.unwrap_or(20);
    let degree = params.degree.unwrap_or(0);

    if !(1..=720).contains(&hours) {
        return bad_request("hours must be between 1 and 720");
    }
    if !(1..=100).contains(&limit) {
        return bad_request("limit must be between 1 and 100");
    }
    if !matches!(degree, 0 | 1 | 2) {
        return bad_request("degree must be 0, 1, or 2");
    }

    let query = TrendingQuery { window_hours: hours, limit, degree };
    match trawl_core::trending::run(&state.pool, &query, &Identity).await {
        Ok(results) => {
            let links: Vec<serde_json::Value> = results
                .into_iter()
                .map(|r| {
                    let link = r.trending.link;
                    serde_json::json!({
                        "id": link.id,
                        "url": link.normalized_url,
                        "title": link.title,
                        "description": link.description,
                        "image_url": link.og_image_url,
                        "share_count": r.trending.share_count,
                        "last_shared_at": r.trending.last_shared_at.to_rfc3339(),
                        "sharers": r.trending.sharer_dids,
                        "sharer_avatars": r.sharer_profiles.into_iter().map(|p| serde_json::json!({
                            "did": p.did,
                            "handle": p.handle,
                            "display_name": p.display_name,
                            "avatar_url": p.avatar_url,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            Json(serde_json::json!({ "links": links })).into_response()
        }
        Err(e) => internal_error(e).into_response(),
    }
}

pub async fn get_link_posts(State(state): State<AppState>, Path(id): Path<i32>) -> impl IntoResponse {
    let link = match repo::links::find_by_id(&state.pool, id).await {
        Ok(Some(link)) => link,
        Ok(None) => return not_found("link not found").into_response(),
        Err(e) => return internal_error(e).into_response(),
    };

    let posts = match repo::posts::posts_for_link(&state.pool, link.id).await {
        Ok(posts) => posts,
        Err(e) => return internal_error(e).into_response(),
    };

    let dids: Vec<String> = posts.iter().map(|p| p.author_did.clone()).collect();
    let avatars = repo::network_accounts::resolve_sharers(&state.pool, &dids)
        .await
        .unwrap_or_default();

    let posts_json: Vec<serde_json::Value> = posts
        .into_iter()
        .map(|post| {
            let avatar_url = avatars.iter().find(|a| a.did == post.author_did).and_then(|a| a.avatar_url.clone());
            serde_json::json!({
                "author_handle": post.author_handle,
                "author_did": post.author_did,
                "avatar_url": avatar_url,
                "content": post.content,
                "created_at": post.created_at.to_rfc3339(),
                "has_commentary": has_commentary(&post.content),
            })
        })
        .collect();

    Json(serde_json::json!({ "link_id": link.id, "posts": posts_json })).into_response()
}

/// Distinguishes a quote-with-commentary from a bare URL share: strip
/// extracted URLs from the text and check what's left.
const COMMENTARY_MIN_CHARS: usize = 5;

fn has_commentary(content: &str) -> bool {
    let mut remaining = content.to_owned();
    for url in canonical::extract_urls(content) {
        remaining = remaining.replace(&url, "");
    }
    remaining.trim().chars().count() > COMMENTARY_MIN_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_url_share_has_no_commentary() {
        assert!(!has_commentary("https://example.com/article"));
    }

    #[test]
    fn quote_with_text_has_commentary() {
        assert!(has_commentary("this article is a great read https://example.com/article"));
    }
}
