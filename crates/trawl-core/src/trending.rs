//! Trending query and ranking.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::models::{SharerProfile, TrendingLink};
use crate::repo;

/// Seam for future ranking strategies (recency-weighted, velocity) to
/// reorder the SQL-sorted result without touching the aggregation query.
pub trait RankingStrategy: Sync {
    fn rank(&self, links: Vec<TrendingLink>) -> Vec<TrendingLink>;
}

/// Accepts the SQL-sorted order as-is.
pub struct Identity;

impl RankingStrategy for Identity {
    fn rank(&self, links: Vec<TrendingLink>) -> Vec<TrendingLink> {
        links
    }
}

#[derive(Debug, Clone)]
pub struct TrendingQuery {
    pub window_hours: i64,
    pub limit: i64,
    pub degree: i32,
}

/// One trending link annotated with resolved sharer profiles, the shape
/// the HTTP surface serializes directly.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnnotatedTrendingLink {
    #[serde(flatten)]
    pub trending: TrendingLink,
    pub sharer_profiles: Vec<SharerProfile>,
}

/// Run the trending query with the given strategy, then resolve sharer
/// attribution for each result. A failed attribution lookup degrades to
/// an empty sharer list rather than failing the whole response.
pub async fn run(
    pool: &PgPool,
    query: &TrendingQuery,
    strategy: &dyn RankingStrategy,
) -> Result<Vec<AnnotatedTrendingLink>, sqlx::Error> {
    let cutoff = Utc::now() - ChronoDuration::hours(query.window_hours);
    let links = repo::trending::query_trending(pool, cutoff, query.limit, query.degree).await?;
    let ranked = strategy.rank(links);

    let mut annotated = Vec::with_capacity(ranked.len());
    for trending in ranked {
        let sharer_profiles = match repo::network_accounts::resolve_sharers(pool, &trending.sharer_dids).await {
            Ok(profiles) => profiles,
            Err(e) => {
                warn!(error = %e, "sharer attribution lookup failed, degrading to empty list");
                Vec::new()
            }
        };
        annotated.push(AnnotatedTrendingLink { trending, sharer_profiles });
    }
    Ok(annotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(share_count: i64) -> TrendingLink {
        TrendingLink {
            link: crate::models::Link {
                id: 1,
                original_url: "https://example.com".into(),
                normalized_url: "https://example.com".into(),
                title: None,
                description: None,
                og_image_url: None,
                first_seen_at: Utc::now(),
                last_fetched_at: None,
            },
            share_count,
            last_shared_at: Utc::now(),
            sharer_dids: vec!["did:plc:a".into()],
        }
    }

    #[test]
    fn identity_strategy_preserves_order() {
        let input = vec![sample(5), sample(3), sample(9)];
        let expected: Vec<i64> = input.iter().map(|l| l.share_count).collect();
        let ranked = Identity.rank(input);
        let got: Vec<i64> = ranked.iter().map(|l| l.share_count).collect();
        assert_eq!(got, expected);
    }
}
