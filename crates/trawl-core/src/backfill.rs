//! Backfill worker. On-demand batch job, bounded concurrency via
//! a fixed-size semaphore.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::api_client::{ApiClient, FeedItem};
use crate::error::FetchError;
use crate::metadata::MetadataFetcher;
use crate::models::NetworkAccount;
use crate::processor::{self, Operation, Processor, RawEvent};
use crate::repo;

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub max_concurrent: usize,
    pub posts_per_page: u32,
    pub max_pages_per_user: u32,
    pub lookback: ChronoDuration,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub rate_limit: Duration,
}

#[derive(Debug, Default)]
pub struct BackfillSummary {
    pub accounts_attempted: usize,
    pub accounts_completed: usize,
    pub accounts_failed: usize,
}

/// Run backfill over every degree-1 account with `backfill_completed =
/// false`, bounded to `max_concurrent` accounts in flight at once.
pub async fn run(
    pool: &PgPool,
    api: &ApiClient,
    metadata: &MetadataFetcher,
    config: &BackfillConfig,
) -> Result<BackfillSummary, sqlx::Error> {
    let accounts = repo::network_accounts::list_pending_backfill(pool).await?;
    info!(count = accounts.len(), "starting backfill run");

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(accounts.len());

    for account in accounts {
        let semaphore = Arc::clone(&semaphore);
        let pool = pool.clone();
        let config = config.clone();
        handles.push(async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            backfill_account(&pool, api, metadata, &config, &account).await
        });
    }

    let results = futures_util::future::join_all(handles).await;

    let mut summary = BackfillSummary {
        accounts_attempted: results.len(),
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(()) => summary.accounts_completed += 1,
            Err(e) => {
                warn!(error = %e, "backfill account failed");
                summary.accounts_failed += 1;
            }
        }
    }
    Ok(summary)
}

async fn backfill_account(
    pool: &PgPool,
    api: &ApiClient,
    metadata: &MetadataFetcher,
    config: &BackfillConfig,
    account: &NetworkAccount,
) -> Result<(), FetchError> {
    let Some(handle) = &account.handle else {
        return Err(FetchError::Permanent("account has no handle on record".into()));
    };

    let cutoff = Utc::now() - config.lookback;
    let processor = Processor::new(pool, metadata);
    let mut cursor: Option<String> = None;

    for page_num in 0..config.max_pages_per_user {
        let page = fetch_page_with_retry(api, handle, cursor.as_deref(), config).await?;

        let oldest_in_page = page.feed.iter().filter_map(|item| post_created_at(item)).min();

        for item in &page.feed {
            if let Err(e) = process_feed_item(&processor, account, item).await {
                warn!(error = %e, uri = %item.post.uri, "failed to process backfilled post");
            }
        }

        tokio::time::sleep(config.rate_limit).await;

        match (page.cursor, oldest_in_page) {
            (Some(c), Some(oldest)) if oldest >= cutoff && !c.is_empty() => {
                cursor = Some(c);
            }
            _ => break,
        }

        if page_num + 1 >= config.max_pages_per_user {
            break;
        }
    }

    repo::network_accounts::mark_backfill_completed(pool, &account.did)
        .await
        .map_err(|e| FetchError::Transient(e.to_string()))?;
    Ok(())
}

async fn fetch_page_with_retry(
    api: &ApiClient,
    handle: &str,
    cursor: Option<&str>,
    config: &BackfillConfig,
) -> Result<crate::api_client::GetAuthorFeedResponse, FetchError> {
    let mut attempt = 0u32;
    loop {
        match api.get_author_feed(handle, cursor, config.posts_per_page).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_permanent() => return Err(e),
            Err(e) if attempt >= config.max_retries => return Err(e),
            Err(_) => {
                let backoff = config.retry_backoff_ms * 2u64.pow(attempt);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
        }
    }
}

fn post_created_at(item: &FeedItem) -> Option<DateTime<Utc>> {
    item.post
        .record
        .get("createdAt")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

async fn process_feed_item(
    processor: &Processor<'_>,
    account: &NetworkAccount,
    item: &FeedItem,
) -> Result<(), crate::error::ProcessError> {
    let record = processor::record_to_post(&item.post.record, false);
    let (collection, rkey) = split_uri(&item.post.uri);

    processor
        .process(RawEvent {
            author_id: item.post.author.did.clone(),
            author_degree: account.degree,
            collection,
            rkey,
            operation: Operation::Create,
            record,
        })
        .await
}

/// `at://did/collection/rkey` -> (collection, rkey).
fn split_uri(uri: &str) -> (String, String) {
    let tail = uri.split('/').collect::<Vec<_>>();
    match tail.as_slice() {
        [.., collection, rkey] => (collection.to_string(), rkey.to_string()),
        _ => (String::new(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_uri_into_collection_and_rkey() {
        let (collection, rkey) = split_uri("at://did:plc:abc/app.bsky.feed.post/3k2x");
        assert_eq!(collection, "app.bsky.feed.post");
        assert_eq!(rkey, "3k2x");
    }
}
