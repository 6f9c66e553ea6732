//! Network account storage.

use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::models::{NetworkAccount, SharerProfile};

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<NetworkAccount, sqlx::Error> {
    let source_dids: Json<Vec<String>> = row.try_get("source_dids")?;
    Ok(NetworkAccount {
        did: row.try_get("did")?,
        handle: row.try_get("handle")?,
        display_name: row.try_get("display_name")?,
        avatar_url: row.try_get("avatar_url")?,
        degree: row.try_get("degree")?,
        source_count: row.try_get("source_count")?,
        source_dids: source_dids.0,
        backfill_completed: row.try_get("backfill_completed")?,
        first_seen_at: row.try_get("first_seen_at")?,
        last_updated_at: row.try_get("last_updated_at")?,
    })
}

/// Upsert a crawled account. On conflict, degree/source_count/source_dids
/// are refreshed to the latest crawl's view; `backfill_completed` is left
/// untouched so a re-crawl never undoes a completed backfill.
pub async fn upsert(pool: &PgPool, account: &NetworkAccount) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO network_accounts
               (did, handle, display_name, avatar_url, degree, source_count, source_dids, backfill_completed)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
           ON CONFLICT (did) DO UPDATE SET
               handle = EXCLUDED.handle,
               display_name = EXCLUDED.display_name,
               avatar_url = EXCLUDED.avatar_url,
               degree = EXCLUDED.degree,
               source_count = EXCLUDED.source_count,
               source_dids = EXCLUDED.source_dids,
               last_updated_at = now()"#,
    )
    .bind(&account.did)
    .bind(&account.handle)
    .bind(&account.display_name)
    .bind(&account.avatar_url)
    .bind(account.degree)
    .bind(account.source_count)
    .bind(Json(&account.source_dids))
    .bind(account.backfill_completed)
    .execute(pool)
    .await?;
    Ok(())
}

/// All network rows, used to rebuild the in-memory `NetworkSet`.
pub async fn list_all(pool: &PgPool) -> Result<Vec<NetworkAccount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT did, handle, display_name, avatar_url, degree, source_count, source_dids,
                  backfill_completed, first_seen_at, last_updated_at
           FROM network_accounts"#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_account).collect()
}

/// Degree-1 accounts not yet backfilled — the backfill worker's default
/// account set.
pub async fn list_pending_backfill(pool: &PgPool) -> Result<Vec<NetworkAccount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT did, handle, display_name, avatar_url, degree, source_count, source_dids,
                  backfill_completed, first_seen_at, last_updated_at
           FROM network_accounts
           WHERE degree = 1 AND backfill_completed = false"#,
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_account).collect()
}

pub async fn mark_backfill_completed(pool: &PgPool, did: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE network_accounts SET backfill_completed = true, last_updated_at = now() WHERE did = $1")
        .bind(did)
        .execute(pool)
        .await?;
    Ok(())
}

/// Resolve a set of sharer ids to profile rows for trending attribution.
/// A did with no matching row (account never crawled, or since removed)
/// degrades to an id-only entry rather than vanishing from the result.
pub async fn resolve_sharers(pool: &PgPool, dids: &[String]) -> Result<Vec<SharerProfile>, sqlx::Error> {
    if dids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query("SELECT did, handle, display_name, avatar_url FROM network_accounts WHERE did = ANY($1)")
        .bind(dids)
        .fetch_all(pool)
        .await?;

    let mut found: std::collections::HashMap<String, SharerProfile> = rows
        .into_iter()
        .map(|row| {
            let profile = SharerProfile {
                did: row.try_get("did")?,
                handle: row.try_get("handle")?,
                display_name: row.try_get("display_name")?,
                avatar_url: row.try_get("avatar_url")?,
            };
            Ok::<_, sqlx::Error>((profile.did.clone(), profile))
        })
        .collect::<Result<_, _>>()?;

    Ok(dids
        .iter()
        .map(|did| {
            found.remove(did).unwrap_or_else(|| SharerProfile {
                did: did.clone(),
                handle: None,
                display_name: None,
                avatar_url: None,
            })
        })
        .collect())
}
