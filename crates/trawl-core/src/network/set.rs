//! In-memory network membership set.
//!
//! A reader-writer-locked map (`Arc<RwLock<HashMap<...>>>`) — readers
//! dominate (every
//! stream event checks membership), writers are rare (crawl completion,
//! manual add/remove). Reloads build the replacement map off-lock and
//! swap it in atomically so readers never see a partial state.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::repo;

#[derive(Debug, Clone, Copy, Default)]
pub struct DegreeCounts {
    pub degree1: usize,
    pub degree2: usize,
}

pub struct NetworkSet {
    include_second_degree: bool,
    min_source_count: i32,
    inner: Arc<RwLock<HashMap<String, u8>>>,
}

impl NetworkSet {
    #[must_use]
    pub fn new(include_second_degree: bool, min_source_count: i32) -> Self {
        Self {
            include_second_degree,
            min_source_count,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rebuild the map from the store and swap it in atomically. Degree-1
    /// rows always load; degree-2 rows load only when second-degree is
    /// enabled and their `source_count` clears the configured minimum.
    pub async fn load(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let rows = repo::network_accounts::list_all(pool).await?;
        let mut fresh = HashMap::with_capacity(rows.len());
        for row in rows {
            if row.degree == 1 {
                fresh.insert(row.did, 1u8);
            } else if row.degree == 2 && self.include_second_degree && row.source_count >= self.min_source_count {
                fresh.insert(row.did, 2u8);
            }
        }
        *self.inner.write().await = fresh;
        Ok(())
    }

    pub async fn is_followed(&self, did: &str) -> bool {
        self.inner.read().await.contains_key(did)
    }

    pub async fn get_degree(&self, did: &str) -> u8 {
        self.inner.read().await.get(did).copied().unwrap_or(0)
    }

    pub async fn add(&self, did: &str, degree: u8) {
        self.inner.write().await.insert(did.to_owned(), degree);
    }

    pub async fn remove(&self, did: &str) {
        self.inner.write().await.remove(did);
    }

    pub async fn count_by_degree(&self) -> DegreeCounts {
        let map = self.inner.read().await;
        let mut counts = DegreeCounts::default();
        for degree in map.values() {
            match degree {
                1 => counts.degree1 += 1,
                2 => counts.degree2 += 1,
                _ => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_remove_mutate_membership() {
        let set = NetworkSet::new(true, 2);
        assert!(!set.is_followed("did:plc:a").await);
        set.add("did:plc:a", 1).await;
        assert!(set.is_followed("did:plc:a").await);
        assert_eq!(set.get_degree("did:plc:a").await, 1);
        set.remove("did:plc:a").await;
        assert!(!set.is_followed("did:plc:a").await);
    }

    #[tokio::test]
    async fn count_by_degree_tallies_both_degrees() {
        let set = NetworkSet::new(true, 2);
        set.add("a", 1).await;
        set.add("b", 1).await;
        set.add("c", 2).await;
        let counts = set.count_by_degree().await;
        assert_eq!(counts.degree1, 2);
        assert_eq!(counts.degree2, 1);
    }
}
