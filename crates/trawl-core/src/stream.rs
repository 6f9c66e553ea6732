//! Stream consumer. Long-lived WebSocket client, descended from
//! the forwarder's `UplinkSession` shape: connect, handshake implicitly
//! via the resumption cursor query param, then loop reading JSON frames.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::PgPool;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use crate::error::StreamError;
use crate::metadata::MetadataFetcher;
use crate::network::NetworkSet;
use crate::processor::{self, Operation, Processor, RawEvent};
use crate::repo;
use crate::retention::{self, RetentionConfig};

const RECONNECT_DELAYS_SECS: [u64; 3] = [5, 10, 30];
const MAX_RECONNECT_DELAY_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub jetstream_url: String,
    pub cursor_update_interval: Duration,
    pub wanted_collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct JetstreamEvent {
    did: String,
    time_us: i64,
    kind: String,
    commit: Option<JetstreamCommit>,
}

#[derive(Debug, Deserialize)]
struct JetstreamCommit {
    collection: String,
    operation: String,
    rkey: String,
    record: Option<serde_json::Value>,
}

fn build_connect_url(base: &str, cursor: Option<i64>, wanted_collections: &[String]) -> String {
    let mut url = base.to_owned();
    let mut params = Vec::new();
    if let Some(c) = cursor {
        params.push(format!("cursor={c}"));
    }
    for collection in wanted_collections {
        params.push(format!("wantedCollections={collection}"));
    }
    if !params.is_empty() {
        let sep = if url.contains('?') { '&' } else { '?' };
        url.push(sep);
        url.push_str(&params.join("&"));
    }
    url
}

/// Drive the stream consumer until cancellation: startup sequence (read
/// cursor, run the startup sweep, connect), then reconnect-with-backoff
/// forever. `shutdown` carries a single `true` when the caller wants a
/// graceful stop; the current session flushes its cursor before `run`
/// returns.
pub async fn run(
    pool: &PgPool,
    network: &NetworkSet,
    metadata: &MetadataFetcher,
    config: &StreamConfig,
    retention_config: &RetentionConfig,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    if let Err(e) = retention::sweep(pool, retention_config).await {
        error!(error = %e, "startup retention sweep failed");
    }

    let mut attempt: u32 = 0;
    loop {
        let cursor = match repo::cursor::read(pool).await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to read stream cursor, starting from current time");
                None
            }
        };

        match run_once(pool, network, metadata, config, cursor, shutdown.clone()).await {
            Ok(()) => {
                if *shutdown.borrow() {
                    info!("stream consumer stopped, cursor flushed");
                    return;
                }
                attempt = 0;
            }
            Err(e) => {
                warn!(error = %e, attempt, "stream session ended, reconnecting");
                attempt += 1;
            }
        }

        let base_delay = RECONNECT_DELAYS_SECS
            .get(attempt as usize)
            .copied()
            .unwrap_or(MAX_RECONNECT_DELAY_SECS)
            .min(MAX_RECONNECT_DELAY_SECS);
        // A little jitter avoids every reconnect attempt landing on the
        // same wall-clock second after a broad upstream outage.
        let jitter_ms = {
            use rand::Rng;
            rand::thread_rng().gen_range(0..500)
        };
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(base_delay) + Duration::from_millis(jitter_ms)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn run_once(
    pool: &PgPool,
    network: &NetworkSet,
    metadata: &MetadataFetcher,
    config: &StreamConfig,
    cursor: Option<i64>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), StreamError> {
    use tokio_tungstenite::connect_async;

    let url = build_connect_url(&config.jetstream_url, cursor, &config.wanted_collections);
    let (mut ws, _response) = connect_async(&url)
        .await
        .map_err(|e| StreamError::Connect(e.to_string()))?;
    info!(url, "jetstream connection established");

    let processor = Processor::new(pool, metadata);
    let mut last_cursor_write = tokio::time::Instant::now();
    let mut last_time_us = cursor.unwrap_or(0);

    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    if let Err(e) = repo::cursor::write(pool, last_time_us).await {
                        error!(error = %e, "failed to flush stream cursor on shutdown");
                    }
                    return Ok(());
                }
                continue;
            }
            msg = ws.next() => msg,
        };

        let msg = match msg {
            Some(Ok(m)) => m,
            Some(Err(e)) => return Err(StreamError::Protocol(e.to_string())),
            None => return Err(StreamError::Disconnected),
        };

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => return Err(StreamError::Disconnected),
            Message::Ping(data) => {
                let _ = ws.send(Message::Pong(data)).await;
                continue;
            }
            _ => continue,
        };

        let event: JetstreamEvent = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed jetstream event, skipping");
                continue;
            }
        };

        last_time_us = event.time_us;

        if event.kind == "commit" {
            if let Some(commit) = event.commit {
                if let Err(e) = handle_commit(&processor, network, &event.did, commit).await {
                    warn!(error = %e, did = %event.did, "failed to process event, continuing");
                }
            }
        }

        if last_cursor_write.elapsed() >= config.cursor_update_interval {
            if let Err(e) = repo::cursor::write(pool, last_time_us).await {
                error!(error = %e, "failed to persist stream cursor");
            }
            last_cursor_write = tokio::time::Instant::now();
        }
    }
}

async fn handle_commit(
    processor: &Processor<'_>,
    network: &NetworkSet,
    did: &str,
    commit: JetstreamCommit,
) -> Result<(), crate::error::ProcessError> {
    if !network.is_followed(did).await {
        return Ok(());
    }

    let operation = match commit.operation.as_str() {
        "create" => Operation::Create,
        "update" => Operation::Update,
        "delete" => Operation::Delete,
        other => {
            debug!(operation = other, "unrecognized operation, skipping");
            return Ok(());
        }
    };

    let record = commit
        .record
        .as_ref()
        .and_then(|v| processor::record_to_post(v, true));

    let author_degree = i32::from(network.get_degree(did).await);

    processor
        .process(RawEvent {
            author_id: did.to_owned(),
            author_degree,
            collection: commit.collection,
            rkey: commit.rkey,
            operation,
            record,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_url_includes_cursor_and_collections() {
        let url = build_connect_url(
            "wss://jetstream.example.com/subscribe",
            Some(1234),
            &["app.bsky.feed.post".to_owned()],
        );
        assert!(url.contains("cursor=1234"));
        assert!(url.contains("wantedCollections=app.bsky.feed.post"));
    }

    #[test]
    fn connect_url_without_cursor_omits_param() {
        let url = build_connect_url("wss://jetstream.example.com/subscribe", None, &[]);
        assert_eq!(url, "wss://jetstream.example.com/subscribe");
    }
}
