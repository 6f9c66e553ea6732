//! Shared error types. Hand-rolled enums implementing `std::error::Error`,
//! not a derive-macro crate — kept consistent with how the rest of this
//! workspace classifies failures (see `config::ConfigError`).

use std::fmt;

/// Classification shared by the metadata fetcher and the API client:
/// transient failures are worth retrying, permanent ones are not.
#[derive(Debug)]
pub enum FetchError {
    /// Timed out, connection reset, or a 502/503/504 — retry with backoff.
    Transient(String),
    /// 400/401/403/404/410 — treat the subject as unavailable.
    Permanent(String),
    /// Retries exhausted without success.
    RetriesExhausted(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transient(s) => write!(f, "transient fetch error: {s}"),
            FetchError::Permanent(s) => write!(f, "permanent fetch error: {s}"),
            FetchError::RetriesExhausted(s) => write!(f, "retries exhausted: {s}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::Permanent(_))
    }

    /// Classify an HTTP status code into a transient/permanent bucket.
    #[must_use]
    pub fn from_status(status: u16, body_hint: &str) -> Self {
        match status {
            400 | 401 | 403 | 404 | 410 => FetchError::Permanent(format!("{status} {body_hint}")),
            502 | 503 | 504 => FetchError::Transient(format!("{status} {body_hint}")),
            _ => FetchError::Transient(format!("{status} {body_hint}")),
        }
    }
}

/// Errors surfaced by the shared processor. Per-URL failures never
/// reach this type — they are logged and swallowed at the call site. Only
/// a failed post insert is fatal for the triggering event.
#[derive(Debug)]
pub enum ProcessError {
    Store(sqlx::Error),
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for ProcessError {}

impl From<sqlx::Error> for ProcessError {
    fn from(e: sqlx::Error) -> Self {
        ProcessError::Store(e)
    }
}

/// Errors from the upstream stream connection. Unrecoverable only
/// after reconnect policy is exhausted by the caller — this type just
/// reports what went wrong on a given attempt.
#[derive(Debug)]
pub enum StreamError {
    Connect(String),
    Protocol(String),
    Disconnected,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Connect(s) => write!(f, "connection error: {s}"),
            StreamError::Protocol(s) => write!(f, "protocol error: {s}"),
            StreamError::Disconnected => write!(f, "stream disconnected"),
        }
    }
}

impl std::error::Error for StreamError {}
