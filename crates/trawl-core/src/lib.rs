//! Core library: shared processing, storage, and background-job logic
//! for the link-trending service. Binaries in `services/*` wire these
//! modules into long-running processes or one-shot jobs.

pub mod api_client;
pub mod backfill;
pub mod canonical;
pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod models;
pub mod network;
pub mod processor;
pub mod repo;
pub mod retention;
pub mod stream;
pub mod trending;
