//! Store layer, split by aggregate rather than by query shape — one
//! file per table family.
//!
//! Queries here use `sqlx`'s runtime-checked `query`/`query_as` API rather
//! than the `query!` macro family: the macros need either a live database
//! or a checked-in query cache at build time, and this workspace carries
//! neither, so the runtime form is the version that actually compiles.

pub mod cursor;
pub mod links;
pub mod network_accounts;
pub mod post_links;
pub mod posts;
pub mod trending;
