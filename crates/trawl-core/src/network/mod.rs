//! Network membership and two-hop crawl.

pub mod crawler;
pub mod set;
pub mod token_bucket;

pub use set::{DegreeCounts, NetworkSet};
pub use token_bucket::TokenBucket;
