//! Torrent search across multiple sources.
//!
//! A `SourceSearcher` wraps one provider; the `SearchAggregator` fans a query
//! out to all of them in parallel, tolerates individual failures, and merges
//! results with info-hash deduplication and a TTL cache.

mod aggregator;
mod cache;
mod dedup;
mod types;

pub use aggregator::SearchAggregator;
pub use cache::{query_fingerprint, SearchCache};
pub use dedup::deduplicate_results;
pub use types::*;

pub use crate::config::SearchConfig;
