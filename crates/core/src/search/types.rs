use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Failed to connect to source: {0}")]
    ConnectionFailed(String),

    #[error("Source returned an error: {0}")]
    ApiError(String),

    #[error("Source timed out")]
    Timeout,

    #[error("No magnet link available for result: {0}")]
    MagnetUnavailable(String),

    #[error("No search sources are enabled")]
    NoSourcesEnabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad media category used to steer matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Other,
}

/// A search request against the aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text query, typically a title.
    pub query: String,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    /// Optional quality hint, e.g. "1080p".
    #[serde(default)]
    pub quality: Option<String>,
    /// Drop results below this seeder count.
    #[serde(default)]
    pub min_seeders: Option<u32>,
    /// Cap on merged results; the configured maximum still applies.
    #[serde(default)]
    pub max_results: Option<usize>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// A single result as returned by one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    /// Lowercase hex info hash, when the source exposes one.
    pub info_hash: Option<String>,
    pub magnet_uri: Option<String>,
    pub details_url: Option<String>,
    pub size_bytes: u64,
    pub seeders: u32,
    pub leechers: u32,
    /// Name of the source this result came from.
    pub source: String,
    pub publish_date: Option<DateTime<Utc>>,
}

/// The merged outcome of a fan-out search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    /// Sources that returned data.
    pub sources_searched: Vec<String>,
    /// Per-source failure messages for sources that errored or timed out.
    pub source_errors: HashMap<String, String>,
    pub search_duration_ms: u64,
    pub from_cache: bool,
}

/// Registry record for a configured source, including health bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentSource {
    pub name: String,
    pub base_url: String,
    pub active: bool,
    pub priority: i32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl TorrentSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            active: true,
            priority: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success: None,
        }
    }
}

/// A single torrent search source.
///
/// Implementations wrap one provider's API. The aggregator fans a query out
/// to every active source and merges whatever comes back in time.
#[async_trait]
pub trait SourceSearcher: Send + Sync {
    /// Stable source name, matching its registry record.
    fn name(&self) -> &str;

    /// Run the query against this source.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError>;

    /// Resolve a magnet link for a result from this source.
    ///
    /// Some providers only expose magnets on a details page, so this may
    /// require an extra fetch.
    async fn resolve_magnet(&self, result: &SearchResult) -> Result<String, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_deserialization() {
        let json = r#"{"query": "dune part two", "media_type": "movie", "min_seeders": 5}"#;
        let query: SearchQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.query, "dune part two");
        assert_eq!(query.media_type, Some(MediaType::Movie));
        assert_eq!(query.min_seeders, Some(5));
        assert!(query.quality.is_none());
    }

    #[test]
    fn test_error_display() {
        let err = SearchError::Timeout;
        assert_eq!(err.to_string(), "Source timed out");

        let err = SearchError::MagnetUnavailable("Some Release".to_string());
        assert!(err.to_string().contains("Some Release"));
    }
}
