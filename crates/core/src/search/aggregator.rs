//! Parallel fan-out search across all active sources.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::SearchConfig;
use crate::metrics;

use super::cache::{query_fingerprint, SearchCache};
use super::dedup::deduplicate_results;
use super::{
    SearchError, SearchQuery, SearchResponse, SearchResult, SourceSearcher, TorrentSource,
};

/// Merges results from every active source into a single ranked list.
///
/// A slow or broken source never fails the overall search: each source gets
/// its own timeout and its failure is reported alongside the merged results.
/// The search as a whole only errors when no source is active at all.
pub struct SearchAggregator {
    searchers: Vec<Arc<dyn SourceSearcher>>,
    registry: RwLock<HashMap<String, TorrentSource>>,
    cache: SearchCache,
    config: SearchConfig,
}

enum SourceOutcome {
    Results(Vec<SearchResult>),
    Error(String),
    TimedOut,
}

impl SearchAggregator {
    pub fn new(
        searchers: Vec<Arc<dyn SourceSearcher>>,
        sources: Vec<TorrentSource>,
        config: SearchConfig,
    ) -> Self {
        let registry = sources.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            searchers,
            registry: RwLock::new(registry),
            cache: SearchCache::new(config.cache_ttl_secs),
            config,
        }
    }

    /// Fan the query out to all active sources and merge whatever comes back.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        metrics::SEARCHES_TOTAL.inc();

        let active = self.active_searchers().await;
        if active.is_empty() {
            return Err(SearchError::NoSourcesEnabled);
        }

        let fingerprint = query_fingerprint(query);
        if let Some(cached) = self.cache.get(&fingerprint).await {
            metrics::SEARCH_CACHE_HITS.inc();
            tracing::debug!(query = %query.query, "Search served from cache");
            return Ok(SearchResponse {
                query: query.query.clone(),
                results: self.apply_filters(cached.results, query),
                sources_searched: cached.sources_searched,
                source_errors: HashMap::new(),
                // The original fan-out duration, not the lookup time
                search_duration_ms: cached.search_duration_ms,
                from_cache: true,
            });
        }

        let timeout = Duration::from_secs(self.config.source_timeout_secs);
        let futures = active.iter().map(|searcher| {
            let searcher = Arc::clone(searcher);
            let query = query.clone();
            async move {
                let name = searcher.name().to_string();
                let outcome = match tokio::time::timeout(timeout, searcher.search(&query)).await {
                    Ok(Ok(results)) => SourceOutcome::Results(results),
                    Ok(Err(e)) => SourceOutcome::Error(e.to_string()),
                    Err(_) => SourceOutcome::TimedOut,
                };
                (name, outcome)
            }
        });

        let mut raw = Vec::new();
        let mut sources_searched = Vec::new();
        let mut source_errors = HashMap::new();

        for (name, outcome) in join_all(futures).await {
            match outcome {
                SourceOutcome::Results(results) => {
                    tracing::debug!(source = %name, count = results.len(), "Source responded");
                    self.record_success(&name).await;
                    sources_searched.push(name);
                    raw.extend(results);
                }
                SourceOutcome::Error(message) => {
                    tracing::warn!(source = %name, error = %message, "Source failed");
                    metrics::SOURCE_FAILURES.with_label_values(&[&name]).inc();
                    self.record_failure(&name, &message).await;
                    source_errors.insert(name, message);
                }
                SourceOutcome::TimedOut => {
                    tracing::warn!(source = %name, timeout_secs = timeout.as_secs(), "Source timed out");
                    metrics::SOURCE_FAILURES.with_label_values(&[&name]).inc();
                    self.record_failure(&name, "timed out").await;
                    source_errors.insert(name, "timed out".to_string());
                }
            }
        }

        let merged = deduplicate_results(raw);
        let duration_ms = started.elapsed().as_millis() as u64;
        if source_errors.len() < active.len() {
            // At least one source answered, worth caching
            self.cache
                .put(fingerprint, merged.clone(), sources_searched.clone(), duration_ms)
                .await;
        }

        let results = self.apply_filters(merged, query);
        metrics::SEARCH_DURATION.observe(duration_ms as f64 / 1000.0);

        tracing::info!(
            query = %query.query,
            results = results.len(),
            sources = sources_searched.len(),
            failed = source_errors.len(),
            duration_ms,
            "Search completed"
        );

        Ok(SearchResponse {
            query: query.query.clone(),
            results,
            sources_searched,
            source_errors,
            search_duration_ms: duration_ms,
            from_cache: false,
        })
    }

    /// Obtain a magnet URI for a result, resolving through its source when
    /// the result didn't carry one. Falls back to constructing a bare magnet
    /// from the info hash.
    pub async fn get_magnet(&self, result: &SearchResult) -> Result<String, SearchError> {
        if let Some(magnet) = &result.magnet_uri {
            return Ok(magnet.clone());
        }

        if let Some(searcher) = self.searchers.iter().find(|s| s.name() == result.source) {
            match searcher.resolve_magnet(result).await {
                Ok(magnet) => return Ok(magnet),
                Err(e) => {
                    tracing::warn!(source = %result.source, error = %e, "Magnet resolution failed");
                }
            }
        }

        match result.info_hash.as_deref() {
            Some(hash) if !hash.is_empty() => Ok(format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                hash,
                urlencoding::encode(&result.title)
            )),
            _ => Err(SearchError::MagnetUnavailable(result.title.clone())),
        }
    }

    /// Snapshot of all source registry records.
    pub async fn sources(&self) -> Vec<TorrentSource> {
        let mut sources: Vec<_> = self.registry.read().await.values().cloned().collect();
        sources.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
        sources
    }

    /// Enable or disable a source. Returns false if the name is unknown.
    pub async fn set_source_active(&self, name: &str, active: bool) -> bool {
        match self.registry.write().await.get_mut(name) {
            Some(source) => {
                source.active = active;
                true
            }
            None => false,
        }
    }

    pub async fn purge_expired_cache(&self) -> usize {
        self.cache.purge_expired().await
    }

    async fn active_searchers(&self) -> Vec<Arc<dyn SourceSearcher>> {
        let registry = self.registry.read().await;
        self.searchers
            .iter()
            .filter(|s| registry.get(s.name()).map(|r| r.active).unwrap_or(true))
            .cloned()
            .collect()
    }

    fn apply_filters(&self, mut results: Vec<SearchResult>, query: &SearchQuery) -> Vec<SearchResult> {
        if let Some(min_seeders) = query.min_seeders {
            results.retain(|r| r.seeders >= min_seeders);
        }
        let limit = query
            .max_results
            .map(|n| n.min(self.config.max_results))
            .unwrap_or(self.config.max_results);
        results.truncate(limit);
        results
    }

    async fn record_success(&self, name: &str) {
        if let Some(source) = self.registry.write().await.get_mut(name) {
            source.consecutive_failures = 0;
            source.last_error = None;
            source.last_success = Some(Utc::now());
        }
    }

    async fn record_failure(&self, name: &str, message: &str) {
        if let Some(source) = self.registry.write().await.get_mut(name) {
            source.consecutive_failures += 1;
            source.last_error = Some(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSourceSearcher;

    fn make_result(title: &str, source: &str, hash: &str, seeders: u32) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            info_hash: Some(hash.to_string()),
            magnet_uri: Some(format!("magnet:?xt=urn:btih:{}", hash)),
            details_url: None,
            size_bytes: 1_000_000,
            seeders,
            leechers: 1,
            source: source.to_string(),
            publish_date: None,
        }
    }

    fn aggregator_with(
        searchers: Vec<Arc<MockSourceSearcher>>,
        config: SearchConfig,
    ) -> SearchAggregator {
        let sources = searchers
            .iter()
            .map(|s| TorrentSource::new(s.name().to_string(), "http://example"))
            .collect();
        let searchers = searchers
            .into_iter()
            .map(|s| s as Arc<dyn SourceSearcher>)
            .collect();
        SearchAggregator::new(searchers, sources, config)
    }

    #[tokio::test]
    async fn test_search_merges_sources() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        s1.set_results(vec![make_result("A", "src1", "hash1", 10)]);
        let s2 = Arc::new(MockSourceSearcher::new("src2"));
        s2.set_results(vec![make_result("B", "src2", "hash2", 20)]);

        let agg = aggregator_with(vec![s1, s2], SearchConfig::default());
        let response = agg.search(&SearchQuery::new("test")).await.unwrap();

        assert_eq!(response.results.len(), 2);
        assert_eq!(response.sources_searched.len(), 2);
        assert!(response.source_errors.is_empty());
        assert!(!response.from_cache);
        // Sorted by seeders descending
        assert_eq!(response.results[0].title, "B");
    }

    #[tokio::test]
    async fn test_search_tolerates_source_failure() {
        let good = Arc::new(MockSourceSearcher::new("good"));
        good.set_results(vec![make_result("A", "good", "hash1", 10)]);
        let bad = Arc::new(MockSourceSearcher::new("bad"));
        bad.set_next_error(SearchError::ApiError("boom".to_string()));

        let agg = aggregator_with(vec![good, bad], SearchConfig::default());
        let response = agg.search(&SearchQuery::new("test")).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.sources_searched, vec!["good".to_string()]);
        assert!(response.source_errors.contains_key("bad"));
    }

    #[tokio::test]
    async fn test_search_excludes_timed_out_source() {
        let fast = Arc::new(MockSourceSearcher::new("fast"));
        fast.set_results(vec![make_result("A", "fast", "hash1", 10)]);
        let slow = Arc::new(MockSourceSearcher::new("slow"));
        slow.set_results(vec![make_result("B", "slow", "hash2", 20)]);
        slow.set_delay(Duration::from_secs(5));

        let config = SearchConfig {
            source_timeout_secs: 1,
            ..SearchConfig::default()
        };
        let agg = aggregator_with(vec![fast, slow], config);
        let response = agg.search(&SearchQuery::new("test")).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.sources_searched, vec!["fast".to_string()]);
        assert_eq!(
            response.source_errors.get("slow").map(String::as_str),
            Some("timed out")
        );
    }

    #[tokio::test]
    async fn test_search_no_sources_enabled() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        let agg = aggregator_with(vec![s1], SearchConfig::default());
        agg.set_source_active("src1", false).await;

        let result = agg.search(&SearchQuery::new("test")).await;
        assert!(matches!(result, Err(SearchError::NoSourcesEnabled)));
    }

    #[tokio::test]
    async fn test_search_second_call_hits_cache() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        s1.set_results(vec![make_result("A", "src1", "hash1", 10)]);
        s1.set_delay(Duration::from_millis(50));

        let agg = aggregator_with(vec![s1.clone()], SearchConfig::default());
        let query = SearchQuery::new("test");

        let first = agg.search(&query).await.unwrap();
        assert!(!first.from_cache);
        assert!(first.search_duration_ms >= 50);

        let second = agg.search(&query).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.results.len(), 1);
        assert_eq!(s1.search_count(), 1);
        // A hit reports the original fan-out duration
        assert_eq!(second.search_duration_ms, first.search_duration_ms);
    }

    #[tokio::test]
    async fn test_search_min_seeders_filter() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        s1.set_results(vec![
            make_result("Low", "src1", "hash1", 2),
            make_result("High", "src1", "hash2", 50),
        ]);

        let agg = aggregator_with(vec![s1], SearchConfig::default());
        let mut query = SearchQuery::new("test");
        query.min_seeders = Some(10);

        let response = agg.search(&query).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].title, "High");
    }

    #[tokio::test]
    async fn test_failure_counters_track_health() {
        let bad = Arc::new(MockSourceSearcher::new("bad"));
        bad.set_next_error(SearchError::ApiError("down".to_string()));

        let agg = aggregator_with(vec![bad.clone()], SearchConfig::default());
        agg.search(&SearchQuery::new("one")).await.unwrap();

        let sources = agg.sources().await;
        assert_eq!(sources[0].consecutive_failures, 1);
        assert!(sources[0].last_error.is_some());

        // A successful follow-up resets the counter
        bad.set_results(vec![make_result("A", "bad", "hash1", 10)]);
        agg.search(&SearchQuery::new("two")).await.unwrap();

        let sources = agg.sources().await;
        assert_eq!(sources[0].consecutive_failures, 0);
        assert!(sources[0].last_success.is_some());
    }

    #[tokio::test]
    async fn test_get_magnet_prefers_embedded() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        let agg = aggregator_with(vec![s1], SearchConfig::default());

        let result = make_result("A", "src1", "hash1", 10);
        let magnet = agg.get_magnet(&result).await.unwrap();
        assert_eq!(magnet, "magnet:?xt=urn:btih:hash1");
    }

    #[tokio::test]
    async fn test_get_magnet_constructs_from_hash() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        let agg = aggregator_with(vec![s1], SearchConfig::default());

        let mut result = make_result("Some Title", "unknown-source", "abc123", 10);
        result.magnet_uri = None;

        let magnet = agg.get_magnet(&result).await.unwrap();
        assert!(magnet.starts_with("magnet:?xt=urn:btih:abc123"));
        assert!(magnet.contains("Some%20Title"));
    }

    #[tokio::test]
    async fn test_get_magnet_unavailable() {
        let s1 = Arc::new(MockSourceSearcher::new("src1"));
        let agg = aggregator_with(vec![s1], SearchConfig::default());

        let mut result = make_result("A", "unknown-source", "", 10);
        result.magnet_uri = None;
        result.info_hash = None;

        let err = agg.get_magnet(&result).await.unwrap_err();
        assert!(matches!(err, SearchError::MagnetUnavailable(_)));
    }
}
