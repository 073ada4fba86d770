//! In-memory search result cache keyed by query fingerprint.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SearchQuery, SearchResult};

/// Compute a stable fingerprint for a query and its filters.
///
/// The query text is lowercased and whitespace-collapsed so trivially
/// different spellings of the same search hit the same cache entry.
pub fn query_fingerprint(query: &SearchQuery) -> String {
    let normalized = query
        .query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    if let Some(media_type) = query.media_type {
        hasher.update(format!("{:?}", media_type).as_bytes());
    }
    hasher.update(b"|");
    if let Some(quality) = &query.quality {
        hasher.update(quality.to_lowercase().as_bytes());
    }
    hasher.update(b"|");
    if let Some(min_seeders) = query.min_seeders {
        hasher.update(min_seeders.to_le_bytes());
    }

    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    results: Vec<SearchResult>,
    sources_searched: Vec<String>,
    search_duration_ms: u64,
    expires_at: DateTime<Utc>,
}

/// Cached fan-out outcome handed back on a fingerprint hit.
///
/// `search_duration_ms` is the duration of the original fan-out, not of the
/// cache lookup.
#[derive(Debug, Clone)]
pub struct CachedSearch {
    pub results: Vec<SearchResult>,
    pub sources_searched: Vec<String>,
    pub search_duration_ms: u64,
}

/// TTL cache for merged search results.
///
/// Entries are evicted lazily on lookup; an explicit `purge_expired` is
/// available for periodic cleanup.
pub struct SearchCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    pub async fn get(&self, fingerprint: &str) -> Option<CachedSearch> {
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                Some(entry) if entry.expires_at > Utc::now() => {
                    return Some(CachedSearch {
                        results: entry.results.clone(),
                        sources_searched: entry.sources_searched.clone(),
                        search_duration_ms: entry.search_duration_ms,
                    });
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired entry, drop it
        self.entries.write().await.remove(fingerprint);
        None
    }

    pub async fn put(
        &self,
        fingerprint: String,
        results: Vec<SearchResult>,
        sources_searched: Vec<String>,
        search_duration_ms: u64,
    ) {
        let entry = CacheEntry {
            results,
            sources_searched,
            search_duration_ms,
            expires_at: Utc::now() + self.ttl,
        };
        self.entries.write().await.insert(fingerprint, entry);
    }

    pub async fn invalidate(&self, fingerprint: &str) {
        self.entries.write().await.remove(fingerprint);
    }

    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MediaType;

    fn make_result(title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            info_hash: Some("abc123".to_string()),
            magnet_uri: None,
            details_url: None,
            size_bytes: 1000,
            seeders: 10,
            leechers: 1,
            source: "src1".to_string(),
            publish_date: None,
        }
    }

    #[test]
    fn test_fingerprint_normalizes_query_text() {
        let a = query_fingerprint(&SearchQuery::new("Dune  Part Two"));
        let b = query_fingerprint(&SearchQuery::new("dune part two"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_differs_per_filter() {
        let plain = SearchQuery::new("dune");
        let mut movie = SearchQuery::new("dune");
        movie.media_type = Some(MediaType::Movie);
        let mut seeded = SearchQuery::new("dune");
        seeded.min_seeders = Some(5);

        let fp_plain = query_fingerprint(&plain);
        assert_ne!(fp_plain, query_fingerprint(&movie));
        assert_ne!(fp_plain, query_fingerprint(&seeded));
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let cache = SearchCache::new(60);
        cache
            .put(
                "fp".to_string(),
                vec![make_result("Test")],
                vec!["src1".to_string()],
                842,
            )
            .await;

        let hit = cache.get("fp").await.expect("Should hit");
        assert_eq!(hit.results.len(), 1);
        assert_eq!(hit.sources_searched, vec!["src1".to_string()]);
        assert_eq!(hit.search_duration_ms, 842);
    }

    #[tokio::test]
    async fn test_cache_miss_after_expiry() {
        let cache = SearchCache::new(0);
        cache.put("fp".to_string(), vec![make_result("Test")], vec![], 10).await;

        assert!(cache.get("fp").await.is_none());
        // Expired entry was also evicted
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = SearchCache::new(0);
        cache.put("a".to_string(), vec![], vec![], 0).await;
        cache.put("b".to_string(), vec![], vec![], 0).await;

        let purged = cache.purge_expired().await;
        assert_eq!(purged, 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = SearchCache::new(60);
        cache.put("fp".to_string(), vec![], vec![], 0).await;
        cache.invalidate("fp").await;
        assert!(cache.get("fp").await.is_none());
    }
}
