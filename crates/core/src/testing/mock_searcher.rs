//! Mock search source for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::search::{SearchError, SearchQuery, SearchResult, SourceSearcher};

/// Mock implementation of the `SourceSearcher` trait.
///
/// Returns configured results, fails once when an error is queued, and can
/// delay responses to exercise timeout handling.
pub struct MockSourceSearcher {
    name: String,
    results: Mutex<Vec<SearchResult>>,
    next_error: Mutex<Option<SearchError>>,
    delay: Mutex<Option<Duration>>,
    magnets: Mutex<HashMap<String, String>>,
    search_count: AtomicUsize,
}

impl MockSourceSearcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            results: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            delay: Mutex::new(None),
            magnets: Mutex::new(HashMap::new()),
            search_count: AtomicUsize::new(0),
        }
    }

    pub fn set_results(&self, results: Vec<SearchResult>) {
        *self.results.lock().unwrap() = results;
    }

    /// Make the next search fail once.
    pub fn set_next_error(&self, error: SearchError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Magnet to hand out from `resolve_magnet` for a result title.
    pub fn set_magnet(&self, title: &str, magnet: &str) {
        self.magnets
            .lock()
            .unwrap()
            .insert(title.to_string(), magnet.to_string());
    }

    /// Number of times `search` was called.
    pub fn search_count(&self) -> usize {
        self.search_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceSearcher for MockSourceSearcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<SearchResult>, SearchError> {
        self.search_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }

        Ok(self.results.lock().unwrap().clone())
    }

    async fn resolve_magnet(&self, result: &SearchResult) -> Result<String, SearchError> {
        self.magnets
            .lock()
            .unwrap()
            .get(&result.title)
            .cloned()
            .ok_or_else(|| SearchError::MagnetUnavailable(result.title.clone()))
    }
}
