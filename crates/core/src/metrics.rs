//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Search (aggregated queries, cache, per-source failures)
//! - Downloads (started, completed, failed)
//! - VPN monitoring (sweeps, paused downloads)
//! - Seeding policy enforcement

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Search
// =============================================================================

/// Aggregated searches total.
pub static SEARCHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harpoon_searches_total", "Total aggregated searches").unwrap()
});

/// Searches served from the cache.
pub static SEARCH_CACHE_HITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harpoon_search_cache_hits_total", "Searches served from cache").unwrap()
});

/// Per-source search failures, timeouts included.
pub static SOURCE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harpoon_source_failures_total",
            "Search source failures and timeouts",
        ),
        &["source"],
    )
    .unwrap()
});

/// End-to-end search duration in seconds.
pub static SEARCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("harpoon_search_duration_seconds", "Duration of a search")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]),
    )
    .unwrap()
});

// =============================================================================
// Downloads
// =============================================================================

/// Downloads handed to a torrent client.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harpoon_downloads_started_total", "Downloads started").unwrap()
});

/// Downloads that reached completion.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harpoon_downloads_completed_total", "Downloads completed").unwrap()
});

/// Downloads that failed unrecoverably.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harpoon_downloads_failed_total", "Downloads failed").unwrap()
});

// =============================================================================
// VPN
// =============================================================================

/// Disconnect sweeps performed.
pub static VPN_SWEEPS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harpoon_vpn_sweeps_total", "VPN disconnect sweeps").unwrap()
});

/// Downloads paused by disconnect sweeps.
pub static VPN_PAUSED_DOWNLOADS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "harpoon_vpn_paused_downloads_total",
        "Downloads paused by VPN sweeps",
    )
    .unwrap()
});

// =============================================================================
// Seeding
// =============================================================================

/// Policy actions applied by action kind.
pub static POLICY_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harpoon_policy_actions_total",
            "Seeding policy actions applied",
        ),
        &["action"], // "stop", "pause", "remove"
    )
    .unwrap()
});

/// All metrics for registration with a Prometheus registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Search
        Box::new(SEARCHES_TOTAL.clone()),
        Box::new(SEARCH_CACHE_HITS.clone()),
        Box::new(SOURCE_FAILURES.clone()),
        Box::new(SEARCH_DURATION.clone()),
        // Downloads
        Box::new(DOWNLOADS_STARTED.clone()),
        Box::new(DOWNLOADS_COMPLETED.clone()),
        Box::new(DOWNLOADS_FAILED.clone()),
        // VPN
        Box::new(VPN_SWEEPS.clone()),
        Box::new(VPN_PAUSED_DOWNLOADS.clone()),
        // Seeding
        Box::new(POLICY_ACTIONS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        SEARCHES_TOTAL.inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "harpoon_searches_total"));
    }
}
