//! Deduplication of search results by info_hash.

use std::collections::HashMap;

use super::SearchResult;

/// Deduplicate results from multiple sources by info_hash.
///
/// When two results share an info hash, the one with more seeders wins; on a
/// tie the earlier-seen result is kept. Results without an info_hash cannot
/// be compared and are kept as-is.
///
/// The final list is sorted by seeders (descending).
pub fn deduplicate_results(raw: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut by_hash: HashMap<String, SearchResult> = HashMap::new();
    let mut no_hash: Vec<SearchResult> = Vec::new();

    for mut r in raw {
        match r.info_hash.as_deref() {
            Some(hash) if !hash.is_empty() => {
                let hash = hash.to_lowercase();
                r.info_hash = Some(hash.clone());
                match by_hash.get_mut(&hash) {
                    Some(existing) => {
                        if r.seeders > existing.seeders {
                            *existing = r;
                        }
                    }
                    None => {
                        by_hash.insert(hash, r);
                    }
                }
            }
            _ => {
                r.info_hash = None;
                no_hash.push(r);
            }
        }
    }

    let mut results: Vec<_> = by_hash.into_values().chain(no_hash).collect();
    results.sort_by(|a, b| b.seeders.cmp(&a.seeders));
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(
        title: &str,
        source: &str,
        info_hash: Option<&str>,
        seeders: u32,
    ) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            info_hash: info_hash.map(|s| s.to_string()),
            magnet_uri: info_hash.map(|h| format!("magnet:?xt=urn:btih:{}", h)),
            details_url: None,
            size_bytes: 1000,
            seeders,
            leechers: 1,
            source: source.to_string(),
            publish_date: None,
        }
    }

    #[test]
    fn test_dedup_single_result() {
        let results = deduplicate_results(vec![make_result("Test", "src1", Some("abc123"), 10)]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Test");
        assert_eq!(results[0].seeders, 10);
    }

    #[test]
    fn test_dedup_keeps_higher_seeders() {
        let results = deduplicate_results(vec![
            make_result("Test A", "src1", Some("ABC123"), 10), // uppercase hash
            make_result("Test B", "src2", Some("abc123"), 20), // lowercase hash
            make_result("Test C", "src3", Some("ABC123"), 15),
        ]);

        assert_eq!(results.len(), 1);
        // Variant with the most seeders survives
        assert_eq!(results[0].title, "Test B");
        assert_eq!(results[0].source, "src2");
        assert_eq!(results[0].seeders, 20);
        // Hash is normalized to lowercase
        assert_eq!(results[0].info_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_dedup_tie_keeps_first_seen() {
        let results = deduplicate_results(vec![
            make_result("First", "src1", Some("abc123"), 10),
            make_result("Second", "src2", Some("abc123"), 10),
        ]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "First");
    }

    #[test]
    fn test_dedup_keeps_no_hash_separate() {
        let results = deduplicate_results(vec![
            make_result("With Hash", "src1", Some("abc123"), 10),
            make_result("No Hash 1", "src2", None, 20),
            make_result("No Hash 2", "src3", None, 15),
        ]);

        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_dedup_empty_hash_treated_as_no_hash() {
        let results = deduplicate_results(vec![
            make_result("Empty Hash 1", "src1", Some(""), 10),
            make_result("Empty Hash 2", "src2", Some(""), 20),
        ]);

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.info_hash.is_none()));
    }

    #[test]
    fn test_dedup_sorts_by_seeders() {
        let results = deduplicate_results(vec![
            make_result("Low", "src1", Some("hash1"), 5),
            make_result("High", "src2", Some("hash2"), 50),
            make_result("Medium", "src3", Some("hash3"), 20),
        ]);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].seeders, 50);
        assert_eq!(results[1].seeders, 20);
        assert_eq!(results[2].seeders, 5);
    }
}
