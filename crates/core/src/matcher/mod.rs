//! Smart matching of search results against a wanted release.
//!
//! The pipeline runs in a fixed order: title similarity and year/episode
//! gates first, then hard filters (seeders, size, banned sources, excluded
//! words), then weighted scoring. Only candidates that survive every gate
//! are scored, and the highest total wins.

pub mod release;
mod score;

pub use release::{parse_release, ParsedRelease, QualityTier, SourceTag};
pub use score::{score_candidate, ScoreBreakdown};

use serde::Serialize;

use crate::search::{MediaType, SearchResult};

/// Minimum normalized-title similarity for a candidate to be considered.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// What we are looking for, and the preferences that shape scoring.
#[derive(Debug, Clone, Default)]
pub struct MatchCriteria {
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episode: Option<u16>,
    pub media_type: Option<MediaType>,
    pub min_seeders: u32,
    pub min_size_gb: Option<f64>,
    pub max_size_gb: Option<f64>,
    /// Case-insensitive substrings that disqualify a title.
    pub excluded_keywords: Vec<String>,
    /// Language markers (e.g. "FRENCH", "ITA") that disqualify a title.
    pub excluded_languages: Vec<String>,
    pub preferred_qualities: Vec<QualityTier>,
    pub preferred_sources: Vec<SourceTag>,
    pub trusted_groups: Vec<String>,
}

impl MatchCriteria {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn episode(title: impl Into<String>, season: u16, episode: u16) -> Self {
        Self {
            title: title.into(),
            season: Some(season),
            episode: Some(episode),
            media_type: Some(MediaType::Tv),
            ..Default::default()
        }
    }
}

/// A winning candidate with its parse and score attached.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedCandidate {
    pub result: SearchResult,
    pub parsed: ParsedRelease,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of matching a result set against criteria.
///
/// "Nothing survived the filters" is reported separately from "there was
/// nothing to evaluate", so callers can tell a bad search from strict
/// criteria.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    NoCandidates,
    NoMatch { evaluated: usize },
    Match(MatchedCandidate),
}

impl MatchOutcome {
    pub fn into_match(self) -> Option<MatchedCandidate> {
        match self {
            MatchOutcome::Match(m) => Some(m),
            _ => None,
        }
    }
}

/// Pick the best candidate for the criteria, or report why there is none.
///
/// Ties on total score keep the first-encountered candidate, so callers get
/// deterministic output for a given input order.
pub fn find_best_match(criteria: &MatchCriteria, results: &[SearchResult]) -> MatchOutcome {
    if results.is_empty() {
        return MatchOutcome::NoCandidates;
    }

    let mut best: Option<MatchedCandidate> = None;

    for result in results {
        let parsed = parse_release(&result.title);

        if !passes_title_gate(criteria, &parsed) {
            continue;
        }
        if !passes_hard_filters(criteria, &parsed, result) {
            continue;
        }

        let breakdown = score_candidate(&parsed, result, criteria);
        let better = match &best {
            Some(current) => breakdown.total > current.breakdown.total,
            None => true,
        };
        if better {
            best = Some(MatchedCandidate {
                result: result.clone(),
                parsed,
                breakdown,
            });
        }
    }

    match best {
        Some(candidate) => {
            tracing::debug!(
                title = %candidate.result.title,
                total = candidate.breakdown.total,
                "Selected best match"
            );
            MatchOutcome::Match(candidate)
        }
        None => MatchOutcome::NoMatch {
            evaluated: results.len(),
        },
    }
}

fn passes_title_gate(criteria: &MatchCriteria, parsed: &ParsedRelease) -> bool {
    if title_similarity(&criteria.title, &parsed.title) < SIMILARITY_THRESHOLD {
        return false;
    }

    // Movies within one year of the wanted release (re-releases shift dates)
    if let (Some(wanted), Some(found)) = (criteria.year, parsed.year) {
        if (wanted as i32 - found as i32).abs() > 1 {
            return false;
        }
    }

    // Episodic requests need the exact episode
    if let (Some(wanted), Some(found)) = (criteria.season, parsed.season) {
        if wanted != found {
            return false;
        }
    }
    if let (Some(wanted), Some(found)) = (criteria.episode, parsed.episode) {
        if wanted != found {
            return false;
        }
    }
    // A season-level release can't satisfy an episode request
    if criteria.episode.is_some() && parsed.season.is_some() && parsed.episode.is_none() {
        return false;
    }

    true
}

fn passes_hard_filters(
    criteria: &MatchCriteria,
    parsed: &ParsedRelease,
    result: &SearchResult,
) -> bool {
    if result.seeders < criteria.min_seeders {
        return false;
    }

    if let Some(tag) = parsed.source_tag {
        if tag.is_banned() {
            return false;
        }
    }

    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let size_gb = result.size_bytes as f64 / GB;
    if let Some(min) = criteria.min_size_gb {
        if size_gb < min {
            return false;
        }
    }
    if let Some(max) = criteria.max_size_gb {
        if size_gb > max {
            return false;
        }
    }

    let title_lower = result.title.to_lowercase();
    for word in criteria
        .excluded_keywords
        .iter()
        .chain(criteria.excluded_languages.iter())
    {
        if !word.is_empty() && title_lower.contains(&word.to_lowercase()) {
            return false;
        }
    }

    true
}

/// Normalize a title for comparison: lowercase, strip everything that is not
/// alphanumeric, collapse runs of whitespace.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity between two titles in [0, 1] based on edit distance over the
/// normalized forms.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - levenshtein_distance(&a, &b) as f64 / max_len as f64
}

/// Levenshtein edit distance between two strings.
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(a_len + 1) {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate().take(b_len + 1) {
        *val = j;
    }

    for (i, a_char) in a_chars.iter().enumerate() {
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if *a_char == *b_char { 0 } else { 1 };
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[a_len][b_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(title: &str, seeders: u32, size_bytes: u64) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            info_hash: Some(format!("{:x}", title.len())),
            magnet_uri: Some("magnet:?xt=urn:btih:abc".to_string()),
            details_url: None,
            size_bytes,
            seeders,
            leechers: 0,
            source: "src".to_string(),
            publish_date: None,
        }
    }

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The.Wire!"), "the wire");
        assert_eq!(normalize_title("  The   Wire  "), "the wire");
        assert_eq!(normalize_title("Amélie"), "amélie");
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("The Wire", "the.wire"), 1.0);
        assert!(title_similarity("The Wire", "The Wirr") > 0.8);
        assert!(title_similarity("The Wire", "Breaking Bad") < 0.5);
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
    }

    #[test]
    fn test_no_candidates() {
        let outcome = find_best_match(&MatchCriteria::new("The Wire"), &[]);
        assert!(matches!(outcome, MatchOutcome::NoCandidates));
    }

    #[test]
    fn test_no_match_after_filtering() {
        let criteria = MatchCriteria::episode("The Wire", 1, 3);
        let results = vec![make_result("Completely.Different.Show.S01E03.1080p.WEB-DL", 10, 4 * GB)];

        let outcome = find_best_match(&criteria, &results);
        assert!(matches!(outcome, MatchOutcome::NoMatch { evaluated: 1 }));
    }

    #[test]
    fn test_bluray_wins_over_banned_cam() {
        let criteria = MatchCriteria::episode("The Wire", 1, 3);
        let results = vec![
            make_result("The.Wire.S01E03.CAM.XViD", 500, 700 * 1024 * 1024),
            make_result("The.Wire.S01E03.1080p.BluRay.x264-GROUP", 12, 8 * GB),
        ];

        let matched = find_best_match(&criteria, &results)
            .into_match()
            .expect("Should match");
        assert!(matched.result.title.contains("BluRay"));
        assert_eq!(matched.parsed.source_tag, Some(SourceTag::BluRay));
    }

    #[test]
    fn test_wrong_episode_rejected() {
        let criteria = MatchCriteria::episode("The Wire", 1, 3);
        let results = vec![
            make_result("The.Wire.S01E04.1080p.BluRay.x264-GROUP", 50, 8 * GB),
            make_result("The.Wire.S02E03.1080p.BluRay.x264-GROUP", 50, 8 * GB),
        ];

        let outcome = find_best_match(&criteria, &results);
        assert!(matches!(outcome, MatchOutcome::NoMatch { .. }));
    }

    #[test]
    fn test_season_pack_rejected_for_episode_request() {
        let criteria = MatchCriteria::episode("The Wire", 1, 3);
        let results = vec![make_result("The.Wire.S01.1080p.BluRay.x264-GROUP", 50, 40 * GB)];

        let outcome = find_best_match(&criteria, &results);
        assert!(matches!(outcome, MatchOutcome::NoMatch { .. }));
    }

    #[test]
    fn test_movie_year_gate() {
        let mut criteria = MatchCriteria::new("Dune");
        criteria.year = Some(2021);
        criteria.media_type = Some(MediaType::Movie);

        let results = vec![
            make_result("Dune.1984.1080p.BluRay.x264-OLD", 80, 8 * GB),
            make_result("Dune.2021.1080p.WEB-DL.x265-NEW", 40, 6 * GB),
        ];

        let matched = find_best_match(&criteria, &results)
            .into_match()
            .expect("Should match");
        assert_eq!(matched.parsed.year, Some(2021));
    }

    #[test]
    fn test_year_within_one_accepted() {
        let mut criteria = MatchCriteria::new("Some Movie");
        criteria.year = Some(2021);

        let results = vec![make_result("Some.Movie.2022.1080p.BluRay.x264-G", 40, 8 * GB)];
        assert!(find_best_match(&criteria, &results).into_match().is_some());
    }

    #[test]
    fn test_title_year_does_not_trip_year_gate() {
        let mut criteria = MatchCriteria::new("Blade Runner 2049");
        criteria.year = Some(2017);
        criteria.media_type = Some(MediaType::Movie);

        let results = vec![make_result(
            "Blade.Runner.2049.2017.1080p.BluRay.x264-SPARKS",
            60,
            8 * GB,
        )];
        let matched = find_best_match(&criteria, &results)
            .into_match()
            .expect("Should match");
        assert_eq!(matched.parsed.year, Some(2017));
    }

    #[test]
    fn test_min_seeders_filter() {
        let mut criteria = MatchCriteria::new("Some Movie");
        criteria.min_seeders = 10;

        let results = vec![make_result("Some.Movie.2022.1080p.BluRay.x264-G", 3, 8 * GB)];
        let outcome = find_best_match(&criteria, &results);
        assert!(matches!(outcome, MatchOutcome::NoMatch { .. }));
    }

    #[test]
    fn test_size_bounds_filter() {
        let mut criteria = MatchCriteria::new("Some Movie");
        criteria.min_size_gb = Some(1.0);
        criteria.max_size_gb = Some(20.0);

        let results = vec![
            make_result("Some.Movie.2022.1080p.BluRay.x264-A", 40, 500 * 1024 * 1024),
            make_result("Some.Movie.2022.2160p.BluRay.x265-B", 40, 55 * GB),
            make_result("Some.Movie.2022.1080p.BluRay.x264-C", 40, 8 * GB),
        ];

        let matched = find_best_match(&criteria, &results)
            .into_match()
            .expect("Should match");
        assert!(matched.result.title.ends_with("-C"));
    }

    #[test]
    fn test_excluded_keywords_and_languages() {
        let mut criteria = MatchCriteria::new("Some Movie");
        criteria.excluded_keywords = vec!["HC".to_string()];
        criteria.excluded_languages = vec!["FRENCH".to_string()];

        let results = vec![
            make_result("Some.Movie.2022.FRENCH.1080p.BluRay.x264-A", 40, 8 * GB),
            make_result("Some.Movie.2022.1080p.HC.WEBRip.x264-B", 40, 8 * GB),
        ];

        let outcome = find_best_match(&criteria, &results);
        assert!(matches!(outcome, MatchOutcome::NoMatch { .. }));
    }

    #[test]
    fn test_tie_keeps_first_encountered() {
        let criteria = MatchCriteria::new("Some Movie");
        let results = vec![
            make_result("Some.Movie.2022.1080p.BluRay.x264-FIRST", 40, 8 * GB),
            make_result("Some.Movie.2022.1080p.BluRay.x264-SECOND", 40, 8 * GB),
        ];

        let matched = find_best_match(&criteria, &results)
            .into_match()
            .expect("Should match");
        assert!(matched.result.title.ends_with("-FIRST"));
    }

    #[test]
    fn test_breakdown_attached_to_winner() {
        let criteria = MatchCriteria::new("Some Movie");
        let results = vec![make_result("Some.Movie.2022.1080p.BluRay.x264-G", 40, 8 * GB)];

        let matched = find_best_match(&criteria, &results)
            .into_match()
            .expect("Should match");
        let b = matched.breakdown;
        assert!(b.total > 0.0);
        assert!((b.total - (b.quality + b.source + b.seeders + b.size + b.release_group)).abs() < 1e-9);
    }
}
