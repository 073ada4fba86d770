//! Candidate scoring.
//!
//! A pure function over parsed release metadata, raw result stats, and the
//! request's preferences. The maximum total is 100:
//! quality 30, source 25, seeders 20, size 15, release group 10.

use serde::Serialize;

use crate::search::SearchResult;

use super::release::{ParsedRelease, QualityTier, SourceTag};
use super::MatchCriteria;

/// Per-component score, summing to the total.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreBreakdown {
    pub quality: f64,
    pub source: f64,
    pub seeders: f64,
    pub size: f64,
    pub release_group: f64,
    pub total: f64,
}

/// Score one candidate. Higher is better, max 100.
pub fn score_candidate(
    parsed: &ParsedRelease,
    result: &SearchResult,
    criteria: &MatchCriteria,
) -> ScoreBreakdown {
    let quality = quality_score(parsed.quality, criteria);
    let source = source_score(parsed.source_tag, criteria);
    let seeders = seeder_score(result.seeders);
    let size = size_score(parsed.quality, result.size_bytes);
    let release_group = group_score(parsed.group.as_deref(), criteria);

    ScoreBreakdown {
        quality,
        source,
        seeders,
        size,
        release_group,
        total: quality + source + seeders + size + release_group,
    }
}

fn quality_score(quality: Option<QualityTier>, criteria: &MatchCriteria) -> f64 {
    let base: f64 = match quality {
        Some(QualityTier::Uhd2160p) => 30.0,
        Some(QualityTier::Hd1080p) => 25.0,
        Some(QualityTier::Hd720p) => 18.0,
        Some(QualityTier::Sd480p) => 10.0,
        None => 5.0,
    };
    let bonus = match quality {
        Some(q) if criteria.preferred_qualities.contains(&q) => 5.0,
        _ => 0.0,
    };
    (base + bonus).min(30.0)
}

fn source_score(tag: Option<SourceTag>, criteria: &MatchCriteria) -> f64 {
    let base: f64 = match tag {
        Some(SourceTag::BluRay) => 25.0,
        Some(SourceTag::WebDl) => 20.0,
        Some(SourceTag::WebRip) => 16.0,
        Some(SourceTag::Hdtv) => 12.0,
        Some(SourceTag::Dvd) => 8.0,
        // Banned tags never reach scoring; anything else is unknown
        _ => 5.0,
    };
    let bonus = match tag {
        Some(t) if criteria.preferred_sources.contains(&t) => 5.0,
        _ => 0.0,
    };
    (base + bonus).min(25.0)
}

fn seeder_score(seeders: u32) -> f64 {
    if seeders == 0 {
        return 0.0;
    }
    (5.0 + (seeders as f64).log10() * 5.0).min(20.0)
}

/// Triangular size score around a per-tier ideal.
///
/// Zero below the tier minimum (likely fake or heavily re-encoded), rising
/// linearly to the full 15 at the ideal size, falling to 5 at the tier
/// maximum and staying there for anything bigger.
fn size_score(quality: Option<QualityTier>, size_bytes: u64) -> f64 {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let (min_gb, ideal_gb, max_gb) = match quality {
        Some(QualityTier::Uhd2160p) => (8.0, 20.0, 60.0),
        Some(QualityTier::Hd1080p) => (2.0, 8.0, 25.0),
        Some(QualityTier::Hd720p) => (0.7, 3.0, 10.0),
        Some(QualityTier::Sd480p) => (0.3, 1.5, 6.0),
        None => (0.3, 5.0, 30.0),
    };

    let gb = size_bytes as f64 / GB;
    if gb < min_gb {
        0.0
    } else if gb <= ideal_gb {
        15.0 * (gb - min_gb) / (ideal_gb - min_gb)
    } else if gb <= max_gb {
        15.0 - 10.0 * (gb - ideal_gb) / (max_gb - ideal_gb)
    } else {
        5.0
    }
}

fn group_score(group: Option<&str>, criteria: &MatchCriteria) -> f64 {
    match group {
        Some(g)
            if criteria
                .trusted_groups
                .iter()
                .any(|t| t.eq_ignore_ascii_case(g)) =>
        {
            10.0
        }
        _ => 5.0,
    }
}
