//! Release name parsing.
//!
//! Extracts structured metadata (title, year, season/episode, quality tier,
//! source tag, codec, release group) from scene-style release names like
//! `The.Wire.S01E03.1080p.BluRay.x264-GROUP`.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;

/// Video resolution tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum QualityTier {
    Sd480p,
    Hd720p,
    Hd1080p,
    Uhd2160p,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Sd480p => "480p",
            QualityTier::Hd720p => "720p",
            QualityTier::Hd1080p => "1080p",
            QualityTier::Uhd2160p => "2160p",
        }
    }
}

/// Rip source tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceTag {
    BluRay,
    WebDl,
    WebRip,
    Hdtv,
    Dvd,
    Cam,
    Ts,
    Tc,
    R5,
    Screener,
}

impl SourceTag {
    /// Pre-retail and theater-recorded sources are never acceptable.
    pub fn is_banned(&self) -> bool {
        matches!(
            self,
            SourceTag::Cam | SourceTag::Ts | SourceTag::Tc | SourceTag::R5 | SourceTag::Screener
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::BluRay => "BluRay",
            SourceTag::WebDl => "WEB-DL",
            SourceTag::WebRip => "WEBRip",
            SourceTag::Hdtv => "HDTV",
            SourceTag::Dvd => "DVD",
            SourceTag::Cam => "CAM",
            SourceTag::Ts => "TS",
            SourceTag::Tc => "TC",
            SourceTag::R5 => "R5",
            SourceTag::Screener => "SCREENER",
        }
    }
}

/// Structured metadata parsed from a release name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedRelease {
    /// Title portion, with separators normalized to spaces.
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episode: Option<u16>,
    pub quality: Option<QualityTier>,
    pub source_tag: Option<SourceTag>,
    pub codec: Option<String>,
    pub group: Option<String>,
}

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").unwrap());
static EPISODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[Ss](\d{1,2})[Ee](\d{1,3})").unwrap());
static SEASON_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[Ss]eason[ .](\d{1,2})\b|\b[Ss](\d{1,2})\b").unwrap());
static GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)$").unwrap());

/// Parse a release name into its structured parts.
///
/// Parsing is best-effort: anything not recognized is simply left `None`,
/// and the title falls back to the whole (normalized) name when no metadata
/// token is found.
pub fn parse_release(name: &str) -> ParsedRelease {
    let normalized = name.replace(['.', '_'], " ");
    let lower = normalized.to_lowercase();

    let quality = parse_quality(&lower);
    let source_tag = parse_source_tag(&lower);
    let codec = parse_codec(&lower);

    let (season, episode) = match EPISODE_RE.captures(&normalized) {
        Some(caps) => {
            let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
            (season, episode)
        }
        None => {
            let season = SEASON_ONLY_RE.captures(&normalized).and_then(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .and_then(|m| m.as_str().parse().ok())
            });
            (season, None)
        }
    };

    // A year is only meaningful when something follows it; a title ending in
    // digits like "Blade Runner 2049" must keep them as part of the title.
    // When several qualify the last one is the release year; earlier ones
    // belong to the title ("Blade Runner 2049 2017 1080p").
    let year_match = YEAR_RE
        .captures_iter(&normalized)
        .filter_map(|caps| caps.get(1))
        .filter(|m| m.end() < normalized.trim_end().len())
        .last();
    let year = year_match.as_ref().and_then(|m| m.as_str().parse().ok());

    let group = GROUP_RE
        .captures(normalized.trim_end())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        // Codec tokens like x264 also end the name; they are not groups
        .filter(|g| parse_codec(&g.to_lowercase()).is_none());

    // Title runs until the first metadata token
    let mut title_end = normalized.len();
    if let Some(m) = &year_match {
        title_end = title_end.min(m.start());
    }
    if let Some(m) = EPISODE_RE.find(&normalized) {
        title_end = title_end.min(m.start());
    }
    // Offsets must index into `normalized`, so lowercase byte-for-byte;
    // full Unicode lowercasing can change byte lengths and shift offsets.
    for token in metadata_token_positions(&normalized.to_ascii_lowercase()) {
        title_end = title_end.min(token);
    }

    let title = normalized[..title_end]
        .trim()
        .trim_end_matches(['-', '(', '['])
        .trim()
        .to_string();
    let title = if title.is_empty() {
        normalized.trim().to_string()
    } else {
        title
    };

    ParsedRelease {
        title,
        year,
        season,
        episode,
        quality,
        source_tag,
        codec,
        group,
    }
}

fn parse_quality(lower: &str) -> Option<QualityTier> {
    if lower.contains("2160p") || lower.contains(" 4k") || lower.starts_with("4k") || lower.contains(" uhd") {
        Some(QualityTier::Uhd2160p)
    } else if lower.contains("1080p") || lower.contains("1080i") {
        Some(QualityTier::Hd1080p)
    } else if lower.contains("720p") {
        Some(QualityTier::Hd720p)
    } else if lower.contains("480p") || lower.contains("576p") {
        Some(QualityTier::Sd480p)
    } else {
        None
    }
}

fn parse_source_tag(lower: &str) -> Option<SourceTag> {
    // Banned tags are short words, so require word-ish boundaries to avoid
    // matching inside titles ("cast" contains neither " cam " nor "hdcam").
    let has = |needle: &str| lower.contains(needle);
    let has_word = |needle: &str| {
        lower.split(|c: char| !c.is_alphanumeric()).any(|w| w == needle)
    };

    if has("bluray") || has("blu-ray") || has("bdrip") || has("brrip") || has("remux") {
        Some(SourceTag::BluRay)
    } else if has("web-dl") || has("webdl") {
        Some(SourceTag::WebDl)
    } else if has("webrip") || has("web-rip") {
        Some(SourceTag::WebRip)
    } else if has("hdtv") {
        Some(SourceTag::Hdtv)
    } else if has("dvdrip") || has_word("dvd") {
        Some(SourceTag::Dvd)
    } else if has("hdcam") || has_word("cam") || has("camrip") {
        Some(SourceTag::Cam)
    } else if has("telesync") || has_word("ts") || has("hdts") {
        Some(SourceTag::Ts)
    } else if has("telecine") || has_word("tc") {
        Some(SourceTag::Tc)
    } else if has_word("r5") {
        Some(SourceTag::R5)
    } else if has("screener") || has_word("scr") || has("dvdscr") {
        Some(SourceTag::Screener)
    } else {
        None
    }
}

fn parse_codec(lower: &str) -> Option<String> {
    for codec in ["x265", "h265", "hevc", "x264", "h264", "avc", "av1", "xvid"] {
        if lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == codec)
        {
            return Some(codec.to_string());
        }
    }
    None
}

fn metadata_token_positions(lower: &str) -> Vec<usize> {
    let tokens = [
        "2160p", "1080p", "1080i", "720p", "480p", "576p", "4k", "uhd", "bluray", "blu-ray",
        "bdrip", "brrip", "remux", "web-dl", "webdl", "webrip", "web-rip", "hdtv", "dvdrip",
        "dvdscr", "hdcam", "camrip", "telesync", "telecine", "screener", "x265", "x264", "hevc",
        "h265", "h264", "av1", "xvid",
    ];
    tokens.iter().filter_map(|t| lower.find(t)).collect()
}
