use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SeedingConfig;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid policy: {0}")]
    Invalid(String),
}

/// What to do when a seeding limit is breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Pause the torrent in the client and mark the download completed.
    Stop,
    /// Pause the torrent and leave the download paused.
    Pause,
    /// Remove the torrent from the client.
    Remove,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Stop => "stop",
            PolicyAction::Pause => "pause",
            PolicyAction::Remove => "remove",
        }
    }
}

/// A named seeding policy, optionally scoped to a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedingPolicy {
    pub name: String,
    /// When set, applies to downloads in this category.
    pub category: Option<String>,
    /// Stop seeding at this share ratio; `None` means no ratio limit.
    pub ratio_limit: Option<f64>,
    /// Stop seeding this long after completion; `None` means no time limit.
    pub time_limit_minutes: Option<u64>,
    pub action: PolicyAction,
    /// Whether a Remove action keeps downloaded files on disk.
    pub keep_files: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-download overrides; any field left `None` falls through to the
/// category policy and then the global defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadSeedingPolicy {
    pub ratio_limit: Option<f64>,
    pub time_limit_minutes: Option<u64>,
    pub action: Option<PolicyAction>,
    pub keep_files: Option<bool>,
}

/// Fully resolved limits for one download.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePolicy {
    pub ratio_limit: Option<f64>,
    pub time_limit_minutes: Option<u64>,
    pub action: PolicyAction,
    pub keep_files: bool,
}

/// Resolve the policy for a download: per-download override, then category
/// policy, then global defaults. Favorites are never removed, so a Remove
/// action downgrades to Stop for them.
pub fn resolve_effective(
    override_policy: Option<&DownloadSeedingPolicy>,
    category_policy: Option<&SeedingPolicy>,
    defaults: &SeedingConfig,
    favorite: bool,
) -> EffectivePolicy {
    let ratio_limit = override_policy
        .and_then(|p| p.ratio_limit)
        .or_else(|| category_policy.and_then(|p| p.ratio_limit))
        .or(defaults.ratio_limit);

    let time_limit_minutes = override_policy
        .and_then(|p| p.time_limit_minutes)
        .or_else(|| category_policy.and_then(|p| p.time_limit_minutes))
        .or(defaults.time_limit_minutes);

    let mut action = override_policy
        .and_then(|p| p.action)
        .or_else(|| category_policy.map(|p| p.action))
        .unwrap_or(defaults.action);

    let keep_files = override_policy
        .and_then(|p| p.keep_files)
        .or_else(|| category_policy.map(|p| p.keep_files))
        .unwrap_or(defaults.keep_files);

    if favorite && action == PolicyAction::Remove {
        action = PolicyAction::Stop;
    }

    EffectivePolicy {
        ratio_limit,
        time_limit_minutes,
        action,
        keep_files,
    }
}

impl EffectivePolicy {
    /// Whether the given ratio or seeding duration breaches this policy.
    pub fn is_breached(&self, ratio: f64, seeded_minutes: Option<u64>) -> bool {
        if let Some(limit) = self.ratio_limit {
            if ratio >= limit {
                return true;
            }
        }
        if let (Some(limit), Some(minutes)) = (self.time_limit_minutes, seeded_minutes) {
            if minutes >= limit {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> SeedingConfig {
        SeedingConfig::default() // ratio 2.0, stop, keep_files
    }

    fn category_policy() -> SeedingPolicy {
        SeedingPolicy {
            name: "movies".to_string(),
            category: Some("movies".to_string()),
            ratio_limit: Some(3.0),
            time_limit_minutes: Some(1440),
            action: PolicyAction::Remove,
            keep_files: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_defaults_only() {
        let effective = resolve_effective(None, None, &defaults(), false);
        assert_eq!(effective.ratio_limit, Some(2.0));
        assert_eq!(effective.time_limit_minutes, None);
        assert_eq!(effective.action, PolicyAction::Stop);
        assert!(effective.keep_files);
    }

    #[test]
    fn test_resolve_category_over_defaults() {
        let category = category_policy();
        let effective = resolve_effective(None, Some(&category), &defaults(), false);
        assert_eq!(effective.ratio_limit, Some(3.0));
        assert_eq!(effective.time_limit_minutes, Some(1440));
        assert_eq!(effective.action, PolicyAction::Remove);
        assert!(!effective.keep_files);
    }

    #[test]
    fn test_resolve_override_wins() {
        let category = category_policy();
        let override_policy = DownloadSeedingPolicy {
            ratio_limit: Some(5.0),
            time_limit_minutes: None,
            action: Some(PolicyAction::Pause),
            keep_files: None,
        };
        let effective =
            resolve_effective(Some(&override_policy), Some(&category), &defaults(), false);
        assert_eq!(effective.ratio_limit, Some(5.0));
        // Unset override fields fall through to the category policy
        assert_eq!(effective.time_limit_minutes, Some(1440));
        assert_eq!(effective.action, PolicyAction::Pause);
        assert!(!effective.keep_files);
    }

    #[test]
    fn test_favorite_downgrades_remove_to_stop() {
        let category = category_policy();
        let effective = resolve_effective(None, Some(&category), &defaults(), true);
        assert_eq!(effective.action, PolicyAction::Stop);

        // Non-remove actions are untouched for favorites
        let effective = resolve_effective(None, None, &defaults(), true);
        assert_eq!(effective.action, PolicyAction::Stop);
    }

    #[test]
    fn test_breach_checks() {
        let policy = EffectivePolicy {
            ratio_limit: Some(2.0),
            time_limit_minutes: Some(60),
            action: PolicyAction::Stop,
            keep_files: true,
        };

        assert!(!policy.is_breached(1.9, Some(30)));
        assert!(policy.is_breached(2.0, Some(30)));
        assert!(policy.is_breached(0.5, Some(60)));

        // No limits, never breached
        let unlimited = EffectivePolicy {
            ratio_limit: None,
            time_limit_minutes: None,
            action: PolicyAction::Stop,
            keep_files: true,
        };
        assert!(!unlimited.is_breached(100.0, Some(1_000_000)));

        // Time limit without a known completion time never triggers
        assert!(!policy.is_breached(1.0, None));
    }
}
