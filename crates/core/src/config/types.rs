use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vpn: VpnConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub seeding: SeedingConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub clients: Vec<TorrentClientConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("harpoon.db")
}

/// Supported daemon kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Transmission,
    // Future: Qbittorrent, Deluge
}

/// A registered torrent daemon connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    /// Unique name, referenced by downloads.
    pub name: String,
    /// Daemon kind; selects the adapter implementation.
    pub kind: ClientKind,
    /// Base URL of the daemon (e.g. "http://localhost:9091").
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Used when a download does not name a client.
    #[serde(default)]
    pub default: bool,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// A registered search source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Unique source name.
    pub name: String,
    /// Base URL of the provider.
    pub base_url: String,
    /// Whether the source participates in searches.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Ordering hint for display; higher searches are not prioritized.
    #[serde(default)]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

/// VPN gate/monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VpnConfig {
    /// When true, no mutating client operation runs without an active VPN.
    #[serde(default = "default_true")]
    pub enforce: bool,
    /// Status endpoint returning `{"connected": bool}`.
    #[serde(default)]
    pub status_url: Option<String>,
    /// Monitor poll interval in seconds (default: 30).
    #[serde(default = "default_vpn_interval")]
    pub poll_interval_secs: u64,
    /// Status probe timeout in seconds (default: 10).
    #[serde(default = "default_vpn_timeout")]
    pub timeout_secs: u32,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            status_url: None,
            poll_interval_secs: default_vpn_interval(),
            timeout_secs: default_vpn_timeout(),
        }
    }
}

fn default_vpn_interval() -> u64 {
    30
}

fn default_vpn_timeout() -> u32 {
    10
}

/// Search aggregator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Per-source timeout in seconds (default: 20). The aggregate search is
    /// bounded by this, not by the sum over sources.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
    /// Cache TTL in seconds (default: 900).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Maximum merged results per search (default: 100).
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            max_results: default_max_results(),
        }
    }
}

fn default_source_timeout() -> u64 {
    20
}

fn default_cache_ttl() -> u64 {
    900
}

fn default_max_results() -> usize {
    100
}

/// Global seeding policy defaults and enforcement interval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedingConfig {
    /// Enforcement loop interval in seconds (default: 300).
    #[serde(default = "default_enforce_interval")]
    pub enforce_interval_secs: u64,
    /// Default ratio limit; `None` disables ratio enforcement.
    #[serde(default = "default_ratio_limit")]
    pub ratio_limit: Option<f64>,
    /// Default seeding time limit in minutes; `None` disables time enforcement.
    #[serde(default)]
    pub time_limit_minutes: Option<u64>,
    /// Default action on breach.
    #[serde(default = "default_action")]
    pub action: crate::seeding::PolicyAction,
    /// Keep files when the breach action removes the torrent (default: true).
    #[serde(default = "default_true")]
    pub keep_files: bool,
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            enforce_interval_secs: default_enforce_interval(),
            ratio_limit: default_ratio_limit(),
            time_limit_minutes: None,
            action: default_action(),
            keep_files: true,
        }
    }
}

fn default_enforce_interval() -> u64 {
    300
}

fn default_ratio_limit() -> Option<f64> {
    Some(2.0)
}

fn default_action() -> crate::seeding::PolicyAction {
    crate::seeding::PolicyAction::Stop
}

/// Stats reconciliation loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileConfig {
    /// How often to poll client adapters for live stats (milliseconds).
    #[serde(default = "default_reconcile_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_reconcile_interval(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    5000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub database: DatabaseConfig,
    pub vpn: VpnConfig,
    pub search: SearchConfig,
    pub seeding: SeedingConfig,
    pub reconcile: ReconcileConfig,
    pub clients: Vec<SanitizedClientConfig>,
    pub sources: Vec<SourceConfig>,
}

/// Sanitized client config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedClientConfig {
    pub name: String,
    pub kind: ClientKind,
    pub url: String,
    pub credentials_configured: bool,
    pub default: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            database: config.database.clone(),
            vpn: config.vpn.clone(),
            search: config.search.clone(),
            seeding: config.seeding.clone(),
            reconcile: config.reconcile.clone(),
            clients: config
                .clients
                .iter()
                .map(|c| SanitizedClientConfig {
                    name: c.name.clone(),
                    kind: c.kind,
                    url: c.url.clone(),
                    credentials_configured: c.username.is_some() || c.password.is_some(),
                    default: c.default,
                    timeout_secs: c.timeout_secs,
                })
                .collect(),
            sources: config.sources.clone(),
        }
    }
}
