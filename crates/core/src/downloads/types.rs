use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::seeding::DownloadSeedingPolicy;
use crate::torrent_client::TorrentClientError;
use crate::vpn::VpnGateError;

use super::store::StoreError;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Download not found: {0}")]
    NotFound(String),

    /// VPN enforcement rejected the operation. Machine-checkable so callers
    /// can distinguish "fix your tunnel" from real failures.
    #[error("VPN is not active, refusing to start torrent traffic")]
    VpnUnavailable,

    #[error("Download already exists for info hash {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Client(#[from] TorrentClientError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid state transition: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },
}

impl DownloadError {
    pub fn is_vpn_unavailable(&self) -> bool {
        matches!(self, DownloadError::VpnUnavailable)
    }
}

impl From<VpnGateError> for DownloadError {
    fn from(_: VpnGateError) -> Self {
        // Any gate rejection means traffic must not start
        DownloadError::VpnUnavailable
    }
}

/// Lifecycle state of a managed download.
///
/// queued -> downloading -> completed -> seeding, with paused/failed/removed
/// reachable along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Seeding,
    Failed,
    Removed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Seeding => "seeding",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DownloadStatus::Queued),
            "downloading" => Some(DownloadStatus::Downloading),
            "paused" => Some(DownloadStatus::Paused),
            "completed" => Some(DownloadStatus::Completed),
            "seeding" => Some(DownloadStatus::Seeding),
            "failed" => Some(DownloadStatus::Failed),
            "removed" => Some(DownloadStatus::Removed),
            _ => None,
        }
    }

    /// States where the torrent is still attached to a client.
    pub fn is_active(&self) -> bool {
        !matches!(self, DownloadStatus::Failed | DownloadStatus::Removed)
    }
}

/// A download under management, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentDownload {
    pub id: String,
    pub name: String,
    /// Lowercase hex info hash; unique across live downloads.
    pub info_hash: String,
    pub magnet_uri: String,
    /// Which configured client holds this torrent.
    pub client_name: String,
    /// Daemon-side torrent identifier (the hash for most daemons).
    pub client_id: String,
    pub status: DownloadStatus,
    /// Completion fraction in [0, 1].
    pub progress: f64,
    pub size_bytes: u64,
    pub downloaded_bytes: u64,
    pub uploaded_bytes: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub peers: u32,
    pub seeders: u32,
    pub leechers: u32,
    pub eta_secs: Option<u64>,
    pub save_path: Option<String>,
    pub category: Option<String>,
    /// Who asked for this download, when known.
    pub requested_by: Option<String>,
    pub error_message: Option<String>,
    /// Favorites are exempt from policy removal.
    pub favorite: bool,
    /// Per-download seeding overrides, stored as JSON.
    pub seeding_policy: Option<DownloadSeedingPolicy>,
    pub added_at: DateTime<Utc>,
    /// First observed transfer.
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// When the download was removed or stopped by policy.
    pub stopped_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TorrentDownload {
    /// Share ratio; 0 until anything has been downloaded.
    pub fn ratio(&self) -> f64 {
        if self.downloaded_bytes == 0 {
            0.0
        } else {
            self.uploaded_bytes as f64 / self.downloaded_bytes as f64
        }
    }
}

/// Filter for listing downloads.
#[derive(Debug, Clone, Default)]
pub struct DownloadFilter {
    pub status: Option<DownloadStatus>,
    pub statuses: Vec<DownloadStatus>,
    pub client_name: Option<String>,
    pub category: Option<String>,
    pub favorite: Option<bool>,
    pub limit: Option<usize>,
}

impl DownloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: DownloadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_statuses(mut self, statuses: &[DownloadStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_client(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Snapshot of one client's live stats, included in aggregate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub name: String,
    pub connected: bool,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub torrent_count: u64,
}

/// Aggregate view over all managed downloads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    pub total: u64,
    pub queued: u64,
    pub downloading: u64,
    pub paused: u64,
    pub completed: u64,
    pub seeding: u64,
    pub failed: u64,
    pub total_downloaded_bytes: u64,
    pub total_uploaded_bytes: u64,
    /// Overall ratio across every download; 0 when nothing downloaded yet.
    pub overall_ratio: f64,
    pub clients: Vec<ClientSnapshot>,
}
