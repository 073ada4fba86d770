//! Types for torrent client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during torrent client operations.
///
/// Every daemon-specific failure is normalized into one of these variants,
/// carrying the daemon's message where available.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("Client operation failed: {0}")]
    CommandFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TorrentClientError {
    /// Whether the failure is unrecoverable for the torrent it refers to.
    ///
    /// Unrecoverable failures move the owning download to `failed`; everything
    /// else is surfaced to the caller with the download state left as-is.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            TorrentClientError::InvalidTorrent(_) | TorrentClientError::TorrentNotFound(_)
        )
    }
}

/// State of a torrent as reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Queued by the daemon, transfer not started yet.
    Queued,
    /// Downloading from peers.
    Downloading,
    /// Seeding to peers.
    Seeding,
    /// Transfer is paused.
    Paused,
    /// Checking file integrity.
    Checking,
    /// Error state.
    Error,
    /// Unknown state.
    Unknown,
}

impl TorrentState {
    /// Returns the string representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            TorrentState::Queued => "queued",
            TorrentState::Downloading => "downloading",
            TorrentState::Seeding => "seeding",
            TorrentState::Paused => "paused",
            TorrentState::Checking => "checking",
            TorrentState::Error => "error",
            TorrentState::Unknown => "unknown",
        }
    }
}

/// Live information about a torrent in the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentInfo {
    /// Info hash (lowercase hex).
    pub hash: String,
    /// Torrent name.
    pub name: String,
    /// Current state.
    pub state: TorrentState,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// Downloaded bytes.
    pub downloaded_bytes: u64,
    /// Uploaded bytes.
    pub uploaded_bytes: u64,
    /// Current download speed in bytes/second.
    pub download_speed: u64,
    /// Current upload speed in bytes/second.
    pub upload_speed: u64,
    /// Connected peers.
    pub peers: u32,
    /// Number of seeders.
    pub seeders: u32,
    /// Number of leechers.
    pub leechers: u32,
    /// Ratio (uploaded/downloaded).
    pub ratio: f64,
    /// ETA in seconds (None if unknown or complete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
    /// When the torrent was added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// When the torrent completed downloading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Save path on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Category/label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Request to add a new torrent via magnet URI.
#[derive(Debug, Clone)]
pub struct AddTorrentRequest {
    /// Magnet URI.
    pub magnet_uri: String,
    /// Optional download path override.
    pub download_path: Option<String>,
    /// Optional category/label.
    pub category: Option<String>,
    /// Start paused.
    pub paused: bool,
    /// Optional daemon-side priority (daemon-specific scale).
    pub priority: Option<u8>,
}

impl AddTorrentRequest {
    /// Create a magnet request with default options.
    pub fn magnet(uri: impl Into<String>) -> Self {
        Self {
            magnet_uri: uri.into(),
            download_path: None,
            category: None,
            paused: false,
            priority: None,
        }
    }

    /// Set the download path.
    pub fn with_download_path(mut self, path: impl Into<String>) -> Self {
        self.download_path = Some(path.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, cat: impl Into<String>) -> Self {
        self.category = Some(cat.into());
        self
    }

    /// Set whether to start paused.
    pub fn with_paused(mut self, p: bool) -> Self {
        self.paused = p;
        self
    }

    /// Set the daemon-side priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Filters for listing torrents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorrentFilters {
    /// Filter by state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TorrentState>,
    /// Filter by category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Search by name (partial match).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl TorrentFilters {
    /// Check if any filters are set.
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.category.is_none() && self.search.is_none()
    }
}

/// Result of adding a torrent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedTorrent {
    /// Info hash of the added torrent (lowercase hex).
    pub hash: String,
    /// Daemon-side torrent identifier (the hash for most daemons).
    pub client_id: String,
    /// Name of the torrent (may be unknown for magnets initially).
    pub name: Option<String>,
    /// Initial state reported by the daemon (queued vs downloading is
    /// daemon-dependent).
    pub state: TorrentState,
}

/// Aggregate transfer statistics for a daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientStats {
    /// Current total download speed in bytes/second.
    pub download_speed: u64,
    /// Current total upload speed in bytes/second.
    pub upload_speed: u64,
    /// Total number of torrents known to the daemon.
    pub torrent_count: u64,
    /// Torrents actively transferring.
    pub active_count: u64,
    /// Torrents paused.
    pub paused_count: u64,
    /// Free space at the default download location, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_space_bytes: Option<u64>,
}

/// Trait for torrent client backends.
///
/// One implementation per daemon type; the orchestration layer depends only
/// on this interface and never branches on daemon identity.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Establish (or verify) a connection to the daemon.
    ///
    /// A failure here is non-fatal at startup; later operations may retry.
    async fn connect(&self) -> Result<bool, TorrentClientError>;

    /// Whether the last connection attempt succeeded.
    async fn is_connected(&self) -> bool;

    /// Add a new torrent.
    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddedTorrent, TorrentClientError>;

    /// Get a specific torrent by daemon-side id (info hash).
    async fn get_torrent(&self, id: &str) -> Result<Option<TorrentInfo>, TorrentClientError>;

    /// List all torrents, optionally filtered.
    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError>;

    /// Pause a torrent.
    async fn pause_torrent(&self, id: &str) -> Result<(), TorrentClientError>;

    /// Resume a paused torrent.
    async fn resume_torrent(&self, id: &str) -> Result<(), TorrentClientError>;

    /// Remove a torrent.
    /// If `delete_files` is true, also delete downloaded files.
    async fn remove_torrent(&self, id: &str, delete_files: bool)
        -> Result<(), TorrentClientError>;

    /// Aggregate transfer statistics.
    async fn get_stats(&self) -> Result<ClientStats, TorrentClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_state_as_str() {
        assert_eq!(TorrentState::Queued.as_str(), "queued");
        assert_eq!(TorrentState::Downloading.as_str(), "downloading");
        assert_eq!(TorrentState::Seeding.as_str(), "seeding");
        assert_eq!(TorrentState::Paused.as_str(), "paused");
        assert_eq!(TorrentState::Checking.as_str(), "checking");
        assert_eq!(TorrentState::Error.as_str(), "error");
        assert_eq!(TorrentState::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_torrent_state_serialization() {
        assert_eq!(
            serde_json::to_string(&TorrentState::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(
            serde_json::to_string(&TorrentState::Seeding).unwrap(),
            "\"seeding\""
        );
    }

    #[test]
    fn test_add_torrent_request_builder() {
        let req = AddTorrentRequest::magnet("magnet:?xt=urn:btih:abc123")
            .with_download_path("/downloads")
            .with_category("movies")
            .with_paused(true)
            .with_priority(3);

        assert_eq!(req.magnet_uri, "magnet:?xt=urn:btih:abc123");
        assert_eq!(req.download_path, Some("/downloads".to_string()));
        assert_eq!(req.category, Some("movies".to_string()));
        assert!(req.paused);
        assert_eq!(req.priority, Some(3));
    }

    #[test]
    fn test_torrent_filters_is_empty() {
        let empty = TorrentFilters::default();
        assert!(empty.is_empty());

        let with_state = TorrentFilters {
            state: Some(TorrentState::Downloading),
            ..Default::default()
        };
        assert!(!with_state.is_empty());
    }

    #[test]
    fn test_error_classification() {
        assert!(TorrentClientError::InvalidTorrent("bad magnet".into()).is_unrecoverable());
        assert!(TorrentClientError::TorrentNotFound("abc".into()).is_unrecoverable());
        assert!(!TorrentClientError::Timeout.is_unrecoverable());
        assert!(!TorrentClientError::ConnectionFailed("refused".into()).is_unrecoverable());
        assert!(!TorrentClientError::CommandFailed("busy".into()).is_unrecoverable());
    }

    #[test]
    fn test_torrent_info_serialization() {
        let info = TorrentInfo {
            hash: "abc123".to_string(),
            name: "Test Torrent".to_string(),
            state: TorrentState::Downloading,
            progress: 0.5,
            size_bytes: 1024 * 1024 * 100,
            downloaded_bytes: 1024 * 1024 * 50,
            uploaded_bytes: 1024 * 1024 * 10,
            download_speed: 1024 * 100,
            upload_speed: 1024 * 10,
            peers: 15,
            seeders: 10,
            leechers: 5,
            ratio: 0.2,
            eta_secs: Some(3600),
            added_at: None,
            completed_at: None,
            save_path: Some("/downloads".to_string()),
            category: Some("movies".to_string()),
        };

        let json = serde_json::to_string(&info).unwrap();
        let parsed: TorrentInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.hash, "abc123");
        assert_eq!(parsed.state, TorrentState::Downloading);
        assert!((parsed.progress - 0.5).abs() < 0.001);
        assert_eq!(parsed.eta_secs, Some(3600));
    }
}
