//! Testing utilities and mock implementations.
//!
//! Provides mocks for the external service traits so orchestration logic
//! can be tested without a torrent daemon, search sources, or a VPN status
//! endpoint.

mod mock_searcher;
mod mock_torrent_client;
mod mock_vpn;

pub use mock_searcher::MockSourceSearcher;
pub use mock_torrent_client::MockTorrentClient;
pub use mock_vpn::MockVpnStatus;

use chrono::Utc;

use crate::downloads::{DownloadStatus, DownloadStore, TorrentDownload};

/// A download record with reasonable defaults for tests.
pub fn test_download(id: &str, info_hash: &str, status: DownloadStatus) -> TorrentDownload {
    let now = Utc::now();
    TorrentDownload {
        id: id.to_string(),
        name: format!("download-{}", id),
        info_hash: info_hash.to_string(),
        magnet_uri: format!("magnet:?xt=urn:btih:{}", info_hash),
        client_name: "mock".to_string(),
        client_id: info_hash.to_string(),
        status,
        progress: 0.0,
        size_bytes: 1024 * 1024 * 100,
        downloaded_bytes: 0,
        uploaded_bytes: 0,
        download_speed: 0,
        upload_speed: 0,
        peers: 0,
        seeders: 0,
        leechers: 0,
        eta_secs: None,
        save_path: None,
        category: None,
        requested_by: None,
        error_message: None,
        favorite: false,
        seeding_policy: None,
        added_at: now,
        started_at: None,
        completed_at: None,
        stopped_at: None,
        updated_at: now,
    }
}

/// Insert a defaulted download record directly into a store.
pub fn insert_test_download(
    store: &dyn DownloadStore,
    id: &str,
    info_hash: &str,
    status: DownloadStatus,
) {
    store
        .insert(&test_download(id, info_hash, status))
        .unwrap();
}
