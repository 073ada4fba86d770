//! Mock torrent client for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::torrent_client::{
    AddTorrentRequest, AddedTorrent, ClientStats, TorrentClient, TorrentClientError,
    TorrentFilters, TorrentInfo, TorrentState,
};

/// Mock implementation of the `TorrentClient` trait.
///
/// Records every mutating call for assertions and lets tests drive
/// per-torrent state and progress. `set_next_error` makes the next client
/// call fail once.
pub struct MockTorrentClient {
    name: String,
    torrents: Mutex<HashMap<String, TorrentInfo>>,
    added: Mutex<Vec<String>>,
    paused: Mutex<Vec<String>>,
    resumed: Mutex<Vec<String>>,
    removed: Mutex<Vec<(String, bool)>>,
    next_error: Mutex<Option<String>>,
    hash_counter: Mutex<u32>,
}

impl MockTorrentClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            torrents: Mutex::new(HashMap::new()),
            added: Mutex::new(Vec::new()),
            paused: Mutex::new(Vec::new()),
            resumed: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
            hash_counter: Mutex::new(0),
        }
    }

    /// Make the next client call fail once with a connection error.
    pub fn set_next_error(&self, message: impl Into<String>) {
        *self.next_error.lock().unwrap() = Some(message.into());
    }

    /// Register a torrent as if the daemon already tracked it.
    pub fn add_mock_torrent(&self, hash: &str, state: TorrentState, progress: f64) {
        let mut info = blank_info(hash);
        info.state = state;
        info.progress = progress;
        info.downloaded_bytes = (info.size_bytes as f64 * progress) as u64;
        self.torrents.lock().unwrap().insert(hash.to_string(), info);
    }

    pub fn set_progress(&self, hash: &str, progress: f64) {
        let mut torrents = self.torrents.lock().unwrap();
        if let Some(info) = torrents.get_mut(hash) {
            info.progress = progress.clamp(0.0, 1.0);
            info.downloaded_bytes = (info.size_bytes as f64 * info.progress) as u64;
        }
    }

    pub fn set_state(&self, hash: &str, state: TorrentState) {
        let mut torrents = self.torrents.lock().unwrap();
        if let Some(info) = torrents.get_mut(hash) {
            info.state = state;
        }
    }

    /// Magnet URIs recorded by `add_torrent`.
    pub fn added_magnets(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub fn paused_hashes(&self) -> Vec<String> {
        self.paused.lock().unwrap().clone()
    }

    pub fn resumed_hashes(&self) -> Vec<String> {
        self.resumed.lock().unwrap().clone()
    }

    /// Hashes removed, with the delete_files flag for each.
    pub fn removed_hashes(&self) -> Vec<(String, bool)> {
        self.removed.lock().unwrap().clone()
    }

    fn take_error(&self) -> Option<TorrentClientError> {
        self.next_error
            .lock()
            .unwrap()
            .take()
            .map(TorrentClientError::ConnectionFailed)
    }
}

fn blank_info(hash: &str) -> TorrentInfo {
    TorrentInfo {
        hash: hash.to_lowercase(),
        name: format!("torrent-{}", hash),
        state: TorrentState::Downloading,
        progress: 0.0,
        size_bytes: 1024 * 1024 * 100,
        downloaded_bytes: 0,
        uploaded_bytes: 0,
        download_speed: 0,
        upload_speed: 0,
        peers: 0,
        seeders: 5,
        leechers: 1,
        ratio: 0.0,
        eta_secs: None,
        added_at: Some(Utc::now()),
        completed_at: None,
        save_path: Some("/mock/downloads".to_string()),
        category: None,
    }
}

fn extract_hash(magnet_uri: &str) -> Option<String> {
    let start = magnet_uri.find("urn:btih:")? + "urn:btih:".len();
    let hash = magnet_uri[start..].split('&').next()?;
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_lowercase())
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<bool, TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        Ok(true)
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddedTorrent, TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }

        let hash = match extract_hash(&request.magnet_uri) {
            Some(hash) => hash,
            None => {
                let mut counter = self.hash_counter.lock().unwrap();
                *counter += 1;
                format!("{:040x}", *counter)
            }
        };

        let mut info = blank_info(&hash);
        info.state = if request.paused {
            TorrentState::Paused
        } else {
            TorrentState::Downloading
        };
        info.category = request.category.clone();
        if let Some(path) = &request.download_path {
            info.save_path = Some(path.clone());
        }

        let state = info.state;
        self.torrents.lock().unwrap().insert(hash.clone(), info);
        self.added.lock().unwrap().push(request.magnet_uri.clone());

        Ok(AddedTorrent {
            hash: hash.clone(),
            client_id: hash,
            name: None,
            state,
        })
    }

    async fn get_torrent(&self, id: &str) -> Result<Option<TorrentInfo>, TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        Ok(self.torrents.lock().unwrap().get(&id.to_lowercase()).cloned())
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        let torrents = self.torrents.lock().unwrap();
        Ok(torrents
            .values()
            .filter(|t| filters.state.map_or(true, |s| t.state == s))
            .cloned()
            .collect())
    }

    async fn pause_torrent(&self, id: &str) -> Result<(), TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        let hash = id.to_lowercase();
        let mut torrents = self.torrents.lock().unwrap();
        if let Some(info) = torrents.get_mut(&hash) {
            info.state = TorrentState::Paused;
        }
        self.paused.lock().unwrap().push(hash);
        Ok(())
    }

    async fn resume_torrent(&self, id: &str) -> Result<(), TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        let hash = id.to_lowercase();
        let mut torrents = self.torrents.lock().unwrap();
        if let Some(info) = torrents.get_mut(&hash) {
            info.state = TorrentState::Downloading;
        }
        self.resumed.lock().unwrap().push(hash);
        Ok(())
    }

    async fn remove_torrent(
        &self,
        id: &str,
        delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        let hash = id.to_lowercase();
        self.torrents.lock().unwrap().remove(&hash);
        self.removed.lock().unwrap().push((hash, delete_files));
        Ok(())
    }

    async fn get_stats(&self) -> Result<ClientStats, TorrentClientError> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        let torrents = self.torrents.lock().unwrap();
        Ok(ClientStats {
            download_speed: torrents.values().map(|t| t.download_speed).sum(),
            upload_speed: torrents.values().map(|t| t.upload_speed).sum(),
            torrent_count: torrents.len() as u64,
            active_count: torrents
                .values()
                .filter(|t| {
                    matches!(t.state, TorrentState::Downloading | TorrentState::Seeding)
                })
                .count() as u64,
            paused_count: torrents
                .values()
                .filter(|t| t.state == TorrentState::Paused)
                .count() as u64,
            free_space_bytes: None,
        })
    }
}
