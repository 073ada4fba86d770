//! Transmission torrent client implementation.
//!
//! Talks to the Transmission RPC endpoint (`/transmission/rpc`). The daemon
//! hands out a CSRF session id via a 409 response; we store it and
//! renegotiate whenever it expires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::TorrentClientConfig;

use super::{
    AddTorrentRequest, AddedTorrent, ClientStats, TorrentClient, TorrentClientError,
    TorrentFilters, TorrentInfo, TorrentState,
};

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Fields requested from `torrent-get`.
const TORRENT_FIELDS: &[&str] = &[
    "hashString",
    "name",
    "status",
    "percentDone",
    "totalSize",
    "downloadedEver",
    "uploadedEver",
    "rateDownload",
    "rateUpload",
    "peersConnected",
    "peersSendingToUs",
    "peersGettingFromUs",
    "uploadRatio",
    "eta",
    "addedDate",
    "doneDate",
    "downloadDir",
    "labels",
];

/// Transmission client implementation.
pub struct TransmissionClient {
    client: Client,
    name: String,
    url: String,
    username: Option<String>,
    password: Option<String>,
    /// CSRF session id (renegotiated on 409).
    session_id: Arc<RwLock<Option<String>>>,
    connected: Arc<AtomicBool>,
}

impl TransmissionClient {
    /// Create a new Transmission client.
    pub fn new(config: &TorrentClientConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            name: config.name.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            session_id: Arc::new(RwLock::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn rpc_url(&self) -> String {
        format!("{}/transmission/rpc", self.url)
    }

    /// Issue one RPC call, renegotiating the session id on 409.
    async fn rpc(
        &self,
        method: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, TorrentClientError> {
        let body = json!({ "method": method, "arguments": arguments });

        for attempt in 0..2 {
            let mut request = self.client.post(self.rpc_url()).json(&body);

            if let (Some(user), Some(pass)) = (&self.username, &self.password) {
                request = request.basic_auth(user, Some(pass));
            }
            if let Some(ref session) = *self.session_id.read().await {
                request = request.header(SESSION_ID_HEADER, session);
            }

            let response = request.send().await.map_err(|e| {
                self.connected.store(false, Ordering::Relaxed);
                if e.is_timeout() {
                    TorrentClientError::Timeout
                } else if e.is_connect() {
                    TorrentClientError::ConnectionFailed(e.to_string())
                } else {
                    TorrentClientError::CommandFailed(e.to_string())
                }
            })?;

            let status = response.status();

            if status.as_u16() == 409 {
                // Session expired (or first call): pick up the new id and retry.
                let new_session = response
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        TorrentClientError::CommandFailed(
                            "409 without session id header".to_string(),
                        )
                    })?;
                debug!(client = %self.name, "Transmission session renegotiated");
                *self.session_id.write().await = Some(new_session);
                if attempt == 0 {
                    continue;
                }
                return Err(TorrentClientError::CommandFailed(
                    "Session renegotiation loop".to_string(),
                ));
            }

            if status.as_u16() == 401 {
                return Err(TorrentClientError::AuthenticationFailed(
                    "Invalid credentials".to_string(),
                ));
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TorrentClientError::CommandFailed(format!(
                    "HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                )));
            }

            let envelope: RpcEnvelope = response
                .json()
                .await
                .map_err(|e| TorrentClientError::CommandFailed(format!("Invalid RPC response: {}", e)))?;

            if envelope.result != "success" {
                return Err(TorrentClientError::CommandFailed(envelope.result));
            }

            self.connected.store(true, Ordering::Relaxed);
            return Ok(envelope.arguments.unwrap_or_else(|| json!({})));
        }

        unreachable!("rpc loop exits via return")
    }

    async fn fetch_torrents(
        &self,
        ids: Option<&str>,
    ) -> Result<Vec<TransmissionTorrent>, TorrentClientError> {
        let mut arguments = json!({ "fields": TORRENT_FIELDS });
        if let Some(id) = ids {
            arguments["ids"] = json!([id]);
        }

        let result = self.rpc("torrent-get", arguments).await?;
        let torrents: Vec<TransmissionTorrent> = serde_json::from_value(
            result.get("torrents").cloned().unwrap_or_else(|| json!([])),
        )
        .map_err(|e| TorrentClientError::CommandFailed(format!("Invalid torrent list: {}", e)))?;

        Ok(torrents)
    }
}

#[async_trait]
impl TorrentClient for TransmissionClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<bool, TorrentClientError> {
        match self.rpc("session-get", json!({})).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!(client = %self.name, error = %e, "Transmission connect failed");
                Err(e)
            }
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn add_torrent(
        &self,
        request: AddTorrentRequest,
    ) -> Result<AddedTorrent, TorrentClientError> {
        let mut arguments = json!({
            "filename": request.magnet_uri,
            "paused": request.paused,
        });
        if let Some(ref path) = request.download_path {
            arguments["download-dir"] = json!(path);
        }
        if let Some(ref category) = request.category {
            arguments["labels"] = json!([category]);
        }
        if let Some(priority) = request.priority {
            // Transmission bandwidth priority is -1/0/1.
            arguments["bandwidthPriority"] = json!((priority as i8).clamp(0, 2) - 1);
        }

        let result = self.rpc("torrent-add", arguments).await?;

        // Either "torrent-added" or "torrent-duplicate" is present on success.
        let added = result
            .get("torrent-added")
            .or_else(|| result.get("torrent-duplicate"))
            .cloned()
            .ok_or_else(|| {
                TorrentClientError::InvalidTorrent("Daemon rejected the magnet URI".to_string())
            })?;

        let added: TransmissionAdded = serde_json::from_value(added)
            .map_err(|e| TorrentClientError::CommandFailed(format!("Invalid add response: {}", e)))?;

        let hash = added.hash_string.to_lowercase();
        let state = if request.paused {
            TorrentState::Paused
        } else {
            // Transmission queues new transfers until a slot frees up; report
            // the actual state when we can still see the torrent.
            self.fetch_torrents(Some(&hash))
                .await
                .ok()
                .and_then(|list| list.into_iter().next())
                .map(|t| t.state())
                .unwrap_or(TorrentState::Queued)
        };

        debug!(client = %self.name, hash = %hash, "Torrent added");

        Ok(AddedTorrent {
            client_id: hash.clone(),
            hash,
            name: Some(added.name),
            state,
        })
    }

    async fn get_torrent(&self, id: &str) -> Result<Option<TorrentInfo>, TorrentClientError> {
        let torrents = self.fetch_torrents(Some(id)).await?;
        Ok(torrents.into_iter().next().map(|t| t.into_info()))
    }

    async fn list_torrents(
        &self,
        filters: &TorrentFilters,
    ) -> Result<Vec<TorrentInfo>, TorrentClientError> {
        let torrents = self.fetch_torrents(None).await?;

        let mut result: Vec<TorrentInfo> = torrents
            .into_iter()
            .map(|t| t.into_info())
            .filter(|info| {
                if let Some(state) = &filters.state {
                    if &info.state != state {
                        return false;
                    }
                }
                if let Some(category) = &filters.category {
                    if info.category.as_ref() != Some(category) {
                        return false;
                    }
                }
                if let Some(search) = &filters.search {
                    if !info.name.to_lowercase().contains(&search.to_lowercase()) {
                        return false;
                    }
                }
                true
            })
            .collect();

        result.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        Ok(result)
    }

    async fn pause_torrent(&self, id: &str) -> Result<(), TorrentClientError> {
        self.rpc("torrent-stop", json!({ "ids": [id] })).await?;
        Ok(())
    }

    async fn resume_torrent(&self, id: &str) -> Result<(), TorrentClientError> {
        self.rpc("torrent-start", json!({ "ids": [id] })).await?;
        Ok(())
    }

    async fn remove_torrent(
        &self,
        id: &str,
        delete_files: bool,
    ) -> Result<(), TorrentClientError> {
        self.rpc(
            "torrent-remove",
            json!({ "ids": [id], "delete-local-data": delete_files }),
        )
        .await?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<ClientStats, TorrentClientError> {
        let result = self.rpc("session-stats", json!({})).await?;
        let stats: TransmissionSessionStats = serde_json::from_value(result)
            .map_err(|e| TorrentClientError::CommandFailed(format!("Invalid stats: {}", e)))?;

        Ok(ClientStats {
            download_speed: stats.download_speed,
            upload_speed: stats.upload_speed,
            torrent_count: stats.torrent_count,
            active_count: stats.active_torrent_count,
            paused_count: stats.paused_torrent_count,
            free_space_bytes: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: String,
    arguments: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TransmissionAdded {
    #[serde(rename = "hashString")]
    hash_string: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TransmissionSessionStats {
    #[serde(rename = "downloadSpeed", default)]
    download_speed: u64,
    #[serde(rename = "uploadSpeed", default)]
    upload_speed: u64,
    #[serde(rename = "torrentCount", default)]
    torrent_count: u64,
    #[serde(rename = "activeTorrentCount", default)]
    active_torrent_count: u64,
    #[serde(rename = "pausedTorrentCount", default)]
    paused_torrent_count: u64,
}

#[derive(Debug, Deserialize)]
struct TransmissionTorrent {
    #[serde(rename = "hashString")]
    hash_string: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: i64,
    #[serde(rename = "percentDone", default)]
    percent_done: f64,
    #[serde(rename = "totalSize", default)]
    total_size: u64,
    #[serde(rename = "downloadedEver", default)]
    downloaded_ever: u64,
    #[serde(rename = "uploadedEver", default)]
    uploaded_ever: u64,
    #[serde(rename = "rateDownload", default)]
    rate_download: u64,
    #[serde(rename = "rateUpload", default)]
    rate_upload: u64,
    #[serde(rename = "peersConnected", default)]
    peers_connected: u32,
    #[serde(rename = "peersSendingToUs", default)]
    peers_sending: u32,
    #[serde(rename = "peersGettingFromUs", default)]
    peers_getting: u32,
    #[serde(rename = "uploadRatio", default)]
    upload_ratio: f64,
    #[serde(default)]
    eta: i64,
    #[serde(rename = "addedDate", default)]
    added_date: i64,
    #[serde(rename = "doneDate", default)]
    done_date: i64,
    #[serde(rename = "downloadDir", default)]
    download_dir: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

impl TransmissionTorrent {
    /// Map Transmission's numeric status to our state enum.
    ///
    /// 0 stopped, 1 check-wait, 2 checking, 3 download-wait, 4 downloading,
    /// 5 seed-wait, 6 seeding.
    fn state(&self) -> TorrentState {
        match self.status {
            0 => TorrentState::Paused,
            1 | 2 => TorrentState::Checking,
            3 => TorrentState::Queued,
            4 => TorrentState::Downloading,
            5 | 6 => TorrentState::Seeding,
            _ => TorrentState::Unknown,
        }
    }

    fn into_info(self) -> TorrentInfo {
        let state = self.state();
        TorrentInfo {
            hash: self.hash_string.to_lowercase(),
            name: self.name,
            state,
            progress: self.percent_done,
            size_bytes: self.total_size,
            downloaded_bytes: self.downloaded_ever,
            uploaded_bytes: self.uploaded_ever,
            download_speed: self.rate_download,
            upload_speed: self.rate_upload,
            peers: self.peers_connected,
            seeders: self.peers_sending,
            leechers: self.peers_getting,
            ratio: if self.upload_ratio >= 0.0 {
                self.upload_ratio
            } else {
                0.0
            },
            eta_secs: if self.eta > 0 { Some(self.eta as u64) } else { None },
            added_at: if self.added_date > 0 {
                Utc.timestamp_opt(self.added_date, 0).single()
            } else {
                None
            },
            completed_at: if self.done_date > 0 {
                Utc.timestamp_opt(self.done_date, 0).single()
            } else {
                None
            },
            save_path: self.download_dir,
            category: self.labels.into_iter().next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_torrent(status: i64) -> TransmissionTorrent {
        serde_json::from_value(json!({
            "hashString": "ABC123DEF456",
            "name": "Test",
            "status": status,
            "percentDone": 0.5,
            "totalSize": 1000u64,
            "downloadedEver": 500u64,
            "uploadedEver": 250u64,
            "rateDownload": 100u64,
            "rateUpload": 50u64,
            "peersConnected": 8,
            "peersSendingToUs": 5,
            "peersGettingFromUs": 3,
            "uploadRatio": 0.5,
            "eta": 120,
            "addedDate": 1700000000,
            "doneDate": 0,
            "downloadDir": "/downloads",
            "labels": ["movies"],
        }))
        .unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(make_torrent(0).state(), TorrentState::Paused);
        assert_eq!(make_torrent(1).state(), TorrentState::Checking);
        assert_eq!(make_torrent(2).state(), TorrentState::Checking);
        assert_eq!(make_torrent(3).state(), TorrentState::Queued);
        assert_eq!(make_torrent(4).state(), TorrentState::Downloading);
        assert_eq!(make_torrent(5).state(), TorrentState::Seeding);
        assert_eq!(make_torrent(6).state(), TorrentState::Seeding);
        assert_eq!(make_torrent(99).state(), TorrentState::Unknown);
    }

    #[test]
    fn test_into_info_normalizes_hash() {
        let info = make_torrent(4).into_info();
        assert_eq!(info.hash, "abc123def456");
        assert_eq!(info.seeders, 5);
        assert_eq!(info.leechers, 3);
        assert_eq!(info.eta_secs, Some(120));
        assert!(info.added_at.is_some());
        assert!(info.completed_at.is_none());
        assert_eq!(info.category, Some("movies".to_string()));
    }

    #[test]
    fn test_negative_ratio_clamped() {
        let mut torrent = make_torrent(4);
        torrent.upload_ratio = -1.0; // Transmission reports -1 for "none"
        let info = torrent.into_info();
        assert_eq!(info.ratio, 0.0);
    }
}
