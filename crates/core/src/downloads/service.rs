//! Download lifecycle operations.

use std::sync::Arc;

use chrono::Utc;

use crate::events::{EventHandle, WebhookEvent};
use crate::metrics;
use crate::seeding::DownloadSeedingPolicy;
use crate::torrent_client::{
    AddTorrentRequest, ClientRegistry, TorrentClientError, TorrentState,
};
use crate::vpn::VpnGate;

use super::store::DownloadStore;
use super::types::{
    AggregateStats, ClientSnapshot, DownloadError, DownloadFilter, DownloadStatus, TorrentDownload,
};

/// Request to add a new download.
#[derive(Debug, Clone, Default)]
pub struct AddDownloadRequest {
    pub magnet_uri: String,
    /// Display name; the client-reported name wins once known.
    pub name: Option<String>,
    /// Configured client to use; the default client when `None`.
    pub client: Option<String>,
    pub category: Option<String>,
    pub download_path: Option<String>,
    /// Who asked for this download, recorded on the entity.
    pub requested_by: Option<String>,
    pub paused: bool,
    pub favorite: bool,
    pub seeding_policy: Option<DownloadSeedingPolicy>,
}

impl AddDownloadRequest {
    pub fn magnet(magnet_uri: impl Into<String>) -> Self {
        Self {
            magnet_uri: magnet_uri.into(),
            ..Default::default()
        }
    }
}

/// Orchestrates downloads across the store, the client adapters, and the
/// VPN gate. Every operation that would start traffic checks the gate first
/// and touches no client or database state when rejected.
pub struct DownloadService {
    store: Arc<dyn DownloadStore>,
    clients: Arc<ClientRegistry>,
    gate: Arc<VpnGate>,
    events: Option<EventHandle>,
}

impl DownloadService {
    pub fn new(
        store: Arc<dyn DownloadStore>,
        clients: Arc<ClientRegistry>,
        gate: Arc<VpnGate>,
        events: Option<EventHandle>,
    ) -> Self {
        Self {
            store,
            clients,
            gate,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn DownloadStore> {
        &self.store
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Add a magnet to a client and start tracking it.
    pub async fn add(&self, request: AddDownloadRequest) -> Result<TorrentDownload, DownloadError> {
        self.gate.ensure_active().await?;

        // Duplicate check before touching the client, when the magnet
        // carries its hash
        if let Some(hash) = extract_info_hash(&request.magnet_uri) {
            if self.store.get_by_info_hash(&hash)?.is_some() {
                return Err(DownloadError::AlreadyExists(hash));
            }
        }

        let client = self.clients.get(request.client.as_deref())?;

        let mut add_request = AddTorrentRequest::magnet(&request.magnet_uri);
        if let Some(path) = &request.download_path {
            add_request = add_request.with_download_path(path);
        }
        if let Some(category) = &request.category {
            add_request = add_request.with_category(category);
        }
        if request.paused {
            add_request = add_request.with_paused(true);
        }

        let added = client.add_torrent(add_request).await?;
        let status = map_client_state(added.state);

        let now = Utc::now();
        let name = added
            .name
            .or(request.name)
            .unwrap_or_else(|| added.hash.clone());

        let download = TorrentDownload {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            info_hash: added.hash.to_lowercase(),
            magnet_uri: request.magnet_uri,
            client_name: client.name().to_string(),
            client_id: added.client_id,
            status,
            progress: 0.0,
            size_bytes: 0,
            downloaded_bytes: 0,
            uploaded_bytes: 0,
            download_speed: 0,
            upload_speed: 0,
            peers: 0,
            seeders: 0,
            leechers: 0,
            eta_secs: None,
            save_path: request.download_path,
            category: request.category,
            requested_by: request.requested_by,
            error_message: None,
            favorite: request.favorite,
            seeding_policy: request.seeding_policy,
            added_at: now,
            started_at: if status == DownloadStatus::Downloading {
                Some(now)
            } else {
                None
            },
            completed_at: None,
            stopped_at: None,
            updated_at: now,
        };

        match self.store.insert(&download) {
            Ok(()) => {}
            Err(super::store::StoreError::Duplicate(hash)) => {
                return Err(DownloadError::AlreadyExists(hash));
            }
            Err(e) => return Err(e.into()),
        }

        metrics::DOWNLOADS_STARTED.inc();
        tracing::info!(
            download_id = %download.id,
            info_hash = %download.info_hash,
            client = %download.client_name,
            "Download added"
        );

        if let Some(events) = &self.events {
            events
                .emit(WebhookEvent::TorrentAdded {
                    download_id: download.id.clone(),
                    name: download.name.clone(),
                    info_hash: download.info_hash.clone(),
                })
                .await;
        }

        Ok(download)
    }

    pub fn get(&self, id: &str) -> Result<TorrentDownload, DownloadError> {
        self.store
            .get(id)?
            .ok_or_else(|| DownloadError::NotFound(id.to_string()))
    }

    pub fn list(&self, filter: &DownloadFilter) -> Result<Vec<TorrentDownload>, DownloadError> {
        Ok(self.store.list(filter)?)
    }

    /// Pause a downloading torrent. Pausing an already paused download is a
    /// no-op.
    pub async fn pause(&self, id: &str) -> Result<TorrentDownload, DownloadError> {
        let mut download = self.get(id)?;

        if download.status == DownloadStatus::Paused {
            return Ok(download);
        }
        if download.status != DownloadStatus::Downloading {
            return Err(DownloadError::InvalidState {
                expected: "downloading".to_string(),
                actual: download.status.as_str().to_string(),
            });
        }

        let client = self.clients.get(Some(&download.client_name))?;
        client.pause_torrent(&download.info_hash).await?;

        download.status = DownloadStatus::Paused;
        download.download_speed = 0;
        download.upload_speed = 0;
        download.updated_at = Utc::now();
        self.store.update(&download)?;

        tracing::info!(download_id = %download.id, "Download paused");
        Ok(download)
    }

    /// Resume a paused torrent. Re-checks the VPN gate: a rejection leaves
    /// the download paused and nothing mutated.
    pub async fn resume(&self, id: &str) -> Result<TorrentDownload, DownloadError> {
        let mut download = self.get(id)?;

        if download.status == DownloadStatus::Downloading {
            return Ok(download);
        }
        if download.status != DownloadStatus::Paused {
            return Err(DownloadError::InvalidState {
                expected: "paused".to_string(),
                actual: download.status.as_str().to_string(),
            });
        }

        self.gate.ensure_active().await?;

        let client = self.clients.get(Some(&download.client_name))?;
        client.resume_torrent(&download.info_hash).await?;

        download.status = DownloadStatus::Downloading;
        download.error_message = None;
        download.updated_at = Utc::now();
        self.store.update(&download)?;

        tracing::info!(download_id = %download.id, "Download resumed");
        Ok(download)
    }

    /// Remove a download: delete the torrent from its client and mark the
    /// record removed. The record itself survives for history; `purge`
    /// deletes it entirely.
    pub async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadError> {
        let mut download = self.get(id)?;

        if download.status == DownloadStatus::Removed {
            return Ok(());
        }

        let client = self.clients.get(Some(&download.client_name))?;
        match client.remove_torrent(&download.info_hash, delete_files).await {
            Ok(()) => {}
            // Already gone from the client, still mark our record
            Err(TorrentClientError::TorrentNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        download.status = DownloadStatus::Removed;
        download.download_speed = 0;
        download.upload_speed = 0;
        download.stopped_at = Some(Utc::now());
        download.updated_at = Utc::now();
        self.store.update(&download)?;

        tracing::info!(download_id = %download.id, delete_files, "Download removed");

        if let Some(events) = &self.events {
            events
                .emit(WebhookEvent::TorrentRemoved {
                    download_id: download.id.clone(),
                    name: download.name.clone(),
                })
                .await;
        }

        Ok(())
    }

    /// Delete a download record permanently, removing it from the client
    /// first when it is still attached.
    pub async fn purge(&self, id: &str, delete_files: bool) -> Result<(), DownloadError> {
        let download = self.get(id)?;
        if download.status != DownloadStatus::Removed {
            self.remove(id, delete_files).await?;
        }
        self.store.delete(id)?;
        tracing::info!(download_id = %id, "Download purged");
        Ok(())
    }

    pub fn set_favorite(&self, id: &str, favorite: bool) -> Result<TorrentDownload, DownloadError> {
        let mut download = self.get(id)?;
        download.favorite = favorite;
        download.updated_at = Utc::now();
        self.store.update(&download)?;
        Ok(download)
    }

    pub fn set_seeding_policy(
        &self,
        id: &str,
        policy: Option<DownloadSeedingPolicy>,
    ) -> Result<TorrentDownload, DownloadError> {
        let mut download = self.get(id)?;
        download.seeding_policy = policy;
        download.updated_at = Utc::now();
        self.store.update(&download)?;
        Ok(download)
    }

    /// Aggregate statistics across all downloads plus a live snapshot of
    /// each configured client.
    pub async fn statistics(&self) -> Result<AggregateStats, DownloadError> {
        let queued = self.store.count_by_status(DownloadStatus::Queued)?;
        let downloading = self.store.count_by_status(DownloadStatus::Downloading)?;
        let paused = self.store.count_by_status(DownloadStatus::Paused)?;
        let completed = self.store.count_by_status(DownloadStatus::Completed)?;
        let seeding = self.store.count_by_status(DownloadStatus::Seeding)?;
        let failed = self.store.count_by_status(DownloadStatus::Failed)?;
        let (total_downloaded_bytes, total_uploaded_bytes) = self.store.totals()?;

        let overall_ratio = if total_downloaded_bytes == 0 {
            0.0
        } else {
            total_uploaded_bytes as f64 / total_downloaded_bytes as f64
        };

        let mut clients = Vec::new();
        for (name, client) in self.clients.iter() {
            let snapshot = match client.get_stats().await {
                Ok(stats) => ClientSnapshot {
                    name: name.clone(),
                    connected: true,
                    download_speed: stats.download_speed,
                    upload_speed: stats.upload_speed,
                    torrent_count: stats.torrent_count,
                },
                Err(e) => {
                    tracing::debug!(client = %name, error = %e, "Client stats unavailable");
                    ClientSnapshot {
                        name: name.clone(),
                        connected: false,
                        download_speed: 0,
                        upload_speed: 0,
                        torrent_count: 0,
                    }
                }
            };
            clients.push(snapshot);
        }

        Ok(AggregateStats {
            total: queued + downloading + paused + completed + seeding + failed,
            queued,
            downloading,
            paused,
            completed,
            seeding,
            failed,
            total_downloaded_bytes,
            total_uploaded_bytes,
            overall_ratio,
            clients,
        })
    }
}

/// Map the client-reported torrent state onto our lifecycle.
pub(crate) fn map_client_state(state: TorrentState) -> DownloadStatus {
    match state {
        TorrentState::Downloading => DownloadStatus::Downloading,
        TorrentState::Paused => DownloadStatus::Paused,
        TorrentState::Seeding => DownloadStatus::Seeding,
        TorrentState::Queued | TorrentState::Checking => DownloadStatus::Queued,
        TorrentState::Error | TorrentState::Unknown => DownloadStatus::Queued,
    }
}

/// Pull the info hash out of a magnet URI, lowercased.
pub(crate) fn extract_info_hash(magnet_uri: &str) -> Option<String> {
    let start = magnet_uri.find("urn:btih:")? + "urn:btih:".len();
    let rest = &magnet_uri[start..];
    let hash = rest.split('&').next()?.trim();
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_lowercase())
    }
}
