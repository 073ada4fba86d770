//! Background reconciliation between the download store and the torrent
//! clients. Refreshes live stats and drives lifecycle transitions from
//! client-reported state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::events::{EventHandle, WebhookEvent};
use crate::metrics;
use crate::torrent_client::{ClientRegistry, TorrentClientError, TorrentInfo, TorrentState};

use super::store::DownloadStore;
use super::types::{DownloadFilter, DownloadStatus, TorrentDownload};

pub struct StatsReconciler {
    store: Arc<dyn DownloadStore>,
    clients: Arc<ClientRegistry>,
    events: Option<EventHandle>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl StatsReconciler {
    pub fn new(
        store: Arc<dyn DownloadStore>,
        clients: Arc<ClientRegistry>,
        events: Option<EventHandle>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            clients,
            events,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "Starting stats reconciler"
        );

        let reconciler = self.clone();
        let running = self.running.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        reconciler.reconcile_once().await;
                    }
                }
            }
            tracing::debug!("Stats reconciler loop stopped");
        });
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        tracing::info!("Stats reconciler stopped");
    }

    /// One reconciliation pass over every download a client still tracks.
    pub async fn reconcile_once(&self) {
        let filter = DownloadFilter::new().with_statuses(&[
            DownloadStatus::Queued,
            DownloadStatus::Downloading,
            DownloadStatus::Completed,
            DownloadStatus::Seeding,
        ]);
        let tracked = match self.store.list(&filter) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Reconciler could not list downloads");
                return;
            }
        };

        for download in tracked {
            if let Err(e) = self.reconcile_download(download).await {
                tracing::error!(error = %e, "Failed to reconcile download");
            }
        }
    }

    async fn reconcile_download(
        &self,
        mut download: TorrentDownload,
    ) -> Result<(), super::DownloadError> {
        let client = self.clients.get(Some(&download.client_name))?;

        let info = match client.get_torrent(&download.info_hash).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                return self.mark_failed(download, "torrent no longer known to client").await;
            }
            Err(e) if e.is_unrecoverable() => {
                return self.mark_failed(download, &e.to_string()).await;
            }
            Err(e) => {
                // Transient client trouble, try again next pass
                tracing::debug!(
                    download_id = %download.id,
                    error = %e,
                    "Client unavailable during reconcile"
                );
                return Ok(());
            }
        };

        let old_status = download.status;
        let old_progress = download.progress;

        apply_live_stats(&mut download, &info);

        if info.state == TorrentState::Error {
            return self.mark_failed(download, "client reported an error").await;
        }

        // Lifecycle transitions driven by client state
        match old_status {
            DownloadStatus::Queued => {
                if info.state == TorrentState::Downloading {
                    download.status = DownloadStatus::Downloading;
                    if download.started_at.is_none() {
                        download.started_at = Some(Utc::now());
                    }
                } else if info.state == TorrentState::Seeding || download.progress >= 1.0 {
                    self.complete(&mut download, &info).await;
                }
            }
            DownloadStatus::Downloading => {
                if info.state == TorrentState::Seeding || download.progress >= 1.0 {
                    self.complete(&mut download, &info).await;
                }
            }
            DownloadStatus::Completed => {
                if info.state == TorrentState::Seeding {
                    download.status = DownloadStatus::Seeding;
                }
            }
            DownloadStatus::Seeding => {}
            _ => {}
        }

        download.updated_at = Utc::now();
        self.store.update(&download)?;

        if old_status == DownloadStatus::Queued && download.status == DownloadStatus::Downloading {
            tracing::info!(download_id = %download.id, "Download started");
            if let Some(events) = &self.events {
                events
                    .emit(WebhookEvent::TorrentStarted {
                        download_id: download.id.clone(),
                        name: download.name.clone(),
                    })
                    .await;
            }
        }

        if download.status == DownloadStatus::Downloading
            && progress_bucket(download.progress) > progress_bucket(old_progress)
        {
            if let Some(events) = &self.events {
                events
                    .emit(WebhookEvent::TorrentProgress {
                        download_id: download.id.clone(),
                        name: download.name.clone(),
                        progress_pct: download.progress * 100.0,
                    })
                    .await;
            }
        }

        Ok(())
    }

    async fn complete(&self, download: &mut TorrentDownload, info: &TorrentInfo) {
        download.progress = 1.0;
        download.status = if info.state == TorrentState::Seeding {
            DownloadStatus::Seeding
        } else {
            DownloadStatus::Completed
        };
        if download.completed_at.is_none() {
            download.completed_at = Some(Utc::now());
        }
        metrics::DOWNLOADS_COMPLETED.inc();
        tracing::info!(download_id = %download.id, name = %download.name, "Download completed");

        if let Some(events) = &self.events {
            events
                .emit(WebhookEvent::TorrentCompleted {
                    download_id: download.id.clone(),
                    name: download.name.clone(),
                })
                .await;
        }
    }

    async fn mark_failed(
        &self,
        mut download: TorrentDownload,
        error: &str,
    ) -> Result<(), super::DownloadError> {
        download.status = DownloadStatus::Failed;
        download.error_message = Some(error.to_string());
        download.download_speed = 0;
        download.upload_speed = 0;
        download.updated_at = Utc::now();
        self.store.update(&download)?;

        metrics::DOWNLOADS_FAILED.inc();
        tracing::warn!(download_id = %download.id, error, "Download failed");

        if let Some(events) = &self.events {
            events
                .emit(WebhookEvent::TorrentFailed {
                    download_id: download.id.clone(),
                    name: download.name.clone(),
                    error: error.to_string(),
                })
                .await;
        }
        Ok(())
    }
}

fn apply_live_stats(download: &mut TorrentDownload, info: &TorrentInfo) {
    if !info.name.is_empty() {
        download.name = info.name.clone();
    }
    download.progress = info.progress;
    download.size_bytes = info.size_bytes;
    download.downloaded_bytes = info.downloaded_bytes;
    download.uploaded_bytes = info.uploaded_bytes;
    download.download_speed = info.download_speed;
    download.upload_speed = info.upload_speed;
    download.peers = info.peers;
    download.seeders = info.seeders;
    download.leechers = info.leechers;
    download.eta_secs = info.eta_secs;
    if let Some(path) = &info.save_path {
        download.save_path = Some(path.clone());
    }
}

/// Progress events fire once per 5% bucket crossed.
fn progress_bucket(progress: f64) -> u32 {
    ((progress * 100.0).floor() as u32) / 5
}
