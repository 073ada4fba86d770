//! Background VPN watcher. Polls the status provider and pauses all active
//! downloads when the tunnel drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::downloads::{DownloadFilter, DownloadStatus, DownloadStore};
use crate::events::{EventHandle, WebhookEvent};
use crate::metrics;
use crate::torrent_client::ClientRegistry;

use super::VpnStatusProvider;

/// Diagnostic recorded on every download paused by a VPN sweep.
pub const VPN_PAUSED_MESSAGE: &str = "VPN disconnected — download paused for safety";

/// Last definite probe answer. A probe failure leaves this untouched so a
/// flaky status endpoint never triggers a sweep on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastKnown {
    Unknown,
    Active,
    Inactive,
}

pub struct VpnMonitor {
    provider: Arc<dyn VpnStatusProvider>,
    store: Arc<dyn DownloadStore>,
    clients: Arc<ClientRegistry>,
    events: Option<EventHandle>,
    poll_interval: Duration,
    last_known: Mutex<LastKnown>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl VpnMonitor {
    pub fn new(
        provider: Arc<dyn VpnStatusProvider>,
        store: Arc<dyn DownloadStore>,
        clients: Arc<ClientRegistry>,
        events: Option<EventHandle>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            provider,
            store,
            clients,
            events,
            poll_interval,
            last_known: Mutex::new(LastKnown::Unknown),
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
            provider = %self.provider.name(),
            interval_secs = self.poll_interval.as_secs(),
            "Starting VPN monitor"
        );

        let monitor = self.clone();
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
                        monitor.poll_once().await;
                    }
                }
            }
            tracing::debug!("VPN monitor loop stopped");
        });
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        tracing::info!("VPN monitor stopped");
    }

    /// One probe cycle. Sweeps only on a definite active to inactive
    /// transition.
    pub async fn poll_once(&self) {
        let probed = match self.provider.is_active().await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "VPN status probe failed");
                return;
            }
        };

        let previous = {
            let mut last = self.last_known.lock().unwrap();
            let previous = *last;
            *last = if probed {
                LastKnown::Active
            } else {
                LastKnown::Inactive
            };
            previous
        };

        if probed {
            if previous == LastKnown::Inactive {
                tracing::info!("VPN connection restored");
            }
            return;
        }

        if previous == LastKnown::Active {
            tracing::warn!("VPN connection lost, pausing active downloads");
            self.sweep().await;
        }
    }

    /// Pause everything currently downloading. Per-download failures are
    /// logged and do not stop the sweep.
    pub async fn sweep(&self) {
        metrics::VPN_SWEEPS.inc();

        let filter = DownloadFilter::new().with_status(DownloadStatus::Downloading);
        let downloading = match self.store.list(&filter) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "VPN sweep could not list downloads");
                return;
            }
        };

        let mut paused_ids: Vec<String> = Vec::new();
        for mut download in downloading {
            let client = match self.clients.get(Some(&download.client_name)) {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!(download_id = %download.id, error = %e, "Unknown client during VPN sweep");
                    continue;
                }
            };

            if let Err(e) = client.pause_torrent(&download.info_hash).await {
                tracing::error!(download_id = %download.id, error = %e, "Failed to pause during VPN sweep");
                continue;
            }

            download.status = DownloadStatus::Paused;
            download.error_message = Some(VPN_PAUSED_MESSAGE.to_string());
            download.download_speed = 0;
            download.upload_speed = 0;
            download.updated_at = Utc::now();
            if let Err(e) = self.store.update(&download) {
                tracing::error!(download_id = %download.id, error = %e, "Failed to persist VPN pause");
                continue;
            }
            paused_ids.push(download.id.clone());
        }

        metrics::VPN_PAUSED_DOWNLOADS.inc_by(paused_ids.len() as u64);
        tracing::warn!(paused = paused_ids.len(), "VPN sweep complete");

        if let Some(events) = &self.events {
            events
                .emit(WebhookEvent::VpnDisconnected {
                    paused_downloads: paused_ids.len() as u64,
                    download_ids: paused_ids,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::SqliteDownloadStore;
    use crate::testing::{insert_test_download, MockTorrentClient, MockVpnStatus};

    fn setup(active: bool) -> (Arc<VpnMonitor>, Arc<SqliteDownloadStore>, Arc<MockTorrentClient>, Arc<MockVpnStatus>) {
        let store = Arc::new(SqliteDownloadStore::in_memory().unwrap());
        let client = Arc::new(MockTorrentClient::new("mock"));
        let mut registry = ClientRegistry::empty();
        registry.register("mock".to_string(), client.clone(), true);
        let vpn = Arc::new(MockVpnStatus::new(active));
        let monitor = Arc::new(VpnMonitor::new(
            vpn.clone(),
            store.clone(),
            Arc::new(registry),
            None,
            Duration::from_secs(30),
        ));
        (monitor, store, client, vpn)
    }

    #[tokio::test]
    async fn test_sweep_pauses_downloading() {
        let (monitor, store, client, _vpn) = setup(true);
        insert_test_download(store.as_ref(), "d1", "hash1", DownloadStatus::Downloading);
        insert_test_download(store.as_ref(), "d2", "hash2", DownloadStatus::Downloading);
        insert_test_download(store.as_ref(), "d3", "hash3", DownloadStatus::Paused);

        monitor.sweep().await;

        assert_eq!(client.paused_hashes().len(), 2);
        let d1 = store.get("d1").unwrap().unwrap();
        assert_eq!(d1.status, DownloadStatus::Paused);
        assert_eq!(d1.error_message.as_deref(), Some(VPN_PAUSED_MESSAGE));
        // Already paused download untouched
        let d3 = store.get("d3").unwrap().unwrap();
        assert!(d3.error_message.is_none());
    }

    #[tokio::test]
    async fn test_sweep_only_on_definite_transition() {
        let (monitor, store, client, vpn) = setup(true);
        insert_test_download(store.as_ref(), "d1", "hash1", DownloadStatus::Downloading);

        // First poll establishes the active baseline
        monitor.poll_once().await;
        assert!(client.paused_hashes().is_empty());

        // Probe failure is not a disconnect
        vpn.set_error("timeout");
        monitor.poll_once().await;
        assert!(client.paused_hashes().is_empty());

        // Definite inactive answer sweeps
        vpn.clear_error();
        vpn.set_active(false);
        monitor.poll_once().await;
        assert_eq!(client.paused_hashes().len(), 1);

        // Staying down does not sweep again
        monitor.poll_once().await;
        assert_eq!(client.paused_hashes().len(), 1);
    }

    #[tokio::test]
    async fn test_inactive_at_startup_does_not_sweep() {
        let (monitor, store, client, _vpn) = setup(false);
        insert_test_download(store.as_ref(), "d1", "hash1", DownloadStatus::Downloading);

        monitor.poll_once().await;
        assert!(client.paused_hashes().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_event_names_paused_downloads() {
        let store = Arc::new(SqliteDownloadStore::in_memory().unwrap());
        let client = Arc::new(MockTorrentClient::new("mock"));
        let mut registry = ClientRegistry::empty();
        registry.register("mock".to_string(), client.clone(), true);
        let (events, mut rx) = EventHandle::channel(8);
        let monitor = VpnMonitor::new(
            Arc::new(MockVpnStatus::new(true)),
            store.clone(),
            Arc::new(registry),
            Some(events),
            Duration::from_secs(30),
        );
        insert_test_download(store.as_ref(), "d1", "hash1", DownloadStatus::Downloading);
        insert_test_download(store.as_ref(), "d2", "hash2", DownloadStatus::Downloading);

        monitor.sweep().await;

        let envelope = rx.recv().await.expect("Should emit disconnect event");
        match envelope.event {
            WebhookEvent::VpnDisconnected {
                paused_downloads,
                mut download_ids,
            } => {
                assert_eq!(paused_downloads, 2);
                download_ids.sort();
                assert_eq!(download_ids, vec!["d1".to_string(), "d2".to_string()]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sweep_continues_past_client_failure() {
        let (monitor, store, client, _vpn) = setup(true);
        insert_test_download(store.as_ref(), "d1", "hash1", DownloadStatus::Downloading);
        insert_test_download(store.as_ref(), "d2", "hash2", DownloadStatus::Downloading);

        client.set_next_error("connection refused");
        monitor.sweep().await;

        // One pause failed, the other went through
        assert_eq!(client.paused_hashes().len(), 1);
    }
}
