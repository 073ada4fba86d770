//! Background seeding policy enforcement. Periodically checks every seeding
//! download against its effective policy and applies the configured action
//! when a limit is breached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::SeedingConfig;
use crate::downloads::{DownloadFilter, DownloadStatus, DownloadStore, TorrentDownload};
use crate::events::{EventHandle, WebhookEvent};
use crate::metrics;
use crate::torrent_client::ClientRegistry;

use super::store::PolicyStore;
use super::types::{resolve_effective, EffectivePolicy, PolicyAction};

pub struct SeedingEnforcer {
    store: Arc<dyn DownloadStore>,
    policies: Arc<dyn PolicyStore>,
    clients: Arc<ClientRegistry>,
    events: Option<EventHandle>,
    defaults: SeedingConfig,
    interval: Duration,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SeedingEnforcer {
    pub fn new(
        store: Arc<dyn DownloadStore>,
        policies: Arc<dyn PolicyStore>,
        clients: Arc<ClientRegistry>,
        events: Option<EventHandle>,
        defaults: SeedingConfig,
    ) -> Self {
        let interval = Duration::from_secs(defaults.enforce_interval_secs);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            store,
            policies,
            clients,
            events,
            defaults,
            interval,
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
            interval_secs = self.interval.as_secs(),
            "Starting seeding enforcer"
        );

        let enforcer = self.clone();
        let running = self.running.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = self.interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        enforcer.enforce_once().await;
                    }
                }
            }
            tracing::debug!("Seeding enforcer loop stopped");
        });
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        tracing::info!("Seeding enforcer stopped");
    }

    /// One enforcement pass. Per-download failures are logged and do not
    /// stop the pass.
    pub async fn enforce_once(&self) {
        let filter = DownloadFilter::new().with_status(DownloadStatus::Seeding);
        let seeding = match self.store.list(&filter) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Enforcer could not list downloads");
                return;
            }
        };

        for download in seeding {
            if let Err(e) = self.enforce_download(download).await {
                tracing::error!(error = %e, "Failed to enforce seeding policy");
            }
        }
    }

    async fn enforce_download(
        &self,
        download: TorrentDownload,
    ) -> Result<(), crate::downloads::DownloadError> {
        let category_policy = match &download.category {
            Some(category) => self
                .policies
                .get_for_category(category)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Category policy lookup failed");
                    None
                }),
            None => None,
        };

        let effective = resolve_effective(
            download.seeding_policy.as_ref(),
            category_policy.as_ref(),
            &self.defaults,
            download.favorite,
        );

        let seeded_minutes = download
            .completed_at
            .map(|t| (Utc::now() - t).num_minutes().max(0) as u64);

        if !effective.is_breached(download.ratio(), seeded_minutes) {
            return Ok(());
        }

        tracing::info!(
            download_id = %download.id,
            ratio = download.ratio(),
            seeded_minutes,
            action = effective.action.as_str(),
            "Seeding limit reached"
        );
        metrics::POLICY_ACTIONS
            .with_label_values(&[effective.action.as_str()])
            .inc();

        self.apply_action(download, &effective).await
    }

    async fn apply_action(
        &self,
        mut download: TorrentDownload,
        effective: &EffectivePolicy,
    ) -> Result<(), crate::downloads::DownloadError> {
        let client = self.clients.get(Some(&download.client_name))?;

        match effective.action {
            PolicyAction::Stop => {
                client.pause_torrent(&download.info_hash).await?;
                download.status = DownloadStatus::Completed;
            }
            PolicyAction::Pause => {
                client.pause_torrent(&download.info_hash).await?;
                download.status = DownloadStatus::Paused;
            }
            PolicyAction::Remove => {
                client
                    .remove_torrent(&download.info_hash, !effective.keep_files)
                    .await?;
                download.status = DownloadStatus::Removed;
            }
        }

        download.download_speed = 0;
        download.upload_speed = 0;
        download.stopped_at = Some(Utc::now());
        download.updated_at = Utc::now();
        self.store.update(&download)?;

        if effective.action == PolicyAction::Remove {
            if let Some(events) = &self.events {
                events
                    .emit(WebhookEvent::TorrentRemoved {
                        download_id: download.id.clone(),
                        name: download.name.clone(),
                    })
                    .await;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::SqliteDownloadStore;
    use crate::seeding::{DownloadSeedingPolicy, SeedingPolicy, SqlitePolicyStore};
    use crate::testing::{insert_test_download, MockTorrentClient};

    fn defaults() -> SeedingConfig {
        SeedingConfig {
            enforce_interval_secs: 300,
            ratio_limit: Some(2.0),
            time_limit_minutes: None,
            action: PolicyAction::Stop,
            keep_files: true,
        }
    }

    fn setup(
        config: SeedingConfig,
    ) -> (
        SeedingEnforcer,
        Arc<SqliteDownloadStore>,
        Arc<SqlitePolicyStore>,
        Arc<MockTorrentClient>,
    ) {
        let store = Arc::new(SqliteDownloadStore::in_memory().unwrap());
        let policies = Arc::new(SqlitePolicyStore::in_memory().unwrap());
        let client = Arc::new(MockTorrentClient::new("mock"));
        let mut registry = ClientRegistry::empty();
        registry.register("mock".to_string(), client.clone(), true);
        let enforcer = SeedingEnforcer::new(
            store.clone(),
            policies.clone(),
            Arc::new(registry),
            None,
            config,
        );
        (enforcer, store, policies, client)
    }

    fn seeding_download(id: &str, hash: &str, ratio_num: u64, ratio_den: u64) -> TorrentDownload {
        let mut d = crate::testing::test_download(id, hash, DownloadStatus::Seeding);
        d.downloaded_bytes = ratio_den;
        d.uploaded_bytes = ratio_num;
        d.completed_at = Some(Utc::now());
        d
    }

    #[tokio::test]
    async fn test_ratio_breach_stops() {
        let (enforcer, store, _policies, client) = setup(defaults());
        store.insert(&seeding_download("d1", "hash1", 2_000, 1_000)).unwrap();

        enforcer.enforce_once().await;

        assert_eq!(client.paused_hashes(), vec!["hash1".to_string()]);
        let d = store.get("d1").unwrap().unwrap();
        assert_eq!(d.status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_under_limit_untouched() {
        let (enforcer, store, _policies, client) = setup(defaults());
        store.insert(&seeding_download("d1", "hash1", 500, 1_000)).unwrap();

        enforcer.enforce_once().await;

        assert!(client.paused_hashes().is_empty());
        let d = store.get("d1").unwrap().unwrap();
        assert_eq!(d.status, DownloadStatus::Seeding);
    }

    #[tokio::test]
    async fn test_category_remove_action() {
        let mut config = defaults();
        config.keep_files = false;
        let (enforcer, store, policies, client) = setup(config);

        policies
            .upsert(&SeedingPolicy {
                name: "tv".to_string(),
                category: Some("tv".to_string()),
                ratio_limit: Some(1.0),
                time_limit_minutes: None,
                action: PolicyAction::Remove,
                keep_files: true,
                created_at: Utc::now(),
            })
            .unwrap();

        let mut d = seeding_download("d1", "hash1", 1_500, 1_000);
        d.category = Some("tv".to_string());
        store.insert(&d).unwrap();

        enforcer.enforce_once().await;

        // keep_files from the category policy wins over defaults
        assert_eq!(client.removed_hashes(), vec![("hash1".to_string(), false)]);
        let d = store.get("d1").unwrap().unwrap();
        assert_eq!(d.status, DownloadStatus::Removed);
    }

    #[tokio::test]
    async fn test_favorite_never_removed() {
        let (enforcer, store, _policies, client) = setup(defaults());

        let mut d = seeding_download("d1", "hash1", 3_000, 1_000);
        d.favorite = true;
        d.seeding_policy = Some(DownloadSeedingPolicy {
            ratio_limit: Some(1.0),
            action: Some(PolicyAction::Remove),
            ..Default::default()
        });
        store.insert(&d).unwrap();

        enforcer.enforce_once().await;

        // Remove downgraded to Stop for favorites
        assert!(client.removed_hashes().is_empty());
        assert_eq!(client.paused_hashes(), vec!["hash1".to_string()]);
        let d = store.get("d1").unwrap().unwrap();
        assert_eq!(d.status, DownloadStatus::Completed);
    }

    #[tokio::test]
    async fn test_time_limit_breach() {
        let mut config = defaults();
        config.ratio_limit = None;
        config.time_limit_minutes = Some(60);
        let (enforcer, store, _policies, client) = setup(config);

        let mut d = seeding_download("d1", "hash1", 0, 1_000);
        d.completed_at = Some(Utc::now() - chrono::Duration::minutes(90));
        store.insert(&d).unwrap();

        enforcer.enforce_once().await;

        assert_eq!(client.paused_hashes().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_pass() {
        let (enforcer, store, _policies, client) = setup(defaults());
        store.insert(&seeding_download("d1", "hash1", 3_000, 1_000)).unwrap();
        store.insert(&seeding_download("d2", "hash2", 3_000, 1_000)).unwrap();

        client.set_next_error("connection refused");
        enforcer.enforce_once().await;

        assert_eq!(client.paused_hashes().len(), 1);
    }
}
