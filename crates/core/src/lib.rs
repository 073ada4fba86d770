pub mod config;
pub mod downloads;
pub mod events;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod search;
pub mod seeding;
pub mod testing;
pub mod torrent_client;
pub mod vpn;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use downloads::{
    AddDownloadRequest, DownloadError, DownloadService, DownloadStatus, DownloadStore,
    SqliteDownloadStore, StatsReconciler, TorrentDownload,
};
pub use events::{EventHandle, WebhookEnvelope, WebhookEvent};
pub use matcher::{
    find_best_match, MatchCriteria, MatchOutcome, MatchedCandidate, ScoreBreakdown,
};
pub use orchestrator::{Orchestrator, OrchestratorStatus};
pub use search::{
    SearchAggregator, SearchError, SearchQuery, SearchResponse, SearchResult, SourceSearcher,
};
pub use seeding::{PolicyStore, SeedingEnforcer, SeedingPolicy, SqlitePolicyStore};
pub use torrent_client::{create_client, ClientRegistry, TorrentClient, TorrentClientError};
pub use vpn::{VpnGate, VpnMonitor, VpnStatusProvider, VPN_PAUSED_MESSAGE};
