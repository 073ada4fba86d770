//! Download tracking: persistent store, lifecycle service, and the
//! background stats reconciler.

mod reconcile;
mod service;
mod store;
mod types;

pub use reconcile::StatsReconciler;
pub use service::{AddDownloadRequest, DownloadService};
pub use store::{DownloadStore, SqliteDownloadStore, StoreError};
pub use types::{
    AggregateStats, ClientSnapshot, DownloadError, DownloadFilter, DownloadStatus, TorrentDownload,
};
