//! Torrent client abstraction.
//!
//! This module provides a `TorrentClient` trait for managing torrents across
//! external daemons (Transmission today, qBittorrent-shaped daemons later),
//! plus a factory/registry so the orchestration layer never branches on
//! daemon identity.

mod factory;
mod transmission;
mod types;

pub use factory::{create_client, ClientRegistry};
pub use transmission::TransmissionClient;
pub use types::*;
