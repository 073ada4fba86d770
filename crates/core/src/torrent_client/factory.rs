//! Client construction and lookup.
//!
//! Adapters are selected through a factory keyed by the configured client
//! kind, so callers hold `Arc<dyn TorrentClient>` and never branch on
//! daemon identity.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::config::{ClientKind, TorrentClientConfig};

use super::{TorrentClient, TorrentClientError, TransmissionClient};

/// Build a client adapter for the configured daemon kind.
pub fn create_client(config: &TorrentClientConfig) -> Arc<dyn TorrentClient> {
    match config.kind {
        ClientKind::Transmission => Arc::new(TransmissionClient::new(config)),
    }
}

/// Registry of configured client adapters, with one marked as default.
pub struct ClientRegistry {
    clients: HashMap<String, Arc<dyn TorrentClient>>,
    default_name: Option<String>,
}

impl ClientRegistry {
    /// Build a registry from configuration.
    ///
    /// Connections are attempted eagerly but failures are non-fatal: the
    /// adapter stays registered and operations retry later.
    pub async fn from_configs(configs: &[TorrentClientConfig]) -> Self {
        let mut registry = Self::empty();
        for config in configs {
            let client = create_client(config);
            if let Err(e) = client.connect().await {
                warn!(client = %config.name, error = %e, "Client connect failed at startup");
            }
            registry.register(config.name.clone(), client, config.default);
        }
        registry
    }

    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            clients: HashMap::new(),
            default_name: None,
        }
    }

    /// Register an adapter.
    ///
    /// A client registered with `default = true` becomes the default;
    /// otherwise the first registration is used as a fallback default.
    pub fn register(&mut self, name: String, client: Arc<dyn TorrentClient>, default: bool) {
        if default || self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.clients.insert(name, client);
    }

    /// Resolve a client by name, falling back to the default when `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn TorrentClient>, TorrentClientError> {
        let name = match name {
            Some(n) => n,
            None => self
                .default_name
                .as_deref()
                .ok_or_else(|| TorrentClientError::Internal("No clients registered".to_string()))?,
        };

        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| TorrentClientError::Internal(format!("Unknown client: {}", name)))
    }

    /// Name of the default client, if any.
    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// All registered clients.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn TorrentClient>)> {
        self.clients.iter()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry has no clients.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTorrentClient;

    #[test]
    fn test_registry_default_resolution() {
        let mut registry = ClientRegistry::empty();
        registry.register("first".to_string(), Arc::new(MockTorrentClient::new("mock")), false);
        registry.register("second".to_string(), Arc::new(MockTorrentClient::new("mock")), true);

        // Explicit default wins over first-registered.
        assert_eq!(registry.default_name(), Some("second"));
        assert!(registry.get(None).is_ok());
        assert!(registry.get(Some("first")).is_ok());
    }

    #[test]
    fn test_registry_first_registered_is_fallback_default() {
        let mut registry = ClientRegistry::empty();
        registry.register("only".to_string(), Arc::new(MockTorrentClient::new("mock")), false);
        assert_eq!(registry.default_name(), Some("only"));
    }

    #[test]
    fn test_registry_unknown_client() {
        let registry = ClientRegistry::empty();
        let err = registry.get(Some("nope")).map(|_| ()).unwrap_err();
        assert!(matches!(err, TorrentClientError::Internal(_)));
    }

    #[test]
    fn test_registry_empty_has_no_default() {
        let registry = ClientRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.get(None).is_err());
    }
}
