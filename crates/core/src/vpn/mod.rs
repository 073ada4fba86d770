//! VPN status checking and enforcement.
//!
//! Torrent traffic must never leave the tunnel: every mutating client
//! operation goes through the [`VpnGate`] first, and the [`VpnMonitor`]
//! pauses anything still downloading when the tunnel drops.

mod monitor;

pub use monitor::{VpnMonitor, VPN_PAUSED_MESSAGE};

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::VpnConfig;

#[derive(Debug, Error)]
pub enum VpnError {
    #[error("Failed to query VPN status: {0}")]
    StatusUnavailable(String),

    #[error("VPN status provider not configured")]
    NotConfigured,
}

/// Rejection from the gate, distinct from a probe failure.
#[derive(Debug, Error)]
pub enum VpnGateError {
    #[error("VPN is not active")]
    Inactive,

    #[error(transparent)]
    Status(#[from] VpnError),
}

/// Answers "is the VPN up right now".
#[async_trait]
pub trait VpnStatusProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn is_active(&self) -> Result<bool, VpnError>;
}

/// Status provider backed by an HTTP endpoint returning `{"connected": bool}`
/// (the shape exposed by gluetun and similar VPN containers).
pub struct HttpVpnStatus {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct VpnStatusResponse {
    connected: bool,
}

impl HttpVpnStatus {
    pub fn new(url: impl Into<String>, timeout_secs: u32) -> Result<Self, VpnError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs as u64))
            .build()
            .map_err(|e| VpnError::StatusUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl VpnStatusProvider for HttpVpnStatus {
    fn name(&self) -> &str {
        "http"
    }

    async fn is_active(&self) -> Result<bool, VpnError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| VpnError::StatusUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VpnError::StatusUnavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let status: VpnStatusResponse = response
            .json()
            .await
            .map_err(|e| VpnError::StatusUnavailable(e.to_string()))?;

        Ok(status.connected)
    }
}

/// Pre-flight check run before any operation that would start traffic.
///
/// Fails closed: a probe error counts as "not active" when enforcement is
/// on, because we cannot prove the tunnel is up.
pub struct VpnGate {
    provider: Option<Arc<dyn VpnStatusProvider>>,
    enforce: bool,
}

impl VpnGate {
    pub fn new(provider: Option<Arc<dyn VpnStatusProvider>>, enforce: bool) -> Self {
        Self { provider, enforce }
    }

    /// Build a gate from config, wiring up the HTTP provider when a status
    /// URL is set.
    pub fn from_config(config: &VpnConfig) -> Result<Self, VpnError> {
        let provider = match &config.status_url {
            Some(url) => Some(
                Arc::new(HttpVpnStatus::new(url.clone(), config.timeout_secs)?)
                    as Arc<dyn VpnStatusProvider>,
            ),
            None => None,
        };
        Ok(Self::new(provider, config.enforce))
    }

    /// Disabled gate that lets everything through.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            enforce: false,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.enforce
    }

    /// Reject unless the VPN is verifiably active.
    pub async fn ensure_active(&self) -> Result<(), VpnGateError> {
        if !self.enforce {
            return Ok(());
        }

        let provider = self.provider.as_ref().ok_or(VpnError::NotConfigured)?;
        match provider.is_active().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(VpnGateError::Inactive),
            Err(e) => {
                tracing::warn!(error = %e, "VPN status probe failed, treating as inactive");
                Err(VpnGateError::Inactive)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockVpnStatus;

    #[tokio::test]
    async fn test_gate_allows_when_active() {
        let provider = Arc::new(MockVpnStatus::new(true));
        let gate = VpnGate::new(Some(provider), true);
        assert!(gate.ensure_active().await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_rejects_when_inactive() {
        let provider = Arc::new(MockVpnStatus::new(false));
        let gate = VpnGate::new(Some(provider), true);
        let err = gate.ensure_active().await.unwrap_err();
        assert!(matches!(err, VpnGateError::Inactive));
    }

    #[tokio::test]
    async fn test_gate_fails_closed_on_probe_error() {
        let provider = Arc::new(MockVpnStatus::new(true));
        provider.set_error("connection refused");
        let gate = VpnGate::new(Some(provider), true);
        let err = gate.ensure_active().await.unwrap_err();
        assert!(matches!(err, VpnGateError::Inactive));
    }

    #[tokio::test]
    async fn test_gate_allows_when_not_enforcing() {
        let provider = Arc::new(MockVpnStatus::new(false));
        let gate = VpnGate::new(Some(provider), false);
        assert!(gate.ensure_active().await.is_ok());

        let gate = VpnGate::disabled();
        assert!(gate.ensure_active().await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_enforcing_without_provider() {
        let gate = VpnGate::new(None, true);
        let err = gate.ensure_active().await.unwrap_err();
        assert!(matches!(err, VpnGateError::Status(VpnError::NotConfigured)));
    }
}
