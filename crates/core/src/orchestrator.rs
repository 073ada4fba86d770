//! Runs the background loops: VPN monitoring, stats reconciliation, and
//! seeding policy enforcement.

use std::sync::Arc;

use serde::Serialize;

use crate::downloads::StatsReconciler;
use crate::seeding::SeedingEnforcer;
use crate::vpn::VpnMonitor;

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub vpn_monitor_running: bool,
    pub reconciler_running: bool,
    pub enforcer_running: bool,
}

/// Owns the background loops and starts and stops them together.
///
/// The VPN monitor is absent when no status provider is configured; the
/// other loops always run.
pub struct Orchestrator {
    vpn_monitor: Option<Arc<VpnMonitor>>,
    reconciler: Arc<StatsReconciler>,
    enforcer: Arc<SeedingEnforcer>,
}

impl Orchestrator {
    pub fn new(
        vpn_monitor: Option<Arc<VpnMonitor>>,
        reconciler: Arc<StatsReconciler>,
        enforcer: Arc<SeedingEnforcer>,
    ) -> Self {
        Self {
            vpn_monitor,
            reconciler,
            enforcer,
        }
    }

    pub fn start(&self) {
        tracing::info!("Starting orchestrator");
        if let Some(monitor) = &self.vpn_monitor {
            monitor.start();
        }
        self.reconciler.start();
        self.enforcer.start();
    }

    pub fn stop(&self) {
        tracing::info!("Stopping orchestrator");
        if let Some(monitor) = &self.vpn_monitor {
            monitor.stop();
        }
        self.reconciler.stop();
        self.enforcer.stop();
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            vpn_monitor_running: self
                .vpn_monitor
                .as_ref()
                .map(|m| m.is_running())
                .unwrap_or(false),
            reconciler_running: self.reconciler.is_running(),
            enforcer_running: self.enforcer.is_running(),
        }
    }
}
