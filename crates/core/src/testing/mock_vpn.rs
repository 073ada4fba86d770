//! Mock VPN status provider for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::vpn::{VpnError, VpnStatusProvider};

/// Mock implementation of the `VpnStatusProvider` trait.
///
/// Reports a configurable connection state; `set_error` makes probes fail
/// until cleared.
pub struct MockVpnStatus {
    active: AtomicBool,
    error: Mutex<Option<String>>,
}

impl MockVpnStatus {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            error: Mutex::new(None),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Make probes fail until `clear_error`.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
    }

    pub fn clear_error(&self) {
        *self.error.lock().unwrap() = None;
    }
}

#[async_trait]
impl VpnStatusProvider for MockVpnStatus {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_active(&self) -> Result<bool, VpnError> {
        if let Some(message) = self.error.lock().unwrap().clone() {
            return Err(VpnError::StatusUnavailable(message));
        }
        Ok(self.active.load(Ordering::SeqCst))
    }
}
