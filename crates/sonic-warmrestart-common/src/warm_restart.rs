//! Warm restart enablement checks.
//!
//! The warm-restart bookkeeping facility records, in STATE_DB, whether a
//! warm restart is armed for the whole system or for individual containers:
//!
//! ```text
//! WARM_RESTART_ENABLE_TABLE|system   enable = true   (warm reboot)
//! WARM_RESTART_ENABLE_TABLE|bgp      enable = true   (bgp container restart)
//! ```
//!
//! A system warm reboot implies warm restart for every component.

use async_trait::async_trait;
use tracing::debug;

use crate::db::{DbId, StateStore};
use crate::error::WarmResult;

/// STATE_DB table recording warm-restart enablement
pub const STATE_WARM_RESTART_ENABLE_TABLE_NAME: &str = "WARM_RESTART_ENABLE_TABLE";

/// Pseudo-component for a full system warm reboot.
pub const SYSTEM_COMPONENT: &str = "system";

const ENABLE_FIELD: &str = "enable";

/// Answers the two questions the coordinators ask before doing any work.
#[async_trait]
pub trait WarmRestartGate: Send + Sync {
    /// Whether warm restart is in effect for `component`.
    async fn is_enabled(&self, component: &str) -> WarmResult<bool>;

    /// Whether a full system warm reboot (kernel state lost) is in progress.
    async fn is_system_warm_reboot(&self) -> WarmResult<bool>;
}

/// [`WarmRestartGate`] backed by STATE_DB.
#[derive(Debug, Clone)]
pub struct StateDbWarmRestartGate<S> {
    state_db: S,
}

impl<S: StateStore> StateDbWarmRestartGate<S> {
    pub fn new(state_db: S) -> Self {
        Self { state_db }
    }

    async fn enable_flag(&self, component: &str) -> WarmResult<bool> {
        let key = DbId::StateDb.key(STATE_WARM_RESTART_ENABLE_TABLE_NAME, &[component]);
        let value = self.state_db.hget(&key, ENABLE_FIELD).await?;
        Ok(value.as_deref() == Some("true"))
    }
}

#[async_trait]
impl<S: StateStore> WarmRestartGate for StateDbWarmRestartGate<S> {
    async fn is_enabled(&self, component: &str) -> WarmResult<bool> {
        let enabled =
            self.enable_flag(SYSTEM_COMPONENT).await? || self.enable_flag(component).await?;
        debug!(component, enabled, "Checked warm restart enablement");
        Ok(enabled)
    }

    async fn is_system_warm_reboot(&self) -> WarmResult<bool> {
        let enabled = self.enable_flag(SYSTEM_COMPONENT).await?;
        debug!(enabled, "Checked system warm reboot");
        Ok(enabled)
    }
}
