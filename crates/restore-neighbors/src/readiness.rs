//! Decides when an interface can take its neighbors back.

use sonic_warmrestart_common::{Clock, DbId, StateStore};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::driver::NeighborTableDriver;

/// STATE_DB table with one record per VLAN member port
pub const STATE_VLAN_MEMBER_TABLE_NAME: &str = "VLAN_MEMBER_TABLE";

const BRIDGE_INTERFACE_PREFIX: &str = "Vlan";

/// VLAN interfaces sit on a bridge whose member ports are created
/// asynchronously.
pub fn is_bridge_interface(interface: &str) -> bool {
    interface.starts_with(BRIDGE_INTERFACE_PREFIX)
}

/// Carrier check plus, for VLAN interfaces, a bridge membership check.
///
/// The first VLAN interface found without members makes the gate wait one
/// grace period and look again. That wait happens once per gate, not once
/// per interface.
#[derive(Debug)]
pub struct InterfaceReadinessGate<S> {
    state_db: S,
    bridge_grace: Duration,
    grace_used: bool,
}

impl<S: StateStore> InterfaceReadinessGate<S> {
    pub fn new(state_db: S, bridge_grace: Duration) -> Self {
        Self {
            state_db,
            bridge_grace,
            grace_used: false,
        }
    }

    pub fn grace_used(&self) -> bool {
        self.grace_used
    }

    /// Whether `interface` is ready. Lookup errors count as "not ready".
    pub async fn is_ready<D, K>(&mut self, driver: &D, clock: &K, interface: &str) -> bool
    where
        D: NeighborTableDriver + ?Sized,
        K: Clock + ?Sized,
    {
        match driver.check_carrier(interface).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(interface, "No carrier yet");
                return false;
            }
            Err(e) => {
                info!(interface, error = %e, "Cannot read link state, treating as down");
                return false;
            }
        }

        if !is_bridge_interface(interface) {
            return true;
        }

        if self.has_bridge_members(interface).await {
            return true;
        }
        if self.grace_used {
            debug!(interface, "VLAN members not created yet");
            return false;
        }

        self.grace_used = true;
        info!(
            interface,
            grace_secs = self.bridge_grace.as_secs(),
            "VLAN members not created yet, waiting once for bridge setup"
        );
        clock.sleep(self.bridge_grace).await;
        self.has_bridge_members(interface).await
    }

    async fn has_bridge_members(&self, vlan: &str) -> bool {
        let pattern = format!(
            "{}*",
            DbId::StateDb.key(STATE_VLAN_MEMBER_TABLE_NAME, &[vlan, ""])
        );
        match self.state_db.keys(&pattern).await {
            Ok(keys) => !keys.is_empty(),
            Err(e) => {
                warn!(interface = vlan, error = %e, "Failed to read VLAN members");
                false
            }
        }
    }
}
