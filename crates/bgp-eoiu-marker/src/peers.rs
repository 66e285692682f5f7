//! BGP peer enumeration with a bounded retry budget.

use sonic_warmrestart_common::Clock;
use std::time::Duration;
use tracing::{info, warn};

use crate::control_plane::RoutingControlPlaneClient;
use crate::error::{EoiuError, Result};
use crate::types::PeerSet;

/// Fetches the peer list, retrying until it succeeds or the budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct PeerEnumerator {
    retry_interval: Duration,
    timeout: Duration,
}

impl PeerEnumerator {
    pub fn new(retry_interval: Duration, timeout: Duration) -> Self {
        Self {
            retry_interval,
            timeout,
        }
    }

    /// Returns the first successfully parsed peer list.
    ///
    /// Each failure consumes one retry interval from the budget. Once the
    /// remaining budget reaches zero the call fails with
    /// [`EoiuError::PeerEnumerationTimeout`].
    pub async fn enumerate<C, K>(&self, client: &C, clock: &K) -> Result<PeerSet>
    where
        C: RoutingControlPlaneClient + ?Sized,
        K: Clock + ?Sized,
    {
        let mut remaining = self.timeout;
        loop {
            match client.list_peers().await {
                Ok(peers) => {
                    if peers.is_empty() {
                        info!("No BGP peers configured, both families reach EOIU at once");
                    } else {
                        info!(
                            total = peers.len(),
                            ipv4 = peers.ipv4.len(),
                            ipv6 = peers.ipv6.len(),
                            "Enumerated BGP peers"
                        );
                    }
                    return Ok(peers);
                }
                Err(e) => {
                    warn!(error = %e, remaining_secs = remaining.as_secs(), "Failed to get BGP neighbor info, retrying");
                }
            }

            if remaining.is_zero() {
                return Err(EoiuError::PeerEnumerationTimeout(self.timeout.as_secs()));
            }
            let wait = self.retry_interval.min(remaining);
            clock.sleep(wait).await;
            remaining = remaining.saturating_sub(wait);
        }
    }
}
