//! Per-neighbor End-of-RIB evidence.
//!
//! Explicit EOR comes from the graceful-restart section of the neighbor
//! detail. Peers that do not send EOR are covered by the implicit rule:
//! once the session is Established, the first keepalive counter seen is the
//! baseline, and the next sample with a different count means the peer has
//! moved past its initial update.

use sonic_warmrestart_common::AddressFamily;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::control_plane::RoutingControlPlaneClient;
use crate::types::PeerDetail;

/// Keepalive baselines, one per neighbor address.
#[derive(Debug, Default)]
pub struct EorEvidenceCollector {
    keepalive_baseline: HashMap<String, u64>,
}

impl EorEvidenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries `neighbor` and reports whether EOR evidence was seen this call.
    ///
    /// Query or parse failures are logged and count as "no evidence".
    pub async fn collect<C>(&mut self, client: &C, neighbor: &str, family: AddressFamily) -> bool
    where
        C: RoutingControlPlaneClient + ?Sized,
    {
        match client.peer_detail(neighbor).await {
            Ok(detail) => self.evaluate(neighbor, family, &detail),
            Err(e) => {
                warn!(neighbor, %family, error = %e, "Failed to query BGP neighbor, retrying next tick");
                false
            }
        }
    }

    /// Applies the explicit and implicit EOR rules to one sample.
    pub fn evaluate(&mut self, neighbor: &str, family: AddressFamily, detail: &PeerDetail) -> bool {
        if detail.explicit_eor(family) {
            info!(neighbor, %family, "BGP EOR received");
            return true;
        }

        if !detail.is_established() {
            return false;
        }
        let Some(current) = detail.keepalives_recv else {
            return false;
        };

        let Some(&baseline) = self.keepalive_baseline.get(neighbor) else {
            self.keepalive_baseline.insert(neighbor.to_string(), current);
            return false;
        };

        if current == baseline {
            return false;
        }

        // Any difference counts, including a decrease after a counter reset.
        if current < baseline {
            warn!(
                neighbor,
                %family,
                baseline,
                current,
                "Keepalive counter went backwards, treating as implicit EOR (possible false positive)"
            );
        } else {
            info!(neighbor, %family, baseline, current, "BGP implicit EOR received");
        }
        true
    }

    /// Recorded baseline for `neighbor`, if any.
    pub fn baseline(&self, neighbor: &str) -> Option<u64> {
        self.keepalive_baseline.get(neighbor).copied()
    }
}
