//! One complete EOIU marker run.

use sonic_warmrestart_common::{AddressFamily, Clock, EoiuConfig, StateStore, WarmRestartGate};
use tracing::{info, instrument};

use crate::aggregator::{EoiuAggregator, EoiuOutcome};
use crate::control_plane::RoutingControlPlaneClient;
use crate::error::Result;
use crate::marker::EoiuMarker;
use crate::peers::PeerEnumerator;
use crate::types::EoiuState;

/// Warm-restart component whose enablement gates the marker.
pub const BGP_COMPONENT: &str = "bgp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EoiuRunStatus {
    /// Warm restart not in effect; markers cleared, nothing else done.
    Disabled,
    /// Aggregation ran to completion or deadline.
    Completed(EoiuOutcome),
}

/// Sweeps stale markers, checks the gate, then tracks EOR for every peer.
///
/// Fails only if the peer list cannot be obtained or the state store is
/// unreachable; a deadline expiry is reported through the outcome.
#[instrument(skip_all)]
pub async fn run_eoiu_marker<C, S, G, K>(
    client: &C,
    state_db: S,
    gate: &G,
    clock: &K,
    config: &EoiuConfig,
) -> Result<EoiuRunStatus>
where
    C: RoutingControlPlaneClient + ?Sized,
    S: StateStore,
    G: WarmRestartGate + ?Sized,
    K: Clock + ?Sized,
{
    let marker = EoiuMarker::new(state_db);
    marker.sweep_stale().await?;

    if !gate.is_enabled(BGP_COMPONENT).await? {
        marker.clear().await?;
        info!("BGP warm restart not enabled, nothing to do");
        return Ok(EoiuRunStatus::Disabled);
    }

    for family in AddressFamily::ALL {
        marker.set(family, EoiuState::Unknown).await?;
    }

    let peers = PeerEnumerator::new(config.peer_retry_interval(), config.peer_timeout())
        .enumerate(client, clock)
        .await?;

    let mut aggregator = EoiuAggregator::new(&peers, config.poll_interval(), config.deadline());
    let outcome = aggregator.run(client, clock, &marker).await?;
    Ok(EoiuRunStatus::Completed(outcome))
}
