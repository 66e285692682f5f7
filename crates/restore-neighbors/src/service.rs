//! One complete restore_neighbors run.

use sonic_warmrestart_common::{RestoreConfig, StateStore, WarmRestartGate};
use tracing::{info, instrument};

use crate::error::Result;
use crate::readiness::InterfaceReadinessGate;
use crate::restore::{CompletionSignaler, NeighborRestorer, RestoreEnvironment, RestoreSummary};
use crate::snapshot::SnapshotLoader;

/// Warm-restart component whose enablement gates the restorer.
pub const SWSS_COMPONENT: &str = "swss";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreRunStatus {
    /// Warm restart not in effect for swss; any stale flag was removed and
    /// no new one written.
    Disabled,
    /// Not a system warm reboot: the kernel kept its neighbors, so the flag
    /// was set straight away.
    Skipped,
    /// The snapshot was replayed (fully or until the deadline).
    Completed(RestoreSummary),
}

/// Replays the APPL_DB neighbor snapshot into the kernel and sets the
/// completion flag.
///
/// Once warm restart is confirmed, the flag is written exactly once on every
/// path that returns `Ok`. A malformed snapshot or a fatal kernel error
/// returns `Err` without it.
#[instrument(skip_all)]
pub async fn run_restore_neighbors<A, S, G>(
    appl_db: A,
    state_db: S,
    gate: &G,
    env: RestoreEnvironment<'_>,
    config: &RestoreConfig,
) -> Result<RestoreRunStatus>
where
    A: StateStore,
    S: StateStore + Clone,
    G: WarmRestartGate + ?Sized,
{
    let signaler = CompletionSignaler::new(state_db.clone());

    if !gate.is_enabled(SWSS_COMPONENT).await? {
        signaler.clear().await?;
        info!("swss warm restart not enabled, nothing to do");
        return Ok(RestoreRunStatus::Disabled);
    }
    if !gate.is_system_warm_reboot().await? {
        info!("Not a system warm reboot, kernel neighbors were kept");
        signaler.signal().await?;
        return Ok(RestoreRunStatus::Skipped);
    }

    let mut working_set = SnapshotLoader::new(appl_db).load().await?;

    let readiness = InterfaceReadinessGate::new(state_db, config.bridge_grace());
    let summary = NeighborRestorer::new(env, readiness, config.poll_interval(), config.deadline())
        .run(&mut working_set)
        .await?;

    signaler.signal().await?;
    Ok(RestoreRunStatus::Completed(summary))
}
