//! Per-family EOIU state machine.
//!
//! Both families are polled in lockstep under one shared deadline. A family
//! is `reached` once none of its neighbors is still `Unknown`; the marker is
//! promoted at that moment and the family is not polled again.

use sonic_warmrestart_common::{AddressFamily, Clock, StateStore};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::control_plane::RoutingControlPlaneClient;
use crate::error::Result;
use crate::evidence::EorEvidenceCollector;
use crate::marker::EoiuMarker;
use crate::types::{EoiuState, EorStatus, PeerSet};

/// EOR bookkeeping for one address family.
#[derive(Debug, Clone)]
pub struct FamilyTracker {
    family: AddressFamily,
    status: BTreeMap<String, EorStatus>,
    reached: bool,
}

impl FamilyTracker {
    pub fn new(family: AddressFamily, peers: impl IntoIterator<Item = String>) -> Self {
        Self {
            family,
            status: peers
                .into_iter()
                .map(|peer| (peer, EorStatus::Unknown))
                .collect(),
            reached: false,
        }
    }

    /// Neighbors still waiting for EOR, in address order.
    pub fn pending(&self) -> Vec<String> {
        self.status
            .iter()
            .filter(|(_, status)| **status == EorStatus::Unknown)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// `Unknown -> Received`; a received neighbor never goes back.
    pub fn mark_received(&mut self, neighbor: &str) {
        if let Some(status) = self.status.get_mut(neighbor) {
            *status = EorStatus::Received;
        }
    }

    pub fn status(&self, neighbor: &str) -> Option<EorStatus> {
        self.status.get(neighbor).copied()
    }

    pub fn all_received(&self) -> bool {
        self.status.values().all(|s| *s == EorStatus::Received)
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EoiuOutcome {
    pub reached: Vec<AddressFamily>,
    pub timed_out: Vec<AddressFamily>,
}

impl EoiuOutcome {
    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty()
    }
}

pub struct EoiuAggregator {
    collector: EorEvidenceCollector,
    trackers: Vec<FamilyTracker>,
    poll_interval: Duration,
    deadline: Duration,
}

impl EoiuAggregator {
    pub fn new(peers: &PeerSet, poll_interval: Duration, deadline: Duration) -> Self {
        let trackers = AddressFamily::ALL
            .iter()
            .map(|family| FamilyTracker::new(*family, peers.for_family(*family).iter().cloned()))
            .collect();
        Self {
            collector: EorEvidenceCollector::new(),
            trackers,
            poll_interval,
            deadline,
        }
    }

    pub fn tracker(&self, family: AddressFamily) -> Option<&FamilyTracker> {
        self.trackers.iter().find(|t| t.family == family)
    }

    /// Polls until both families are reached or the deadline passes.
    ///
    /// Each family's marker is promoted to `reached` as soon as it gets
    /// there. Families still polling at the deadline are logged and keep
    /// their `unknown` marker.
    pub async fn run<C, K, S>(
        &mut self,
        client: &C,
        clock: &K,
        marker: &EoiuMarker<S>,
    ) -> Result<EoiuOutcome>
    where
        C: RoutingControlPlaneClient + ?Sized,
        K: Clock + ?Sized,
        S: StateStore,
    {
        let start = clock.now();
        info!(
            deadline_secs = self.deadline.as_secs(),
            "Waiting for BGP EOR from all peers"
        );

        loop {
            let elapsed = clock.elapsed_since(start);
            if elapsed > self.deadline {
                break;
            }

            for tracker in self.trackers.iter_mut().filter(|t| !t.reached) {
                for neighbor in tracker.pending() {
                    if self
                        .collector
                        .collect(client, &neighbor, tracker.family)
                        .await
                    {
                        tracker.mark_received(&neighbor);
                    }
                }

                if tracker.all_received() {
                    tracker.reached = true;
                    marker.set(tracker.family, EoiuState::Reached).await?;
                    info!(
                        family = %tracker.family,
                        peers = tracker.status.len(),
                        elapsed_secs = elapsed.as_secs(),
                        "BGP EOIU reached"
                    );
                } else {
                    debug!(
                        family = %tracker.family,
                        pending = tracker.pending().len(),
                        "Still waiting for BGP EOR"
                    );
                }
            }

            if self.trackers.iter().all(|t| t.reached) {
                break;
            }
            clock.sleep(self.poll_interval).await;
        }

        let mut outcome = EoiuOutcome::default();
        for tracker in &self.trackers {
            if tracker.reached {
                outcome.reached.push(tracker.family);
            } else {
                error!(
                    family = %tracker.family,
                    pending = ?tracker.pending(),
                    "BGP EOIU not reached before deadline"
                );
                outcome.timed_out.push(tracker.family);
            }
        }
        Ok(outcome)
    }
}
