//! Restoration driver loop and completion flag.

use sonic_warmrestart_common::{AddressFamily, Clock, DbId, MacAddress, StateStore};
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::driver::NeighborTableDriver;
use crate::error::Result;
use crate::installer::KernelNeighborInstaller;
use crate::probe::{ProbeBuilder, ProbeSocket, ProbeSource, ProbeTransmitter};
use crate::readiness::InterfaceReadinessGate;
use crate::working_set::RestorationWorkingSet;

/// STATE_DB table holding the completion flag
pub const STATE_NEIGH_RESTORE_TABLE_NAME: &str = "NEIGH_RESTORE_TABLE";

pub const RESTORED_FIELD: &str = "restored";

/// Key of the completion flag record.
pub fn completion_key() -> String {
    DbId::StateDb.key(STATE_NEIGH_RESTORE_TABLE_NAME, &["Flags"])
}

/// Writes `NEIGH_RESTORE_TABLE|Flags restored=true`.
#[derive(Debug, Clone)]
pub struct CompletionSignaler<S> {
    state_db: S,
}

impl<S: StateStore> CompletionSignaler<S> {
    pub fn new(state_db: S) -> Self {
        Self { state_db }
    }

    pub async fn signal(&self) -> Result<()> {
        self.state_db
            .hset(&completion_key(), &[(RESTORED_FIELD, "true")])
            .await?;
        info!("Neighbor restore flag set");
        Ok(())
    }

    /// Removes a flag left by a previous run.
    pub async fn clear(&self) -> Result<()> {
        self.state_db.del(&completion_key()).await?;
        Ok(())
    }
}

/// Kernel-facing collaborators of the driver loop.
#[derive(Clone, Copy)]
pub struct RestoreEnvironment<'a> {
    pub driver: &'a dyn NeighborTableDriver,
    pub transmitter: &'a dyn ProbeTransmitter,
    pub builder: &'a dyn ProbeBuilder,
    pub clock: &'a dyn Clock,
}

/// What one driver-loop run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub passes: usize,
    pub interfaces_restored: usize,
    pub entries_added: usize,
    pub entries_already_present: usize,
    pub probes_sent: usize,
    pub probes_skipped: usize,
    pub transmit_failures: usize,
    /// Interfaces still pending when the deadline expired
    pub abandoned_interfaces: Vec<String>,
    pub abandoned_entries: usize,
}

impl RestoreSummary {
    pub fn is_complete(&self) -> bool {
        self.abandoned_interfaces.is_empty()
    }
}

/// Drains a [`RestorationWorkingSet`] interface by interface as each
/// becomes ready, until it is empty or the deadline passes.
pub struct NeighborRestorer<'a, S> {
    env: RestoreEnvironment<'a>,
    readiness: InterfaceReadinessGate<S>,
    installer: KernelNeighborInstaller,
    poll_interval: Duration,
    deadline: Duration,
    summary: RestoreSummary,
}

impl<'a, S: StateStore> NeighborRestorer<'a, S> {
    pub fn new(
        env: RestoreEnvironment<'a>,
        readiness: InterfaceReadinessGate<S>,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            env,
            readiness,
            installer: KernelNeighborInstaller::new(),
            poll_interval,
            deadline,
            summary: RestoreSummary::default(),
        }
    }

    /// Runs the loop. Only a fatal kernel error or a state store failure is
    /// returned as an error; whatever is left at the deadline is abandoned.
    #[instrument(skip_all, fields(entries = working_set.entry_count()))]
    pub async fn run(mut self, working_set: &mut RestorationWorkingSet) -> Result<RestoreSummary> {
        let clock = self.env.clock;
        let start = clock.now();

        loop {
            if working_set.is_empty() {
                break;
            }
            if clock.elapsed_since(start) > self.deadline {
                break;
            }
            self.summary.passes += 1;

            for interface in working_set.interfaces() {
                if !self
                    .readiness
                    .is_ready(self.env.driver, clock, &interface)
                    .await
                {
                    continue;
                }
                self.restore_interface(working_set, &interface).await?;
            }

            if working_set.is_empty() {
                break;
            }
            clock.sleep(self.poll_interval).await;
        }

        self.summary.entries_added = self.installer.added;
        self.summary.entries_already_present = self.installer.already_present;
        self.summary.abandoned_interfaces = working_set.interfaces();
        self.summary.abandoned_entries = working_set.entry_count();

        if !self.summary.is_complete() {
            error!(
                interfaces = ?self.summary.abandoned_interfaces,
                entries = self.summary.abandoned_entries,
                elapsed_secs = clock.elapsed_since(start).as_secs(),
                "Neighbor restore deadline expired, abandoning remaining entries"
            );
        }
        info!(
            interfaces = self.summary.interfaces_restored,
            added = self.summary.entries_added,
            already_present = self.summary.entries_already_present,
            probes_sent = self.summary.probes_sent,
            probes_skipped = self.summary.probes_skipped,
            transmit_failures = self.summary.transmit_failures,
            "Neighbor restore finished"
        );
        Ok(self.summary)
    }

    async fn restore_interface(
        &mut self,
        working_set: &mut RestorationWorkingSet,
        interface: &str,
    ) -> Result<()> {
        info!(interface, "Interface ready, restoring neighbors");

        let mac = match self.env.driver.lookup_hardware_address(interface).await {
            Ok(mac) => mac,
            Err(e) => {
                warn!(interface, error = %e, "Cannot read interface MAC");
                None
            }
        };
        let mut socket = match mac {
            Some(_) => match self.env.transmitter.open(interface) {
                Ok(socket) => Some(socket),
                Err(e) => {
                    warn!(interface, error = %e, "Cannot open probe socket");
                    None
                }
            },
            None => None,
        };

        for family in working_set.families(interface) {
            let source = match (mac, socket.is_some()) {
                (Some(mac), true) => self.probe_source(interface, family, mac).await,
                _ => None,
            };
            if source.is_none() {
                warn!(interface, %family, "No probe source on interface, installing without probes");
            }

            let entries = working_set.entries(interface, family).to_vec();
            for entry in entries {
                self.installer
                    .install(self.env.driver, interface, entry.ip, entry.mac)
                    .await?;
                match (&source, socket.as_mut()) {
                    (Some(source), Some(socket)) => {
                        self.probe(&mut **socket, interface, source, entry.ip, entry.mac)
                    }
                    _ => self.summary.probes_skipped += 1,
                }
            }
            working_set.remove_family(interface, family);
        }

        self.summary.interfaces_restored += 1;
        // The probe socket closes here, once the interface is drained.
        drop(socket);
        Ok(())
    }

    async fn probe_source(
        &self,
        interface: &str,
        family: AddressFamily,
        mac: MacAddress,
    ) -> Option<ProbeSource> {
        match self.env.driver.lookup_first_address(interface, family).await {
            Ok(ip) => ip.map(|ip| ProbeSource { mac, ip }),
            Err(e) => {
                warn!(interface, %family, error = %e, "Cannot read interface address");
                None
            }
        }
    }

    fn probe(
        &mut self,
        socket: &mut dyn ProbeSocket,
        interface: &str,
        source: &ProbeSource,
        ip: IpAddr,
        mac: MacAddress,
    ) {
        let sent = self
            .env
            .builder
            .build(source, ip, mac)
            .and_then(|frame| socket.send(&frame));
        match sent {
            Ok(()) => {
                self.summary.probes_sent += 1;
                debug!(interface, %ip, "Probe sent");
            }
            Err(e) => {
                self.summary.transmit_failures += 1;
                warn!(interface, %ip, error = %e, "Probe transmit failed");
            }
        }
    }
}
