//! Pushes snapshot entries into the kernel neighbor table.

use sonic_warmrestart_common::MacAddress;
use std::net::IpAddr;
use tracing::{debug, error};

use crate::driver::{InsertOutcome, NeighborTableDriver};
use crate::error::Result;

/// Installs entries and keeps per-run counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KernelNeighborInstaller {
    pub added: usize,
    pub already_present: usize,
}

impl KernelNeighborInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs one entry as STALE. An existing entry is success; any other
    /// kernel error is returned and ends the restore.
    pub async fn install<D>(
        &mut self,
        driver: &D,
        interface: &str,
        ip: IpAddr,
        mac: MacAddress,
    ) -> Result<InsertOutcome>
    where
        D: NeighborTableDriver + ?Sized,
    {
        let outcome = driver.insert(interface, ip, mac).await.map_err(|e| {
            error!(interface, %ip, %mac, error = %e, "Failed to restore neighbor");
            e
        })?;

        match outcome {
            InsertOutcome::Added => {
                self.added += 1;
                debug!(interface, %ip, %mac, "Restored neighbor");
            }
            InsertOutcome::AlreadyPresent => self.already_present += 1,
        }
        Ok(outcome)
    }

    pub fn total(&self) -> usize {
        self.added + self.already_present
    }
}
