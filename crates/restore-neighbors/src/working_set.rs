//! Interface -> family -> entries still to be restored.

use sonic_warmrestart_common::{AddressFamily, MacAddress};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// One persisted neighbor to push back into the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborEntry {
    pub ip: IpAddr,
    pub mac: MacAddress,
}

/// Entries grouped per interface and family, in snapshot order.
///
/// Groups are only ever removed, so the entry count never grows once
/// loading is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorationWorkingSet {
    interfaces: BTreeMap<String, BTreeMap<AddressFamily, Vec<NeighborEntry>>>,
}

impl RestorationWorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, interface: &str, family: AddressFamily, ip: IpAddr, mac: MacAddress) {
        self.interfaces
            .entry(interface.to_string())
            .or_default()
            .entry(family)
            .or_default()
            .push(NeighborEntry { ip, mac });
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.interfaces.keys().cloned().collect()
    }

    pub fn families(&self, interface: &str) -> Vec<AddressFamily> {
        self.interfaces
            .get(interface)
            .map(|families| families.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn entries(&self, interface: &str, family: AddressFamily) -> &[NeighborEntry] {
        self.interfaces
            .get(interface)
            .and_then(|families| families.get(&family))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Removes a family group; drops the interface once it has no families left.
    pub fn remove_family(&mut self, interface: &str, family: AddressFamily) {
        if let Some(families) = self.interfaces.get_mut(interface) {
            families.remove(&family);
            if families.is_empty() {
                self.interfaces.remove(interface);
            }
        }
    }

    pub fn contains_interface(&self, interface: &str) -> bool {
        self.interfaces.contains_key(interface)
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// Total number of entries across all groups.
    pub fn entry_count(&self) -> usize {
        self.interfaces
            .values()
            .flat_map(|families| families.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}
