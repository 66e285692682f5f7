//! Kernel neighbor table and link state access.
//!
//! [`NeighborTableDriver`] is everything the restorer needs from the kernel.
//! [`LinuxNeighborDriver`] inserts entries with `ip neigh add ... nud stale`,
//! reads carrier from sysfs and takes interface addresses from
//! `getifaddrs(3)`.

use async_trait::async_trait;
use nix::ifaddrs::getifaddrs;
use sonic_warmrestart_common::shell::{self, shellquote};
use sonic_warmrestart_common::{AddressFamily, MacAddress};
use std::net::{IpAddr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;
use tracing::{debug, instrument};

use crate::error::{RestoreError, Result};

/// Default sysfs directory with one subdirectory per network interface
pub const SYSFS_NET_PATH: &str = "/sys/class/net";

/// Outcome of a neighbor insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    /// The kernel already had an entry for this address; left untouched.
    AlreadyPresent,
}

#[async_trait]
pub trait NeighborTableDriver: Send + Sync {
    /// Adds `ip -> mac` on `interface` in the STALE state. Never replaces an
    /// existing entry.
    async fn insert(&self, interface: &str, ip: IpAddr, mac: MacAddress) -> Result<InsertOutcome>;

    /// Whether the link has carrier.
    async fn check_carrier(&self, interface: &str) -> Result<bool>;

    /// First address of `family` configured on `interface`, used as the
    /// probe source.
    async fn lookup_first_address(
        &self,
        interface: &str,
        family: AddressFamily,
    ) -> Result<Option<IpAddr>>;

    /// Hardware address of `interface`.
    async fn lookup_hardware_address(&self, interface: &str) -> Result<Option<MacAddress>>;
}

/// `ip neigh add` for one entry, with every argument quoted.
pub fn neigh_add_command(ip_path: &str, interface: &str, ip: IpAddr, mac: MacAddress) -> String {
    format!(
        "{} {} neigh add {} lladdr {} dev {} nud stale",
        ip_path,
        AddressFamily::of(&ip).ip_cmd_flag(),
        shellquote(&ip.to_string()),
        shellquote(&mac.to_string()),
        shellquote(interface)
    )
}

/// `ip neigh add` fails with EEXIST when the entry is already there.
pub fn is_already_exists(output: &str) -> bool {
    output.contains("File exists")
}

fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// Picks the probe source among an interface's addresses.
///
/// IPv4 takes the first address. IPv6 takes the first non-link-local
/// address, falling back to the first link-local one.
pub fn select_source_address(family: AddressFamily, addresses: &[IpAddr]) -> Option<IpAddr> {
    let mut candidates = addresses
        .iter()
        .copied()
        .filter(|ip| AddressFamily::of(ip) == family);

    match family {
        AddressFamily::IPv4 => candidates.next(),
        AddressFamily::IPv6 => {
            let all: Vec<IpAddr> = candidates.collect();
            all.iter()
                .copied()
                .find(|ip| matches!(ip, IpAddr::V6(v6) if !is_ipv6_link_local(v6)))
                .or_else(|| all.first().copied())
        }
    }
}

/// Driver for the running Linux kernel.
#[derive(Debug, Clone)]
pub struct LinuxNeighborDriver {
    ip_path: String,
    sysfs_net: PathBuf,
}

impl LinuxNeighborDriver {
    pub fn new(ip_path: impl Into<String>) -> Self {
        Self {
            ip_path: ip_path.into(),
            sysfs_net: PathBuf::from(SYSFS_NET_PATH),
        }
    }

    /// Reads carrier files under `sysfs_net` instead of `/sys/class/net`.
    pub fn with_sysfs_root(mut self, sysfs_net: impl Into<PathBuf>) -> Self {
        self.sysfs_net = sysfs_net.into();
        self
    }

    fn interface_ips(interface: &str) -> Result<Vec<IpAddr>> {
        let addrs = getifaddrs().map_err(|e| RestoreError::link(interface, e.to_string()))?;
        let ips = addrs
            .filter(|ifa| ifa.interface_name == interface)
            .filter_map(|ifa| ifa.address)
            .filter_map(|addr| {
                if let Some(sin) = addr.as_sockaddr_in() {
                    Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()))
                } else {
                    addr.as_sockaddr_in6()
                        .map(|sin6| IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
                }
            })
            .collect();
        Ok(ips)
    }
}

#[async_trait]
impl NeighborTableDriver for LinuxNeighborDriver {
    #[instrument(skip(self))]
    async fn insert(&self, interface: &str, ip: IpAddr, mac: MacAddress) -> Result<InsertOutcome> {
        let cmd = neigh_add_command(&self.ip_path, interface, ip, mac);
        let result = shell::exec(&cmd).await?;
        if result.success() {
            return Ok(InsertOutcome::Added);
        }

        let output = result.combined_output();
        if is_already_exists(&output) {
            debug!(interface, %ip, "Neighbor already present in kernel");
            return Ok(InsertOutcome::AlreadyPresent);
        }
        Err(RestoreError::Kernel {
            interface: interface.to_string(),
            ip: ip.to_string(),
            message: output,
        })
    }

    async fn check_carrier(&self, interface: &str) -> Result<bool> {
        let path = self.sysfs_net.join(interface).join("carrier");
        // Reading carrier of an administratively down link fails with EINVAL.
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RestoreError::link(interface, format!("{}: {}", path.display(), e)))?;
        Ok(content.trim() == "1")
    }

    async fn lookup_first_address(
        &self,
        interface: &str,
        family: AddressFamily,
    ) -> Result<Option<IpAddr>> {
        let ips = Self::interface_ips(interface)?;
        Ok(select_source_address(family, &ips))
    }

    async fn lookup_hardware_address(&self, interface: &str) -> Result<Option<MacAddress>> {
        let addrs = getifaddrs().map_err(|e| RestoreError::link(interface, e.to_string()))?;
        let mac = addrs
            .filter(|ifa| ifa.interface_name == interface)
            .filter_map(|ifa| ifa.address)
            .find_map(|addr| addr.as_link_addr().and_then(|link| link.addr()))
            .map(MacAddress::from)
            .filter(|mac| !mac.is_zero());
        Ok(mac)
    }
}
