//! Loads the neighbor snapshot persisted in APPL_DB before the reboot.
//!
//! ```text
//! NEIGH_TABLE:Ethernet0:10.0.0.1   neigh = aa:bb:cc:dd:ee:ff   family = IPv4
//! NEIGH_TABLE:Vlan1000:fc00::2     neigh = aa:bb:cc:dd:ee:01   family = IPv6
//! ```

use sonic_warmrestart_common::{AddressFamily, DbId, MacAddress, StateStore};
use std::net::IpAddr;
use tracing::{debug, info, instrument};

use crate::error::{RestoreError, Result};
use crate::working_set::RestorationWorkingSet;

/// APPL_DB table holding the persisted neighbors
pub const APP_NEIGH_TABLE_NAME: &str = "NEIGH_TABLE";

pub const NEIGH_FIELD: &str = "neigh";
pub const FAMILY_FIELD: &str = "family";

/// Never restored.
pub const LOOPBACK_INTERFACE: &str = "lo";

/// Splits `NEIGH_TABLE:<interface>:<ip>`. The address may itself contain
/// `:`, so only the first two separators count.
pub fn parse_snapshot_key(key: &str) -> Result<(String, IpAddr)> {
    let mut parts = key.splitn(3, DbId::ApplDb.separator());
    let (Some(_table), Some(interface), Some(ip)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(RestoreError::malformed(key, "expected <table>:<interface>:<ip>"));
    };
    if interface.is_empty() {
        return Err(RestoreError::malformed(key, "empty interface name"));
    }
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| RestoreError::malformed(key, format!("invalid IP address '{}'", ip)))?;
    Ok((interface.to_string(), ip))
}

/// Reads every snapshot record into a working set.
#[derive(Debug, Clone)]
pub struct SnapshotLoader<S> {
    appl_db: S,
}

impl<S: StateStore> SnapshotLoader<S> {
    pub fn new(appl_db: S) -> Self {
        Self { appl_db }
    }

    /// Loads the whole snapshot. Any malformed record fails the load.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<RestorationWorkingSet> {
        let pattern = format!("{}{}*", APP_NEIGH_TABLE_NAME, DbId::ApplDb.separator());
        let mut keys = self.appl_db.keys(&pattern).await?;
        keys.sort();

        let mut working_set = RestorationWorkingSet::new();
        let mut skipped = 0usize;
        for key in &keys {
            let (interface, ip) = parse_snapshot_key(key)?;
            if interface == LOOPBACK_INTERFACE {
                skipped += 1;
                continue;
            }

            let fields = self.appl_db.hgetall(key).await?;
            let mac = fields
                .get(NEIGH_FIELD)
                .ok_or_else(|| RestoreError::malformed(key, "missing field 'neigh'"))?;
            let family = fields
                .get(FAMILY_FIELD)
                .ok_or_else(|| RestoreError::malformed(key, "missing field 'family'"))?;

            let mac = mac
                .parse::<MacAddress>()
                .map_err(|e| RestoreError::malformed(key, e.to_string()))?;
            let family = family
                .parse::<AddressFamily>()
                .map_err(|e| RestoreError::malformed(key, e.to_string()))?;
            if AddressFamily::of(&ip) != family {
                return Err(RestoreError::malformed(
                    key,
                    format!("family {} does not match address {}", family, ip),
                ));
            }

            debug!(interface = %interface, %ip, %mac, %family, "Loaded neighbor");
            working_set.insert(&interface, family, ip, mac);
        }

        info!(
            interfaces = working_set.interface_count(),
            entries = working_set.entry_count(),
            skipped_loopback = skipped,
            "Loaded neighbor snapshot"
        );
        Ok(working_set)
    }
}
