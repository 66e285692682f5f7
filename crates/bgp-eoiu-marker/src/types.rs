//! Core types for EOIU detection

use sonic_warmrestart_common::AddressFamily;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Value of the `state` field of `BGP_STATE_TABLE|<family>|eoiu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EoiuState {
    /// Warm restart confirmed, EOIU not reached yet
    Unknown,
    /// Every peer of the family has signalled EOR
    Reached,
    /// Written by the downstream consumer (fpmsyncd), never by this process
    Consumed,
}

impl EoiuState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EoiuState::Unknown => "unknown",
            EoiuState::Reached => "reached",
            EoiuState::Consumed => "consumed",
        }
    }
}

impl fmt::Display for EoiuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-neighbor EOR status. Only ever moves `Unknown -> Received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EorStatus {
    Unknown,
    Received,
}

/// BGP peers per address family, from one successful summary query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
    pub ipv4: BTreeSet<String>,
    pub ipv6: BTreeSet<String>,
}

impl PeerSet {
    pub fn for_family(&self, family: AddressFamily) -> &BTreeSet<String> {
        match family {
            AddressFamily::IPv4 => &self.ipv4,
            AddressFamily::IPv6 => &self.ipv6,
        }
    }

    pub fn len(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.is_empty() && self.ipv6.is_empty()
    }
}

/// BGP FSM state name for an established session.
pub const BGP_STATE_ESTABLISHED: &str = "Established";

/// The parts of `show bgp neighbors <addr> json` EOR detection looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDetail {
    /// BGP FSM state ("Established", "Active", ...)
    pub bgp_state: Option<String>,
    /// `messageStats.keepalivesRecv`
    pub keepalives_recv: Option<u64>,
    /// Graceful-restart `endOfRibRecv` per family, when reported
    pub end_of_rib_recv: HashMap<AddressFamily, bool>,
}

impl PeerDetail {
    pub fn is_established(&self) -> bool {
        self.bgp_state.as_deref() == Some(BGP_STATE_ESTABLISHED)
    }

    /// Explicit EOR received for `family`.
    pub fn explicit_eor(&self, family: AddressFamily) -> bool {
        self.end_of_rib_recv.get(&family).copied().unwrap_or(false)
    }
}
