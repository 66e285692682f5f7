//! Routing control plane queries.
//!
//! [`RoutingControlPlaneClient`] is the seam between the EOIU state machine
//! and FRR. [`VtyshClient`] runs `vtysh -c '<show command> json'` and parses
//! the JSON; the parsing functions are public so they can be exercised
//! without a running routing daemon.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sonic_warmrestart_common::shell::{self, shellquote};
use sonic_warmrestart_common::AddressFamily;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

use crate::error::{EoiuError, Result};
use crate::types::{PeerDetail, PeerSet};

/// Queries against the routing daemon.
#[async_trait]
pub trait RoutingControlPlaneClient: Send + Sync {
    /// Current IPv4/IPv6 unicast peers.
    async fn list_peers(&self) -> Result<PeerSet>;

    /// Detailed status of one neighbor.
    async fn peer_detail(&self, neighbor: &str) -> Result<PeerDetail>;
}

/// FRR client going through `vtysh`.
#[derive(Debug, Clone)]
pub struct VtyshClient {
    vtysh_path: String,
}

impl VtyshClient {
    pub fn new(vtysh_path: impl Into<String>) -> Self {
        Self {
            vtysh_path: vtysh_path.into(),
        }
    }

    fn command(&self, show: &str) -> String {
        format!("{} -c {}", self.vtysh_path, shellquote(show))
    }
}

#[async_trait]
impl RoutingControlPlaneClient for VtyshClient {
    #[instrument(skip(self))]
    async fn list_peers(&self) -> Result<PeerSet> {
        let output = shell::exec_or_throw(&self.command("show bgp summary json")).await?;
        parse_summary(&output)
    }

    #[instrument(skip(self))]
    async fn peer_detail(&self, neighbor: &str) -> Result<PeerDetail> {
        let show = format!("show bgp neighbors {} json", neighbor);
        let output = shell::exec_or_throw(&self.command(&show)).await?;
        parse_peer_detail(neighbor, &output)
    }
}

#[derive(Debug, Deserialize)]
struct BgpSummary {
    #[serde(rename = "ipv4Unicast")]
    ipv4_unicast: Option<FamilySummary>,
    #[serde(rename = "ipv6Unicast")]
    ipv6_unicast: Option<FamilySummary>,
}

#[derive(Debug, Deserialize)]
struct FamilySummary {
    #[serde(default)]
    peers: HashMap<String, Value>,
}

/// Parses `show bgp summary json`. A missing family section means no peers.
pub fn parse_summary(output: &str) -> Result<PeerSet> {
    let summary: BgpSummary = serde_json::from_str(output).map_err(|source| EoiuError::Parse {
        what: "bgp summary".to_string(),
        source,
    })?;

    let peers_of = |family: Option<FamilySummary>| -> BTreeSet<String> {
        family
            .map(|f| f.peers.into_keys().collect())
            .unwrap_or_default()
    };

    let peers = PeerSet {
        ipv4: peers_of(summary.ipv4_unicast),
        ipv6: peers_of(summary.ipv6_unicast),
    };
    debug!(ipv4 = ?peers.ipv4, ipv6 = ?peers.ipv6, "Parsed BGP peers");
    Ok(peers)
}

#[derive(Debug, Default, Deserialize)]
struct NeighborJson {
    #[serde(rename = "bgpState")]
    bgp_state: Option<String>,
    #[serde(rename = "messageStats")]
    message_stats: Option<MessageStats>,
    #[serde(rename = "gracefulRestartInfo")]
    graceful_restart_info: Option<GracefulRestartInfo>,
}

#[derive(Debug, Deserialize)]
struct MessageStats {
    #[serde(rename = "keepalivesRecv")]
    keepalives_recv: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GracefulRestartInfo {
    #[serde(rename = "ipv4Unicast")]
    ipv4_unicast: Option<GracefulRestartFamily>,
    #[serde(rename = "ipv6Unicast")]
    ipv6_unicast: Option<GracefulRestartFamily>,
}

/// Older FRR reports `endOfRibRecv` directly under the family, newer
/// releases nest it in `endOfRibStatus`.
#[derive(Debug, Deserialize)]
struct GracefulRestartFamily {
    #[serde(rename = "endOfRibRecv")]
    end_of_rib_recv: Option<bool>,
    #[serde(rename = "endOfRibStatus")]
    end_of_rib_status: Option<EndOfRibStatus>,
}

#[derive(Debug, Deserialize)]
struct EndOfRibStatus {
    #[serde(rename = "endOfRibRecv")]
    end_of_rib_recv: Option<bool>,
}

impl GracefulRestartFamily {
    fn eor_received(&self) -> Option<bool> {
        self.end_of_rib_recv.or_else(|| {
            self.end_of_rib_status
                .as_ref()
                .and_then(|s| s.end_of_rib_recv)
        })
    }
}

/// Parses `show bgp neighbors <neighbor> json`.
///
/// The output is an object keyed by neighbor address; if `neighbor` is not
/// present the detail is empty, which never counts as EOR evidence.
pub fn parse_peer_detail(neighbor: &str, output: &str) -> Result<PeerDetail> {
    let parse_err = |source| EoiuError::Parse {
        what: format!("bgp neighbor {}", neighbor),
        source,
    };

    let mut top: HashMap<String, Value> = serde_json::from_str(output).map_err(parse_err)?;
    let Some(entry) = top.remove(neighbor) else {
        debug!(neighbor, "Neighbor absent from detail output");
        return Ok(PeerDetail::default());
    };
    let json: NeighborJson = serde_json::from_value(entry).map_err(parse_err)?;

    let mut end_of_rib_recv = HashMap::new();
    if let Some(gr) = &json.graceful_restart_info {
        let families = [
            (AddressFamily::IPv4, &gr.ipv4_unicast),
            (AddressFamily::IPv6, &gr.ipv6_unicast),
        ];
        for (family, info) in families {
            if let Some(received) = info.as_ref().and_then(|i| i.eor_received()) {
                end_of_rib_recv.insert(family, received);
            }
        }
    }

    Ok(PeerDetail {
        bgp_state: json.bgp_state,
        keepalives_recv: json.message_stats.and_then(|m| m.keepalives_recv),
        end_of_rib_recv,
    })
}
