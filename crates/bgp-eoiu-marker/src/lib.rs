//! BGP End-of-Initial-Update marker for SONiC warm restart
//!
//! After a warm restart the routing daemon re-learns routes from its peers.
//! This crate watches every IPv4/IPv6 unicast peer until it has delivered its
//! initial routing table (End-of-RIB, explicit or implied by keepalives) and
//! then marks the family in STATE_DB so the FIB reconciliation in fpmsyncd can
//! run without waiting for its own timer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  show bgp ... json  ┌────────────────────┐   BGP_STATE_TABLE|IPv4|eoiu
//! │  FRR vtysh   │◀────────────────────│  PeerEnumerator    │   BGP_STATE_TABLE|IPv6|eoiu
//! │              │                     │  EoiuAggregator    │──────────────▶ STATE_DB
//! └──────────────┘                     │  EorEvidence...    │
//!                                      └────────────────────┘
//! ```
//!
//! # Marker lifecycle
//!
//! 1. Stale `BGP_STATE_TABLE|*` records are deleted.
//! 2. If BGP warm restart is not enabled, stop.
//! 3. Both families are set to `unknown`.
//! 4. Each family is promoted to `reached` once all its peers have sent EOR.
//!    A family that misses the deadline stays `unknown`.

pub mod aggregator;
pub mod control_plane;
pub mod error;
pub mod evidence;
pub mod marker;
pub mod peers;
pub mod service;
pub mod types;

pub use aggregator::{EoiuAggregator, EoiuOutcome, FamilyTracker};
pub use control_plane::{parse_peer_detail, parse_summary, RoutingControlPlaneClient, VtyshClient};
pub use error::{EoiuError, Result};
pub use evidence::EorEvidenceCollector;
pub use marker::{eoiu_key, EoiuMarker, STATE_BGP_STATE_TABLE_NAME};
pub use peers::PeerEnumerator;
pub use service::{run_eoiu_marker, EoiuRunStatus, BGP_COMPONENT};
pub use types::{EoiuState, EorStatus, PeerDetail, PeerSet};
