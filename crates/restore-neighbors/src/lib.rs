//! Kernel neighbor table restorer for SONiC warm reboot
//!
//! A system warm reboot loses the kernel's ARP/ND table while the ASIC keeps
//! forwarding. Before rebooting, the neighbor table was persisted in APPL_DB;
//! this crate pushes it back into the kernel as STALE entries once each
//! interface is up, sends one probe per entry so the kernel confirms
//! reachability, and then sets `NEIGH_RESTORE_TABLE|Flags restored=true` in
//! STATE_DB for neighsyncd.
//!
//! # Architecture
//!
//! ```text
//! APPL_DB NEIGH_TABLE ──▶ SnapshotLoader ──▶ RestorationWorkingSet
//!                                                   │
//!              InterfaceReadinessGate ◀─────────────┤  every 5s, up to 110s
//!                                                   ▼
//!              KernelNeighborInstaller ──▶ ip neigh add ... nud stale
//!              ProbeBuilder/ProbeTransmitter ──▶ ARP / NS on AF_PACKET
//!                                                   │
//!              CompletionSignaler ◀─────────────────┘  STATE_DB NEIGH_RESTORE_TABLE|Flags
//! ```
//!
//! Entries still waiting at the deadline are abandoned but the flag is set
//! anyway, so neighsyncd is never blocked.

pub mod driver;
pub mod error;
pub mod installer;
pub mod probe;
pub mod readiness;
pub mod restore;
pub mod service;
pub mod snapshot;
pub mod working_set;

pub use driver::{InsertOutcome, LinuxNeighborDriver, NeighborTableDriver};
pub use error::{RestoreError, Result};
pub use installer::KernelNeighborInstaller;
pub use probe::{
    EthernetProbeBuilder, ProbeBuilder, ProbeSocket, ProbeSource, ProbeTransmitter,
    RawSocketTransmitter,
};
pub use readiness::{is_bridge_interface, InterfaceReadinessGate};
pub use restore::{
    completion_key, CompletionSignaler, NeighborRestorer, RestoreEnvironment, RestoreSummary,
};
pub use service::{run_restore_neighbors, RestoreRunStatus, SWSS_COMPONENT};
pub use snapshot::{parse_snapshot_key, SnapshotLoader};
pub use working_set::{NeighborEntry, RestorationWorkingSet};
