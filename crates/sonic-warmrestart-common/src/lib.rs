//! Shared infrastructure for the SONiC warm-restart coordinators.
//!
//! `bgp_eoiu_marker` and `restore_neighbors` are short-lived processes that
//! run once after a warm restart and publish "safe to resume" flags into
//! STATE_DB. This crate holds what both of them need:
//!
//! - [`db`]: the [`StateStore`] trait, a Redis implementation and an
//!   in-memory one
//! - [`warm_restart`]: the warm-restart enablement gate
//! - [`shell`]: quoted shell command execution (`vtysh`, `ip`)
//! - [`clock`]: injectable time source for the polling loops
//! - [`config`]: TOML configuration file
//! - [`types`]: [`MacAddress`] and [`AddressFamily`]
//!
//! # Architecture
//!
//! ```text
//!  vtysh ──▶ bgp_eoiu_marker ──▶ STATE_DB  BGP_STATE_TABLE|IPv4|eoiu
//!                                          BGP_STATE_TABLE|IPv6|eoiu
//!
//!  APPL_DB NEIGH_TABLE ──▶ restore_neighbors ──▶ kernel neighbor table
//!                                     │
//!                                     └──▶ STATE_DB  NEIGH_RESTORE_TABLE|Flags
//! ```

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod shell;
pub mod types;
pub mod warm_restart;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{CoordinatorConfig, DatabaseConfig, EoiuConfig, RestoreConfig, DEFAULT_CONFIG_PATH};
pub use db::{DbId, FieldValues, MemoryStateStore, RedisStateStore, StateStore};
pub use error::{WarmRestartError, WarmResult};
pub use logging::init_logging;
pub use types::{AddressFamily, MacAddress, ParseError};
pub use warm_restart::{StateDbWarmRestartGate, WarmRestartGate};
