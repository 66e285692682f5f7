//! Configuration file support for the warm-restart coordinators.
//!
//! Both binaries read the same TOML file; each uses its own section.
//! Default location: /etc/sonic/warmrestart_coordinators.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::db::DbId;
use crate::error::{WarmRestartError, WarmResult};
use crate::shell::{IP_CMD, VTYSH_CMD};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/warmrestart_coordinators.toml";

/// Redis endpoint and database numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Unix socket path; when set it is used instead of host/port.
    #[serde(default)]
    pub redis_unix_socket: Option<String>,

    #[serde(default = "default_appl_db")]
    pub appl_db: u32,

    #[serde(default = "default_state_db")]
    pub state_db: u32,
}

/// Timing and tooling for bgp_eoiu_marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EoiuConfig {
    /// Interval between EOR polling ticks
    #[serde(default = "default_eoiu_poll_interval")]
    pub poll_interval_secs: u64,

    /// Shared deadline for both address families
    #[serde(default = "default_eoiu_deadline")]
    pub deadline_secs: u64,

    /// Delay between failed peer listing attempts
    #[serde(default = "default_peer_retry_interval")]
    pub peer_retry_interval_secs: u64,

    /// Budget for peer listing before giving up
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: u64,

    #[serde(default = "default_vtysh_path")]
    pub vtysh_path: String,
}

/// Timing and tooling for restore_neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Sleep between driver-loop passes
    #[serde(default = "default_restore_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_restore_deadline")]
    pub deadline_secs: u64,

    /// Bridge grace period, in multiples of the poll interval
    #[serde(default = "default_bridge_grace_multiplier")]
    pub bridge_grace_multiplier: u32,

    #[serde(default = "default_ip_path")]
    pub ip_path: String,
}

/// Complete coordinator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub eoiu: EoiuConfig,

    #[serde(default)]
    pub restore: RestoreConfig,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_appl_db() -> u32 {
    0
}

fn default_state_db() -> u32 {
    6
}

fn default_eoiu_poll_interval() -> u64 {
    1
}

fn default_eoiu_deadline() -> u64 {
    120
}

fn default_peer_retry_interval() -> u64 {
    5
}

fn default_peer_timeout() -> u64 {
    120
}

fn default_vtysh_path() -> String {
    VTYSH_CMD.to_string()
}

fn default_restore_poll_interval() -> u64 {
    5
}

fn default_restore_deadline() -> u64 {
    110
}

fn default_bridge_grace_multiplier() -> u32 {
    3
}

fn default_ip_path() -> String {
    IP_CMD.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            redis_unix_socket: None,
            appl_db: default_appl_db(),
            state_db: default_state_db(),
        }
    }
}

impl Default for EoiuConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_eoiu_poll_interval(),
            deadline_secs: default_eoiu_deadline(),
            peer_retry_interval_secs: default_peer_retry_interval(),
            peer_timeout_secs: default_peer_timeout(),
            vtysh_path: default_vtysh_path(),
        }
    }
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_restore_poll_interval(),
            deadline_secs: default_restore_deadline(),
            bridge_grace_multiplier: default_bridge_grace_multiplier(),
            ip_path: default_ip_path(),
        }
    }
}

impl DatabaseConfig {
    /// Database number for `db`.
    pub fn db_number(&self, db: DbId) -> u32 {
        match db {
            DbId::ApplDb => self.appl_db,
            DbId::StateDb => self.state_db,
        }
    }

    /// Connection URL for `db`.
    pub fn redis_url(&self, db: DbId) -> String {
        match &self.redis_unix_socket {
            Some(path) => format!("redis+unix://{}?db={}", path, self.db_number(db)),
            None => format!(
                "redis://{}:{}/{}",
                self.redis_host,
                self.redis_port,
                self.db_number(db)
            ),
        }
    }
}

impl EoiuConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn peer_retry_interval(&self) -> Duration {
        Duration::from_secs(self.peer_retry_interval_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

impl RestoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// One-time wait applied the first time a bridge interface is not ready.
    pub fn bridge_grace(&self) -> Duration {
        self.poll_interval() * self.bridge_grace_multiplier
    }
}

impl CoordinatorConfig {
    /// Load configuration from file, falling back to defaults if the file is missing.
    pub fn load_or_default(path: impl AsRef<Path>) -> WarmResult<Self> {
        let path = path.as_ref();

        let config: Self = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                WarmRestartError::invalid_config(
                    path.display().to_string(),
                    format!("failed to parse: {}", e),
                )
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(WarmRestartError::Io(e)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> WarmResult<()> {
        if self.database.redis_unix_socket.is_none() && self.database.redis_port == 0 {
            return Err(WarmRestartError::invalid_config(
                "database.redis_port",
                "must be > 0",
            ));
        }

        let eoiu = &self.eoiu;
        if eoiu.poll_interval_secs == 0 {
            return Err(WarmRestartError::invalid_config(
                "eoiu.poll_interval_secs",
                "must be > 0",
            ));
        }
        if eoiu.deadline_secs < eoiu.poll_interval_secs {
            return Err(WarmRestartError::invalid_config(
                "eoiu.deadline_secs",
                "must not be shorter than the poll interval",
            ));
        }
        if eoiu.peer_retry_interval_secs == 0 {
            return Err(WarmRestartError::invalid_config(
                "eoiu.peer_retry_interval_secs",
                "must be > 0",
            ));
        }
        if eoiu.peer_timeout_secs < eoiu.peer_retry_interval_secs {
            return Err(WarmRestartError::invalid_config(
                "eoiu.peer_timeout_secs",
                "must not be shorter than the retry interval",
            ));
        }

        let restore = &self.restore;
        if restore.poll_interval_secs == 0 {
            return Err(WarmRestartError::invalid_config(
                "restore.poll_interval_secs",
                "must be > 0",
            ));
        }
        if restore.deadline_secs < restore.poll_interval_secs {
            return Err(WarmRestartError::invalid_config(
                "restore.deadline_secs",
                "must not be shorter than the poll interval",
            ));
        }

        Ok(())
    }
}
