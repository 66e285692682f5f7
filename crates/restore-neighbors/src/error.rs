//! Error types for restore_neighbors

use sonic_warmrestart_common::WarmRestartError;
use std::io;
use thiserror::Error;

/// Errors raised while restoring the kernel neighbor table
#[derive(Debug, Error)]
pub enum RestoreError {
    /// A persisted neighbor record cannot be applied. Fatal: the snapshot is
    /// never partially restored.
    #[error("Malformed neighbor snapshot record '{key}': {reason}")]
    MalformedSnapshot { key: String, reason: String },

    /// The kernel rejected a neighbor insert for a reason other than the
    /// entry already existing.
    #[error("Kernel neighbor table error on {interface} for {ip}: {message}")]
    Kernel {
        interface: String,
        ip: String,
        message: String,
    },

    /// Link state or address lookup failed.
    #[error("Link lookup failed for {interface}: {message}")]
    Link { interface: String, message: String },

    /// Probe socket setup or send failed.
    #[error("Probe transmit on {interface} failed: {source}")]
    Transmit {
        interface: String,
        #[source]
        source: io::Error,
    },

    /// A probe frame could not be built for the given addresses.
    #[error("Cannot build probe: {0}")]
    Probe(String),

    /// Shell, state store or configuration failure.
    #[error(transparent)]
    Common(#[from] WarmRestartError),
}

impl RestoreError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn link(interface: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Link {
            interface: interface.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for restore_neighbors operations
pub type Result<T> = std::result::Result<T, RestoreError>;
