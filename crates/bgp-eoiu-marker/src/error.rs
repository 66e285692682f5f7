//! Error types for bgp_eoiu_marker

use sonic_warmrestart_common::WarmRestartError;
use thiserror::Error;

/// Errors raised while detecting BGP end-of-initial-update
#[derive(Debug, Error)]
pub enum EoiuError {
    /// The peer list could not be fetched before the retry budget ran out.
    #[error("Failed to get BGP neighbor info in {0} seconds")]
    PeerEnumerationTimeout(u64),

    /// Control plane output did not parse.
    #[error("Failed to parse {what}: {source}")]
    Parse {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// Shell, state store or configuration failure.
    #[error(transparent)]
    Common(#[from] WarmRestartError),
}

/// Result type alias for bgp_eoiu_marker operations
pub type Result<T> = std::result::Result<T, EoiuError>;
