//! EOIU marker records in STATE_DB.
//!
//! ```text
//! BGP_STATE_TABLE|IPv4|eoiu   state = unknown|reached   timestamp = 2026-10-16 08:12:45.123456
//! BGP_STATE_TABLE|IPv6|eoiu   ...
//! ```

use chrono::Utc;
use sonic_warmrestart_common::{AddressFamily, DbId, StateStore};
use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::types::EoiuState;

/// STATE_DB table holding the EOIU markers
pub const STATE_BGP_STATE_TABLE_NAME: &str = "BGP_STATE_TABLE";

pub const STATE_FIELD: &str = "state";
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Format of the `timestamp` field (UTC, microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Key of the marker record for `family`.
pub fn eoiu_key(family: AddressFamily) -> String {
    DbId::StateDb.key(STATE_BGP_STATE_TABLE_NAME, &[family.as_str(), "eoiu"])
}

/// Writes and clears the per-family EOIU markers.
#[derive(Debug, Clone)]
pub struct EoiuMarker<S> {
    state_db: S,
}

impl<S: StateStore> EoiuMarker<S> {
    pub fn new(state_db: S) -> Self {
        Self { state_db }
    }

    /// Removes every record left in the marker table by a previous run.
    #[instrument(skip(self))]
    pub async fn sweep_stale(&self) -> Result<usize> {
        let pattern = format!("{}{}*", STATE_BGP_STATE_TABLE_NAME, DbId::StateDb.separator());
        let keys = self.state_db.keys(&pattern).await?;
        for key in &keys {
            self.state_db.del(key).await?;
        }
        if !keys.is_empty() {
            info!(count = keys.len(), "Removed stale BGP state records");
        }
        Ok(keys.len())
    }

    /// Removes both family markers.
    pub async fn clear(&self) -> Result<()> {
        for family in AddressFamily::ALL {
            self.state_db.del(&eoiu_key(family)).await?;
        }
        Ok(())
    }

    /// Records `state` for `family` with the current UTC time.
    pub async fn set(&self, family: AddressFamily, state: EoiuState) -> Result<()> {
        let key = eoiu_key(family);
        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        self.state_db
            .hset(
                &key,
                &[(STATE_FIELD, state.as_str()), (TIMESTAMP_FIELD, timestamp.as_str())],
            )
            .await?;
        debug!(%family, %state, timestamp = %timestamp, "Set EOIU marker");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;
    use sonic_warmrestart_common::MemoryStateStore;

    #[test]
    fn test_eoiu_key() {
        assert_eq!(eoiu_key(AddressFamily::IPv4), "BGP_STATE_TABLE|IPv4|eoiu");
        assert_eq!(eoiu_key(AddressFamily::IPv6), "BGP_STATE_TABLE|IPv6|eoiu");
    }

    #[tokio::test]
    async fn test_set_writes_state_and_timestamp() {
        let store = MemoryStateStore::new();
        let marker = EoiuMarker::new(store.clone());

        marker
            .set(AddressFamily::IPv4, EoiuState::Reached)
            .await
            .unwrap();

        let entry = store.entry("BGP_STATE_TABLE|IPv4|eoiu").unwrap();
        assert_eq!(entry.get("state").map(String::as_str), Some("reached"));
        let timestamp = entry.get("timestamp").unwrap();
        assert!(NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).is_ok());
        assert_eq!(timestamp.rsplit('.').next().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_marker_table() {
        let store = MemoryStateStore::new();
        store
            .hset("BGP_STATE_TABLE|IPv4|eoiu", &[("state", "consumed")])
            .await
            .unwrap();
        store
            .hset("BGP_STATE_TABLE|IPv6|eoiu", &[("state", "reached")])
            .await
            .unwrap();
        store
            .hset("WARM_RESTART_ENABLE_TABLE|bgp", &[("enable", "true")])
            .await
            .unwrap();

        let marker = EoiuMarker::new(store.clone());
        assert_eq!(marker.sweep_stale().await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains_key("WARM_RESTART_ENABLE_TABLE|bgp"));
    }

    #[tokio::test]
    async fn test_clear_removes_both_families() {
        let store = MemoryStateStore::new();
        let marker = EoiuMarker::new(store.clone());
        marker.set(AddressFamily::IPv4, EoiuState::Unknown).await.unwrap();
        marker.set(AddressFamily::IPv6, EoiuState::Unknown).await.unwrap();

        marker.clear().await.unwrap();
        assert!(store.is_empty());
    }
}
