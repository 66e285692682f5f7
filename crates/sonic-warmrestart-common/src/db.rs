//! Shared key-value state store access.
//!
//! The coordinators only need hash get/set/delete and key listing, exposed
//! through the [`StateStore`] trait. [`RedisStateStore`] talks to one SONiC
//! Redis database; [`MemoryStateStore`] keeps everything in process and backs
//! the tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::DatabaseConfig;
use crate::error::WarmResult;

/// SONiC database identifiers used by the coordinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbId {
    /// Application database (APPL_DB), holds the persisted neighbor snapshot.
    ApplDb,
    /// State database (STATE_DB), holds every flag the coordinators write.
    StateDb,
}

impl DbId {
    pub fn name(&self) -> &'static str {
        match self {
            DbId::ApplDb => "APPL_DB",
            DbId::StateDb => "STATE_DB",
        }
    }

    /// Key separator between table name and key in this database.
    pub fn separator(&self) -> char {
        match self {
            DbId::ApplDb => ':',
            DbId::StateDb => '|',
        }
    }

    /// Joins a table name and key parts with this database's separator.
    pub fn key(&self, table: &str, parts: &[&str]) -> String {
        let mut key = table.to_string();
        for part in parts {
            key.push(self.separator());
            key.push_str(part);
        }
        key
    }
}

/// Field/value pairs of one hash entry.
pub type FieldValues = HashMap<String, String>;

/// Hierarchical key-value store holding field/value hashes.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Sets the given fields on `key`, creating it if needed.
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> WarmResult<()>;

    /// Reads one field of `key`.
    async fn hget(&self, key: &str, field: &str) -> WarmResult<Option<String>>;

    /// Reads all fields of `key`; a missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> WarmResult<FieldValues>;

    /// Deletes `key`.
    async fn del(&self, key: &str) -> WarmResult<()>;

    /// Lists keys matching a Redis glob pattern.
    async fn keys(&self, pattern: &str) -> WarmResult<Vec<String>>;
}

/// Redis-backed store bound to a single SONiC database.
#[derive(Clone)]
pub struct RedisStateStore {
    db: DbId,
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStateStore")
            .field("db", &self.db.name())
            .finish()
    }
}

impl RedisStateStore {
    /// Connects to `db` using the configured endpoint.
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig, db: DbId) -> WarmResult<Self> {
        let url = config.redis_url(db);
        debug!(db = db.name(), url = %url, "Connecting to Redis database");

        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { db, conn })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> WarmResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> WarmResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> WarmResult<FieldValues> {
        let mut conn = self.conn.clone();
        let values: FieldValues = conn.hgetall(key).await?;
        Ok(values)
    }

    async fn del(&self, key: &str) -> WarmResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> WarmResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }
}

/// In-process store. Clones share the same data.
///
/// Patterns support a single trailing `*`, which is all the coordinators use.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    data: Arc<Mutex<HashMap<String, FieldValues>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of one entry, for assertions.
    pub fn entry(&self, key: &str) -> Option<FieldValues> {
        self.data.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }

    fn matches(pattern: &str, key: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn hset(&self, key: &str, fields: &[(&str, &str)]) -> WarmResult<()> {
        let mut data = self.data.lock();
        let entry = data.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> WarmResult<Option<String>> {
        Ok(self
            .data
            .lock()
            .get(key)
            .and_then(|entry| entry.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> WarmResult<FieldValues> {
        Ok(self.data.lock().get(key).cloned().unwrap_or_default())
    }

    async fn del(&self, key: &str) -> WarmResult<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> WarmResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .lock()
            .keys()
            .filter(|k| Self::matches(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_db_id() {
        assert_eq!(DbId::StateDb.name(), "STATE_DB");
        assert_eq!(DbId::ApplDb.separator(), ':');
        assert_eq!(DbId::StateDb.separator(), '|');
    }

    #[test]
    fn test_key_join() {
        assert_eq!(
            DbId::StateDb.key("BGP_STATE_TABLE", &["IPv4", "eoiu"]),
            "BGP_STATE_TABLE|IPv4|eoiu"
        );
        assert_eq!(
            DbId::ApplDb.key("NEIGH_TABLE", &["Ethernet0", "10.0.0.1"]),
            "NEIGH_TABLE:Ethernet0:10.0.0.1"
        );
    }

    #[tokio::test]
    async fn test_memory_store_hash_ops() {
        let store = MemoryStateStore::new();
        store
            .hset("NEIGH_RESTORE_TABLE|Flags", &[("restored", "true")])
            .await
            .unwrap();

        assert_eq!(
            store.hget("NEIGH_RESTORE_TABLE|Flags", "restored").await.unwrap(),
            Some("true".to_string())
        );
        assert_eq!(store.hget("missing", "restored").await.unwrap(), None);

        store.del("NEIGH_RESTORE_TABLE|Flags").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_keys_prefix() {
        let store = MemoryStateStore::new();
        store.hset("VLAN_MEMBER_TABLE|Vlan100|Ethernet0", &[("tagging_mode", "untagged")]).await.unwrap();
        store.hset("VLAN_MEMBER_TABLE|Vlan200|Ethernet4", &[("tagging_mode", "tagged")]).await.unwrap();

        let keys = store.keys("VLAN_MEMBER_TABLE|Vlan100|*").await.unwrap();
        assert_eq!(keys, vec!["VLAN_MEMBER_TABLE|Vlan100|Ethernet0".to_string()]);
        assert_eq!(store.keys("VLAN_MEMBER_TABLE|*").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_data() {
        let store = MemoryStateStore::new();
        let view = store.clone();
        store.hset("k", &[("f", "v")]).await.unwrap();
        assert!(view.contains_key("k"));
    }
}
