// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Keeps resource state for the lifetime of the process only. Used by tests
// and by library users that persist state themselves.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{StateRecord, StateStore};

/// In-memory state store
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, StateRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_record(&self, id: &str) -> Result<Option<StateRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn set_record(&self, id: &str, record: &StateRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(id);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn record(name: &str) -> StateRecord {
        let mut attributes = Map::new();
        attributes.insert("name".to_string(), json!(name));
        StateRecord::new("windows_network_adapter", attributes)
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        let id = "//localhost/network_adapters/Ethernet0";
        store.set_record(id, &record("Ethernet0")).await.unwrap();
        assert_eq!(store.len().await, 1);

        let retrieved = store.get_record(id).await.unwrap().unwrap();
        assert_eq!(retrieved.attributes["name"], "Ethernet0");

        store.delete_record(id).await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.get_record(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_list_and_share() {
        let store = MemoryStateStore::new();
        let shared = store.clone();

        store.set_record("//localhost/computer", &record("WS01")).await.unwrap();
        shared
            .set_record("//localhost/network_adapters/Ethernet0", &record("Ethernet0"))
            .await
            .unwrap();

        let ids = store.list_records().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"//localhost/computer".to_string()));
    }
}
