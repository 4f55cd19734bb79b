// # State Store Trait
//
// Defines the interface for persisting resource state between invocations.
//
// ## Purpose
//
// The state store keeps, per resource identity:
// - The resource type the state belongs to
// - The attribute map returned by the last create/read/update
//   (including the `original` snapshot replayed on delete)
// - The time of the last write
//
// ## Implementations
//
// - In-memory: tests and one-shot runs
// - File-based: JSON file with atomic writes and backup recovery

use async_trait::async_trait;
use serde_json::{Map, Value};

/// State of one managed resource
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    /// Resource type name (e.g. `windows_network_adapter`)
    pub resource_type: String,
    /// Attribute map as stored after the last operation
    pub attributes: Map<String, Value>,
    /// Timestamp of the last update
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StateRecord {
    /// Create a new state record stamped with the current time
    pub fn new(resource_type: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes,
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Trait for state store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: use async file operations, never blocking I/O
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **No business logic**: deciding what to store is owned by `ProviderEngine`
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the state record of a resource
    ///
    /// # Returns
    ///
    /// - `Ok(Some(StateRecord))`: The stored record
    /// - `Ok(None)`: No record found
    /// - `Err(Error)`: Storage error
    async fn get_record(&self, id: &str) -> Result<Option<StateRecord>, crate::Error>;

    /// Create or replace the state record of a resource
    async fn set_record(&self, id: &str, record: &StateRecord) -> Result<(), crate::Error>;

    /// Delete a state record (succeeds if it didn't exist)
    async fn delete_record(&self, id: &str) -> Result<(), crate::Error>;

    /// List all resource identities in the store
    async fn list_records(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_stamped_on_creation() {
        let before = chrono::Utc::now();
        let record = StateRecord::new("windows_computer", Map::new());
        assert!(record.last_updated >= before);
        assert_eq!(record.resource_type, "windows_computer");
    }
}
