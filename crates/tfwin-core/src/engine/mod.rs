//! Provider engine
//!
//! The ProviderEngine is responsible for:
//! - Dispatching CRUD verbs to resources and data sources by type name
//! - Validating and normalizing declared configurations against their schema
//! - Persisting resource state after every successful operation
//! - Replacing a resource when a force-new attribute changes
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────┐
//!  verb + config ─▶│  ProviderEngine  │
//!                  └──────────────────┘
//!                           │
//!         ┌─────────────────┼─────────────────┐
//!         │                 │                 │
//!         ▼                 ▼                 ▼
//! ┌───────────────┐ ┌───────────────┐ ┌─────────────┐
//! │  Registry     │ │  StateStore   │ │   Events    │
//! │ (resource)    │ │ (persist)     │ │  (notify)   │
//! └───────────────┘ └───────────────┘ └─────────────┘
//!         │
//!         ▼
//! ┌───────────────┐
//! │ WindowsClient │
//! └───────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Look up the resource in the registry
//! 2. Validate and normalize the configuration
//! 3. Run the resource operation through the client
//! 4. On success, update the StateStore
//! 5. Emit event for monitoring/logging

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use std::sync::Arc;

use crate::client::WindowsClient;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::registry::{ProviderRegistry, ProviderSchema};
use crate::schema::{MapExt, ResourceData, X_LIFECYCLE};
use crate::traits::{StateRecord, StateStore};

/// Attribute holding the snapshot taken on create
const ORIGINAL: &str = "original";

/// Events emitted by the ProviderEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Resource adopted and converged
    Created { resource_type: String, id: String },

    /// Resource refreshed from the host
    Read { resource_type: String, id: String },

    /// Resource updated in place
    Updated { resource_type: String, id: String },

    /// Resource deleted and re-created because a force-new attribute changed
    Replaced {
        resource_type: String,
        old_id: String,
        new_id: String,
        attributes: Vec<String>,
    },

    /// Original properties restored and resource dropped from state
    Deleted { resource_type: String, id: String },

    /// Resource no longer exists on the host and was dropped from state
    Vanished { resource_type: String, id: String },

    /// Data source read
    DataRead {
        data_source_type: String,
        id: String,
        exists: bool,
    },

    /// An operation failed
    OperationFailed {
        type_name: String,
        operation: &'static str,
        error: String,
    },
}

/// Identity and attributes of an object after an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState {
    pub id: String,
    pub resource_type: String,
    pub attributes: Map<String, Value>,
}

impl ResourceState {
    fn new(id: impl Into<String>, resource_type: impl Into<String>, data: ResourceData) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            attributes: data.into_state(),
        }
    }
}

/// Core provider engine
///
/// Every operation is a single request/response exchange with the host; the
/// engine holds no background tasks.
///
/// ## Load Resistance
///
/// Events go through a bounded channel. When the consumer falls behind,
/// events are dropped with a warning rather than buffered without limit.
pub struct ProviderEngine {
    /// Resources, data sources and runners
    registry: Arc<ProviderRegistry>,

    /// Client bound to one host connection
    client: WindowsClient,

    /// Persistent resource state
    state_store: Box<dyn StateStore>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ProviderEngine {
    /// Create a new provider engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event stream)
    pub fn new(
        registry: Arc<ProviderRegistry>,
        client: WindowsClient,
        state_store: Box<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<(Self, ReceiverStream<EngineEvent>)> {
        if config.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be greater than 0"));
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            registry,
            client,
            state_store,
            event_tx: tx,
        };

        Ok((engine, ReceiverStream::new(rx)))
    }

    pub fn client(&self) -> &WindowsClient {
        &self.client
    }

    /// Schemas of the provider, its resources and its data sources
    pub fn schema(&self) -> ProviderSchema {
        self.registry.schema()
    }

    /// Adopt an object and converge it to `config`
    ///
    /// Creating a resource that is already in state keeps the `original`
    /// snapshot from the first create, so delete still restores the host to
    /// what it was before the provider first touched it.
    pub async fn create(&self, resource_type: &str, config: Map<String, Value>) -> Result<ResourceState> {
        let result = self.create_inner(resource_type, config).await;
        self.report(resource_type, "create", result)
    }

    async fn create_inner(
        &self,
        resource_type: &str,
        mut config: Map<String, Value>,
    ) -> Result<ResourceState> {
        let resource = self.registry.resource(resource_type)?;
        let schema = resource.schema();
        schema.validate_config(&config)?;
        schema.normalize(&mut config);

        let mut data = ResourceData::from_config(config);
        resource.create(&self.client, &mut data).await?;
        if data.is_gone() {
            return Err(Error::Other(format!(
                "{} disappeared while it was being created",
                resource_type
            )));
        }

        let id = data.id().to_string();
        if let Some(previous) = self.state_store.get_record(&id).await? {
            if let Some(original) = previous.attributes.get(ORIGINAL) {
                debug!(id = %id, "resource already in state, keeping its original snapshot");
                data.set(ORIGINAL, original.clone());
            }
        }

        let state = ResourceState::new(id, resource_type, data);
        self.persist(&state).await?;

        info!(resource_type, id = %state.id, "created resource");
        self.emit_event(EngineEvent::Created {
            resource_type: resource_type.to_string(),
            id: state.id.clone(),
        });
        Ok(state)
    }

    /// Refresh a resource from the host
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ResourceState))`: Refreshed state
    /// - `Ok(None)`: The object no longer exists; its record was removed
    /// - `Err(Error)`: The id is not in state or the host could not be reached
    pub async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let record = self.record(id).await?;
        let result = self.read_inner(id, &record).await;
        self.report(&record.resource_type, "read", result)
    }

    async fn read_inner(&self, id: &str, record: &StateRecord) -> Result<Option<ResourceState>> {
        let resource = self.registry.resource(&record.resource_type)?;
        let mut data = ResourceData::from_state(id, record.attributes.clone());
        resource.read(&self.client, &mut data).await?;

        if data.is_gone() {
            self.state_store.delete_record(id).await?;
            info!(resource_type = %record.resource_type, id, "resource vanished, removed from state");
            self.emit_event(EngineEvent::Vanished {
                resource_type: record.resource_type.clone(),
                id: id.to_string(),
            });
            return Ok(None);
        }

        let state = ResourceState::new(data.id().to_string(), &record.resource_type, data);
        if state.id != id {
            self.state_store.delete_record(id).await?;
        }
        self.persist(&state).await?;

        debug!(resource_type = %record.resource_type, id = %state.id, "read resource");
        self.emit_event(EngineEvent::Read {
            resource_type: record.resource_type.clone(),
            id: state.id.clone(),
        });
        Ok(Some(state))
    }

    /// Apply a changed configuration
    ///
    /// A change to a force-new attribute deletes the resource and creates it
    /// again from `config`.
    pub async fn update(&self, id: &str, config: Map<String, Value>) -> Result<ResourceState> {
        let record = self.record(id).await?;
        let result = self.update_inner(id, &record, config).await;
        self.report(&record.resource_type, "update", result)
    }

    async fn update_inner(
        &self,
        id: &str,
        record: &StateRecord,
        mut config: Map<String, Value>,
    ) -> Result<ResourceState> {
        let resource_type = record.resource_type.as_str();
        let resource = self.registry.resource(resource_type)?;
        let schema = resource.schema();
        schema.validate_config(&config)?;
        schema.normalize(&mut config);

        let changed = schema.force_new_changes(&config, &record.attributes);
        if !changed.is_empty() {
            info!(resource_type, id, attributes = ?changed, "force-new attributes changed, replacing resource");
            self.delete_inner(id, record).await?;
            let state = self.create_inner(resource_type, config).await?;
            self.emit_event(EngineEvent::Replaced {
                resource_type: resource_type.to_string(),
                old_id: id.to_string(),
                new_id: state.id.clone(),
                attributes: changed.iter().map(|name| name.to_string()).collect(),
            });
            return Ok(state);
        }

        let mut data = ResourceData::from_state(id, record.attributes.clone()).with_config(config);
        resource.update(&self.client, &mut data).await?;
        if data.is_gone() {
            self.state_store.delete_record(id).await?;
            self.emit_event(EngineEvent::Vanished {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            });
            return Err(Error::Other(format!(
                "{} '{}' disappeared while it was being updated",
                resource_type, id
            )));
        }

        let state = ResourceState::new(data.id().to_string(), resource_type, data);
        if state.id != id {
            self.state_store.delete_record(id).await?;
        }
        self.persist(&state).await?;

        info!(resource_type, id = %state.id, "updated resource");
        self.emit_event(EngineEvent::Updated {
            resource_type: resource_type.to_string(),
            id: state.id.clone(),
        });
        Ok(state)
    }

    /// Restore the original properties and drop the resource from state
    pub async fn delete(&self, id: &str) -> Result<()> {
        let record = self.record(id).await?;
        let result = self.delete_inner(id, &record).await;
        self.report(&record.resource_type, "delete", result)
    }

    async fn delete_inner(&self, id: &str, record: &StateRecord) -> Result<()> {
        let resource = self.registry.resource(&record.resource_type)?;
        let mut data = ResourceData::from_state(id, record.attributes.clone());
        resource.delete(&self.client, &mut data).await?;
        self.state_store.delete_record(id).await?;

        info!(resource_type = %record.resource_type, id, "deleted resource");
        self.emit_event(EngineEvent::Deleted {
            resource_type: record.resource_type.clone(),
            id: id.to_string(),
        });
        Ok(())
    }

    /// Read a data source; the result is not persisted
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Map<String, Value>,
    ) -> Result<ResourceState> {
        let result = self.read_data_source_inner(data_source_type, config).await;
        self.report(data_source_type, "read", result)
    }

    async fn read_data_source_inner(
        &self,
        data_source_type: &str,
        mut config: Map<String, Value>,
    ) -> Result<ResourceState> {
        let data_source = self.registry.data_source(data_source_type)?;
        let schema = data_source.schema();
        schema.validate_config(&config)?;
        schema.normalize(&mut config);

        let mut data = ResourceData::from_config(config);
        data_source.read(&self.client, &mut data).await?;

        let exists = data
            .state()
            .block_at(X_LIFECYCLE)
            .and_then(|block| block.bool_at("exists"))
            .unwrap_or(true);
        let state = ResourceState::new(data.id().to_string(), data_source_type, data);

        self.emit_event(EngineEvent::DataRead {
            data_source_type: data_source_type.to_string(),
            id: state.id.clone(),
            exists,
        });
        Ok(state)
    }

    /// Identities of every resource in state
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = self.state_store.list_records().await?;
        ids.sort();
        Ok(ids)
    }

    /// Persist pending state
    pub async fn flush(&self) -> Result<()> {
        self.state_store.flush().await
    }

    async fn record(&self, id: &str) -> Result<StateRecord> {
        self.state_store
            .get_record(id)
            .await?
            .ok_or_else(|| Error::state_store(format!("no resource with id '{}' in state", id)))
    }

    async fn persist(&self, state: &ResourceState) -> Result<()> {
        let record = StateRecord::new(&state.resource_type, state.attributes.clone());
        self.state_store.set_record(&state.id, &record).await
    }

    fn report<T>(&self, type_name: &str, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(type_name, operation, "operation failed: {}", e);
            self.emit_event(EngineEvent::OperationFailed {
                type_name: type_name.to_string(),
                operation,
                error: e.to_string(),
            });
        }
        result
    }

    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}
