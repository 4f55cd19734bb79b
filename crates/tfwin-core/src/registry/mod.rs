//! Plugin-based provider registry
//!
//! The registry aggregates everything the provider is made of: script runner
//! factories keyed by connection type, resources and data sources keyed by
//! type name.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tfwin_core::registry::ProviderRegistry;
//! use tfwin_core::config::ProviderConfig;
//!
//! let registry = ProviderRegistry::with_builtin();
//! tfwin_runner_local::register(&registry);
//! tfwin_runner_ssh::register(&registry);
//!
//! let client = registry.create_client(&ProviderConfig::local())?;
//! let adapter = registry.resource("windows_network_adapter")?;
//! ```

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::client::WindowsClient;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::resources;
use crate::schema::{Attribute, Schema, Validator};
use crate::traits::{DataSource, Resource, RunnerFactory, ScriptRunner};

/// Registry of runners, resources and data sources
///
/// ## Thread Safety
///
/// Interior mutability with `RwLock`: concurrent lookups, exclusive
/// registration.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Runner factories keyed by connection type (`local`, `ssh`)
    runners: RwLock<HashMap<String, Arc<dyn RunnerFactory>>>,

    /// Resources keyed by type name
    resources: RwLock<HashMap<String, Arc<dyn Resource>>>,

    /// Data sources keyed by type name
    data_sources: RwLock<HashMap<String, Arc<dyn DataSource>>>,
}

/// Schema of the whole provider, as printed by `schema`
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSchema {
    pub provider: Schema,
    pub resources: BTreeMap<String, Schema>,
    pub data_sources: BTreeMap<String, Schema>,
}

/// Schema of the connection configuration
pub fn provider_schema() -> Schema {
    Schema::new()
        .attr(
            "type",
            Attribute::string()
                .optional()
                .default_value("local")
                .validate(Validator::StringIn(&["local", "ssh"])),
        )
        .attr("host", Attribute::string().optional().default_value("localhost"))
        .attr(
            "port",
            Attribute::int()
                .optional()
                .default_value(22)
                .validate(Validator::IntBetween(0, 65535)),
        )
        .attr("user", Attribute::string().optional())
        .attr("password", Attribute::string().optional().sensitive())
        .attr("insecure", Attribute::bool().optional().default_value(false))
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in resource and data source
    ///
    /// Runners live in their own crates and register themselves.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        for resource in resources::all_resources() {
            registry.register_resource(resource);
        }
        for data_source in resources::all_data_sources() {
            registry.register_data_source(data_source);
        }
        registry
    }

    /// Register a runner factory for a connection type
    pub fn register_runner(&self, name: impl Into<String>, factory: Box<dyn RunnerFactory>) {
        let mut runners = self.runners.write().unwrap_or_else(|e| e.into_inner());
        runners.insert(name.into(), Arc::from(factory));
    }

    pub fn register_resource(&self, resource: Arc<dyn Resource>) {
        let mut resources = self.resources.write().unwrap_or_else(|e| e.into_inner());
        resources.insert(resource.type_name().to_string(), resource);
    }

    pub fn register_data_source(&self, data_source: Arc<dyn DataSource>) {
        let mut data_sources = self.data_sources.write().unwrap_or_else(|e| e.into_inner());
        data_sources.insert(data_source.type_name().to_string(), data_source);
    }

    /// Create a script runner for the configured connection type
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ScriptRunner>)`: Created runner
    /// - `Err(Error)`: Invalid configuration, unregistered type or creation failure
    pub fn create_runner(&self, config: &ProviderConfig) -> Result<Box<dyn ScriptRunner>> {
        config.validate()?;
        let connection_type = config.connection_type.as_str();

        let factory = {
            let runners = self.runners.read().unwrap_or_else(|e| e.into_inner());
            runners.get(connection_type).cloned().ok_or_else(|| {
                Error::config(format!("Unknown connection type: {}", connection_type))
            })?
        };

        factory.create(config)
    }

    /// Create a Windows client over a freshly created runner
    pub fn create_client(&self, config: &ProviderConfig) -> Result<WindowsClient> {
        let runner = self.create_runner(config)?;
        Ok(WindowsClient::new(Arc::from(runner), config.clone()))
    }

    /// Look up a resource by type name
    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn Resource>> {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        resources
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::schema(format!("Unknown resource type: {}", type_name)))
    }

    /// Look up a data source by type name
    pub fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSource>> {
        let data_sources = self.data_sources.read().unwrap_or_else(|e| e.into_inner());
        data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::schema(format!("Unknown data source type: {}", type_name)))
    }

    /// List all registered connection types
    pub fn list_runners(&self) -> Vec<String> {
        let runners = self.runners.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = runners.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_resources(&self) -> Vec<String> {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = resources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_data_sources(&self) -> Vec<String> {
        let data_sources = self.data_sources.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = data_sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a runner is registered for a connection type
    pub fn has_runner(&self, name: &str) -> bool {
        let runners = self.runners.read().unwrap_or_else(|e| e.into_inner());
        runners.contains_key(name)
    }

    /// Schemas of the provider, every resource and every data source
    pub fn schema(&self) -> ProviderSchema {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        let data_sources = self.data_sources.read().unwrap_or_else(|e| e.into_inner());
        ProviderSchema {
            provider: provider_schema(),
            resources: resources
                .iter()
                .map(|(name, r)| (name.clone(), r.schema()))
                .collect(),
            data_sources: data_sources
                .iter()
                .map(|(name, d)| (name.clone(), d.schema()))
                .collect(),
        }
    }
}
