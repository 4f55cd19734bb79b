// # tfwin-core
//
// Core library for managing Windows hosts declaratively through PowerShell.
//
// ## Architecture Overview
//
// This library provides the core functionality of the provider:
// - **ScriptRunner**: Trait for running a PowerShell script over a transport
// - **WindowsClient**: Typed queries, properties and patches per object kind
// - **GatewayResolver**: Finds the connection profile behind a gateway address
// - **Resource / DataSource**: Map attribute state to host objects
// - **StateStore**: Trait for persisting resource state between invocations
// - **ProviderEngine**: Dispatches CRUD verbs and persists their results
// - **ProviderRegistry**: Plugin-based registry for runners and resources
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Transports live in their own crates
// 2. **Adopt, don't create**: Resources take over objects that already exist
//    and give them back as they found them
// 3. **Plugin-Based**: Runners are registered by connection type, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod resources;
pub mod schema;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use client::WindowsClient;
pub use config::{ConnectionType, EngineConfig, ProviderConfig, ResolverConfig};
pub use engine::{EngineEvent, ProviderEngine, ResourceState};
pub use error::{Error, ObjectKind, Result};
pub use registry::ProviderRegistry;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{DataSource, Resource, RunnerFactory, Script, ScriptOutput, ScriptRunner, StateStore};
