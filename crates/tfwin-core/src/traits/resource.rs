// # Resource and Data Source Traits
//
// A resource translates between the attribute map of a managed object and the
// query/properties/patch types of the Windows client. A data source is the
// read-only counterpart.
//
// ## Lifecycle
//
// - `create`: import the existing object, snapshot it under `original`,
//   apply the declared configuration when it differs, re-read
// - `read`: refresh; a missing object clears the identity instead of failing
// - `update`: apply the declared configuration as a patch, re-read
// - `delete`: replay `original`; a failed replay is logged and the identity
//   is cleared anyway

use async_trait::async_trait;

use crate::client::WindowsClient;
use crate::schema::{ResourceData, Schema};

/// Trait for managed resources
///
/// Implementations hold no state of their own: everything they need comes in
/// through `ResourceData` and goes back out through it.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name (e.g. `windows_network_adapter`)
    fn type_name(&self) -> &'static str;

    /// Attribute schema of the resource
    fn schema(&self) -> Schema;

    /// Adopt the object on the host and converge it to the declared configuration
    async fn create(&self, client: &WindowsClient, data: &mut ResourceData)
    -> Result<(), crate::Error>;

    /// Refresh the state from the host
    async fn read(&self, client: &WindowsClient, data: &mut ResourceData)
    -> Result<(), crate::Error>;

    /// Apply a changed configuration
    async fn update(&self, client: &WindowsClient, data: &mut ResourceData)
    -> Result<(), crate::Error>;

    /// Restore the original properties and drop the resource from state
    async fn delete(&self, client: &WindowsClient, data: &mut ResourceData)
    -> Result<(), crate::Error>;
}

/// Trait for read-only data sources
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Data source type name (e.g. `windows_network_interface`)
    fn type_name(&self) -> &'static str;

    /// Attribute schema of the data source
    fn schema(&self) -> Schema;

    /// Look the object up and fill in every property
    async fn read(&self, client: &WindowsClient, data: &mut ResourceData)
    -> Result<(), crate::Error>;
}
