//! Resources and data sources of the provider
//!
//! Each managed kind has a [`Resource`] and a [`DataSource`]; network
//! interfaces and link IP interfaces are read-only and only have a data
//! source.

pub mod computer;
pub mod network_adapter;
pub mod network_connection;
pub mod network_interface;

use std::sync::Arc;
use tracing::info;

use crate::error::{ObjectKind, Result};
use crate::schema::{ResourceData, ignore_error_if_not_exists, set_exists};
use crate::traits::{DataSource, Resource};

pub use computer::{ComputerDataSource, ComputerResource};
pub use network_adapter::{NetworkAdapterDataSource, NetworkAdapterResource};
pub use network_connection::{NetworkConnectionDataSource, NetworkConnectionResource};
pub use network_interface::{LinkIpInterfaceDataSource, NetworkInterfaceDataSource};

/// Every managed resource
pub fn all_resources() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(ComputerResource),
        Arc::new(NetworkAdapterResource),
        Arc::new(NetworkConnectionResource),
    ]
}

/// Every data source
pub fn all_data_sources() -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(ComputerDataSource),
        Arc::new(NetworkAdapterDataSource),
        Arc::new(NetworkConnectionDataSource),
        Arc::new(NetworkInterfaceDataSource),
        Arc::new(LinkIpInterfaceDataSource),
    ]
}

/// Complete a data source lookup
///
/// A missing object is an error unless `x_lifecycle.ignore_error_if_not_exists`
/// is set, in which case the properties are zeroed and `exists` is false.
pub(crate) fn finish_lookup<P>(
    data: &mut ResourceData,
    kind: ObjectKind,
    id: String,
    result: Result<P>,
    fill: impl FnOnce(&mut ResourceData, &P),
    zero: impl FnOnce(&mut ResourceData),
) -> Result<()> {
    match result {
        Ok(properties) => {
            fill(data, &properties);
            set_exists(data, true);
            data.set_id(&id);
            info!(%kind, id = %id, "read data source");
            Ok(())
        }
        Err(e) if e.is_not_found_for(kind) && ignore_error_if_not_exists(data) => {
            info!(%kind, id = %id, "object does not exist, adding zeroed data source to state");
            zero(data);
            set_exists(data, false);
            data.set_id(&id);
            Ok(())
        }
        Err(e) => {
            info!(%kind, id = %id, "cannot read data source: {}", e);
            Err(e)
        }
    }
}
