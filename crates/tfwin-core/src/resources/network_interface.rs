//! `windows_network_interface` and `windows_link_ip_interface` data sources

use async_trait::async_trait;

use crate::client::{InterfaceProperties, InterfaceQuery, WindowsClient};
use crate::error::{ObjectKind, Result};
use crate::schema::{
    Attribute, MapExt, ResourceData, Schema, StateFunc, Validator, X_LIFECYCLE,
    data_source_lifecycle,
};
use crate::traits::DataSource;

use super::finish_lookup;

pub const NETWORK_INTERFACE: &str = "windows_network_interface";
pub const LINK_IP_INTERFACE: &str = "windows_link_ip_interface";

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkInterfaceDataSource;

#[derive(Debug, Default, Clone, Copy)]
pub struct LinkIpInterfaceDataSource;

fn interface_schema() -> Schema {
    let lookup = || Attribute::string().optional().computed();
    Schema::new()
        .attr(
            "guid",
            lookup().validate(Validator::Uuid).state(StateFunc::Upper),
        )
        .attr(
            "index",
            Attribute::int()
                .optional()
                .computed()
                .validate(Validator::IntBetween(0, i64::from(u32::MAX))),
        )
        .attr("alias", lookup())
        .attr("description", lookup())
        .attr(
            "mac_address",
            lookup().validate(Validator::Mac).state(StateFunc::Upper),
        )
        .attr("network_adapter_name", lookup())
        .attr("vnetwork_adapter_name", lookup())
        .attr("network_connection_names", Attribute::list_of_strings().computed())
        .attr("vswitch_name", Attribute::string().computed())
        .attr("computer_name", Attribute::string().computed())
        .attr(X_LIFECYCLE, data_source_lifecycle())
}

fn query(data: &ResourceData) -> InterfaceQuery {
    let text = |key: &str| data.configured_str(key).unwrap_or_default().to_string();
    InterfaceQuery {
        guid: text("guid"),
        index: data
            .config()
            .u64_at("index")
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or_default(),
        alias: text("alias"),
        description: text("description"),
        mac_address: text("mac_address"),
        network_adapter_name: text("network_adapter_name"),
        vnetwork_adapter_name: text("vnetwork_adapter_name"),
    }
}

fn set_properties(data: &mut ResourceData, interface: &InterfaceProperties) {
    data.set("guid", interface.guid.to_uppercase());
    data.set("index", interface.index);
    data.set("alias", interface.alias.as_str());
    data.set("description", interface.description.as_str());
    data.set("mac_address", interface.mac_address.to_uppercase());
    data.set("network_adapter_name", interface.network_adapter_name.as_str());
    data.set("vnetwork_adapter_name", interface.vnetwork_adapter_name.as_str());
    data.set("network_connection_names", interface.network_connection_names.clone());
    data.set("vswitch_name", interface.vswitch_name.as_str());
    data.set("computer_name", interface.computer_name.as_str());
}

fn zero(data: &mut ResourceData) {
    set_properties(data, &InterfaceProperties::default());
}

#[async_trait]
impl DataSource for NetworkInterfaceDataSource {
    fn type_name(&self) -> &'static str {
        NETWORK_INTERFACE
    }

    fn schema(&self) -> Schema {
        interface_schema()
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let query = query(data);
        let id = client.resource_id(
            ObjectKind::NetworkInterface,
            &query.selector().unwrap_or_default(),
        );
        let result = client.read_network_interface(&query).await;
        finish_lookup(data, ObjectKind::NetworkInterface, id, result, set_properties, zero)
    }
}

#[async_trait]
impl DataSource for LinkIpInterfaceDataSource {
    fn type_name(&self) -> &'static str {
        LINK_IP_INTERFACE
    }

    fn schema(&self) -> Schema {
        interface_schema()
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let query = query(data);
        let id = client.resource_id(
            ObjectKind::LinkIpInterface,
            &query.link_selector().unwrap_or_default(),
        );
        let result = client.read_link_ip_interface(&query).await;
        finish_lookup(data, ObjectKind::LinkIpInterface, id, result, set_properties, zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_query_from_config() {
        let config = match json!({ "index": 7, "alias": "Ethernet0", "guid": null }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let q = query(&ResourceData::from_config(config));
        assert_eq!(q.index, 7);
        assert_eq!(q.alias, "Ethernet0");
        assert!(q.guid.is_empty());
        assert_eq!(q.selector().as_deref(), Some("7"));
        assert_eq!(q.link_selector().as_deref(), Some("7"));
    }

    #[test]
    fn test_zeroed_properties() {
        let mut data = ResourceData::default();
        zero(&mut data);
        assert_eq!(data.state()["index"], 0);
        assert_eq!(data.state()["network_connection_names"], json!([]));
        assert_eq!(data.state_str("guid"), "");
    }
}
