//! `windows_network_adapter`

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::client::{
    AdapterDnsClient, AdapterDnsClientPatch, NetworkAdapterPatch, NetworkAdapterProperties,
    NetworkAdapterQuery, WindowsClient,
};
use crate::error::{Error, ObjectKind, Result};
use crate::schema::{
    Attribute, MapExt, ResourceData, Schema, StateFunc, Validator, X_LIFECYCLE,
    data_source_lifecycle, from_sentinel,
};
use crate::traits::{DataSource, Resource};

use super::finish_lookup;

pub const NETWORK_ADAPTER: &str = "windows_network_adapter";

/// A network adapter, looked up by name and tracked by GUID
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkAdapterResource;

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkAdapterDataSource;

fn dns_client_schema(configurable: bool) -> Schema {
    let attr = |a: Attribute| if configurable { a.optional().computed() } else { a.computed() };
    Schema::new()
        .attr("register_connection_address", attr(Attribute::bool()))
        .attr(
            "register_connection_suffix",
            attr(Attribute::string())
                .state(StateFunc::Lower)
                .state(StateFunc::AcceptEmptyString),
        )
}

fn status_properties(schema: Schema) -> Schema {
    schema
        .attr("permanent_mac_address", Attribute::string().computed())
        .attr("admin_status", Attribute::string().computed())
        .attr("operational_status", Attribute::string().computed())
        .attr("connection_status", Attribute::string().computed())
        .attr("connection_speed", Attribute::string().computed())
        .attr("is_physical", Attribute::bool().computed())
}

fn dns_client_block(dns: &AdapterDnsClient) -> Value {
    json!({
        "register_connection_address": dns.register_connection_address,
        "register_connection_suffix":
            StateFunc::AcceptEmptyString.apply(&dns.register_connection_suffix.to_lowercase()),
    })
}

/// Properties the resource and the data source report alike
fn set_common(data: &mut ResourceData, adapter: &NetworkAdapterProperties) {
    data.set("guid", adapter.guid.to_uppercase());
    data.set("mac_address", adapter.mac_address.to_uppercase());
    data.set("permanent_mac_address", adapter.permanent_mac_address.to_uppercase());
    match &adapter.dns_client {
        Some(dns) => data.set("dns_client", dns_client_block(dns)),
        None => {
            data.remove("dns_client");
        }
    }
    data.set("admin_status", adapter.admin_status.as_str());
    data.set("operational_status", adapter.operational_status.as_str());
    data.set("connection_status", adapter.connection_status.as_str());
    data.set("connection_speed", adapter.connection_speed.as_str());
    data.set("is_physical", adapter.is_physical);
}

/// `name` stays the declared lookup key; the current name shows up in
/// `new_name` once it differs or a rename is declared
fn set_properties(data: &mut ResourceData, adapter: &NetworkAdapterProperties) {
    set_common(data, adapter);
    let renamed = adapter.name != data.state_str("name");
    if renamed || !data.state_str("new_name").is_empty() {
        data.set("new_name", adapter.name.as_str());
    } else {
        data.remove("new_name");
    }
}

fn set_original(data: &mut ResourceData, adapter: &NetworkAdapterProperties) {
    let mut original = Map::new();
    original.insert("name".to_string(), adapter.name.as_str().into());
    original.insert(
        "mac_address".to_string(),
        adapter.mac_address.to_uppercase().into(),
    );
    if let Some(dns) = &adapter.dns_client {
        original.insert("dns_client".to_string(), dns_client_block(dns));
    }
    data.set("original", original);
}

fn differs(data: &ResourceData, adapter: &NetworkAdapterProperties) -> bool {
    if data
        .configured_str("new_name")
        .is_some_and(|n| !n.is_empty() && n != adapter.name)
    {
        return true;
    }
    // "" asks for the factory address
    if data.configured_str("mac_address").is_some_and(|m| {
        let wanted: &str = if m.is_empty() { &adapter.permanent_mac_address } else { m };
        !wanted.eq_ignore_ascii_case(&adapter.mac_address)
    }) {
        return true;
    }
    let Some(dns) = data.configured_block("dns_client") else {
        return false;
    };
    let current = adapter.dns_client.clone().unwrap_or_default();
    dns.bool_at("register_connection_address")
        .is_some_and(|b| b != current.register_connection_address)
        || dns.str_at("register_connection_suffix").is_some_and(|s| {
            from_sentinel(s) != current.register_connection_suffix.to_lowercase()
        })
}

fn dns_client_patch(dns: &Map<String, Value>) -> AdapterDnsClientPatch {
    AdapterDnsClientPatch {
        register_connection_address: dns.bool_at("register_connection_address"),
        register_connection_suffix: dns.str_at("register_connection_suffix").map(from_sentinel),
    }
}

fn expand_patch(data: &ResourceData) -> NetworkAdapterPatch {
    NetworkAdapterPatch {
        new_name: data
            .configured_str("new_name")
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        mac_address: data.configured_str("mac_address").map(str::to_string),
        dns_client: data.configured_block("dns_client").map(dns_client_patch),
    }
}

fn original_patch(data: &ResourceData) -> Result<NetworkAdapterPatch> {
    let original = data.state_block("original").ok_or_else(|| {
        Error::validation("missing original properties of windows_network_adapter")
    })?;
    Ok(NetworkAdapterPatch {
        new_name: original.str_at("name").map(str::to_string),
        mac_address: original.str_at("mac_address").map(str::to_string),
        dns_client: original.block_at("dns_client").map(dns_client_patch),
    })
}

/// GUID once known, the declared name before
fn state_query(data: &ResourceData) -> NetworkAdapterQuery {
    match data.state_str("guid") {
        "" => NetworkAdapterQuery::by_name(data.state_str("name")),
        guid => NetworkAdapterQuery::by_guid(guid),
    }
}

#[async_trait]
impl Resource for NetworkAdapterResource {
    fn type_name(&self) -> &'static str {
        NETWORK_ADAPTER
    }

    fn schema(&self) -> Schema {
        status_properties(Schema::new())
            .attr("name", Attribute::string().required().force_new())
            .attr("new_name", Attribute::string().optional())
            .attr("guid", Attribute::string().computed().state(StateFunc::Upper))
            .attr(
                "mac_address",
                Attribute::string()
                    .optional()
                    .computed()
                    .validate(Validator::Mac)
                    .state(StateFunc::Upper),
            )
            .attr(
                "dns_client",
                Attribute::block(dns_client_schema(true)).optional().computed(),
            )
            .attr(
                "original",
                Attribute::block(
                    Schema::new()
                        .attr("name", Attribute::string().computed())
                        .attr("mac_address", Attribute::string().computed())
                        .attr("dns_client", Attribute::block(dns_client_schema(false)).computed()),
                )
                .computed(),
            )
    }

    async fn create(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let name = data.state_str("name").to_string();
        let id = client.resource_id(ObjectKind::NetworkAdapter, &name);
        info!(resource = NETWORK_ADAPTER, id = %id, "creating");

        let adapter = client
            .read_network_adapter(&NetworkAdapterQuery::by_name(name.as_str()))
            .await
            .map_err(|e| {
                error!(resource = NETWORK_ADAPTER, id = %id, "cannot import into state: {}", e);
                e
            })?;
        set_original(data, &adapter);

        if !differs(data, &adapter) {
            set_properties(data, &adapter);
            data.set_id(id.as_str());
            info!(resource = NETWORK_ADAPTER, id = %id, "created without changes");
            return Ok(());
        }

        let patch = expand_patch(data);
        client
            .update_network_adapter(&NetworkAdapterQuery::by_guid(adapter.guid.as_str()), &patch)
            .await
            .map_err(|e| {
                error!(resource = NETWORK_ADAPTER, id = %id, "cannot update: {}", e);
                e
            })?;
        data.set("guid", adapter.guid.to_uppercase());
        data.set_id(id.as_str());
        info!(resource = NETWORK_ADAPTER, id = %id, "created");
        self.read(client, data).await
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        match client.read_network_adapter(&state_query(data)).await {
            Ok(adapter) => {
                set_properties(data, &adapter);
                info!(resource = NETWORK_ADAPTER, id = data.id(), "read");
            }
            Err(e) => {
                warn!(resource = NETWORK_ADAPTER, id = data.id(), "cannot read, removing from state: {}", e);
                data.clear_id();
            }
        }
        Ok(())
    }

    async fn update(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let patch = expand_patch(data);
        if !patch.is_empty() {
            let query = NetworkAdapterQuery::by_guid(data.state_str("guid"));
            client.update_network_adapter(&query, &patch).await.map_err(|e| {
                error!(resource = NETWORK_ADAPTER, id = data.id(), "cannot update: {}", e);
                e
            })?;
        }
        info!(resource = NETWORK_ADAPTER, id = data.id(), "updated");
        self.read(client, data).await
    }

    async fn delete(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        info!(resource = NETWORK_ADAPTER, id = data.id(), "restoring original properties");
        let query = NetworkAdapterQuery::by_guid(data.state_str("guid"));
        let restored = match original_patch(data) {
            Ok(patch) => client.update_network_adapter(&query, &patch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            warn!(resource = NETWORK_ADAPTER, id = data.id(), "cannot restore original properties: {}", e);
        }
        data.clear_id();
        Ok(())
    }
}

#[async_trait]
impl DataSource for NetworkAdapterDataSource {
    fn type_name(&self) -> &'static str {
        NETWORK_ADAPTER
    }

    fn schema(&self) -> Schema {
        status_properties(Schema::new())
            .attr(
                "guid",
                Attribute::string()
                    .optional()
                    .computed()
                    .validate(Validator::Uuid)
                    .state(StateFunc::Upper),
            )
            .attr(
                "name",
                Attribute::string().optional().computed().conflicts_with(&["guid"]),
            )
            .attr("mac_address", Attribute::string().computed())
            .attr("dns_client", Attribute::block(dns_client_schema(false)).computed())
            .attr(X_LIFECYCLE, data_source_lifecycle())
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let query = NetworkAdapterQuery {
            guid: data.configured_str("guid").unwrap_or_default().to_string(),
            name: data.configured_str("name").unwrap_or_default().to_string(),
            ..NetworkAdapterQuery::default()
        };
        let id = client.resource_id(
            ObjectKind::NetworkAdapter,
            query.selector().unwrap_or_default(),
        );
        let result = client.read_network_adapter(&query).await;
        finish_lookup(
            data,
            ObjectKind::NetworkAdapter,
            id,
            result,
            |data, adapter| {
                set_common(data, adapter);
                data.set("name", adapter.name.as_str());
            },
            |data| {
                set_common(data, &NetworkAdapterProperties::default());
                data.set("name", "");
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(config: Value) -> ResourceData {
        match config {
            Value::Object(m) => ResourceData::from_config(m),
            _ => panic!("not an object"),
        }
    }

    fn host() -> NetworkAdapterProperties {
        NetworkAdapterProperties {
            guid: "6d0e9a3a-3c4b-4b7a-9a1e-3f1c2b4d5e6f".to_string(),
            name: "Ethernet0".to_string(),
            mac_address: "00-15-5D-00-01-02".to_string(),
            permanent_mac_address: "00-15-5D-00-01-02".to_string(),
            dns_client: Some(AdapterDnsClient {
                register_connection_address: true,
                register_connection_suffix: "".to_string(),
            }),
            ..NetworkAdapterProperties::default()
        }
    }

    #[test]
    fn test_empty_suffix_round_trips_through_sentinel() {
        let d = data(json!({
            "name": "Ethernet0",
            "dns_client": { "register_connection_address": true, "register_connection_suffix": "<empty>" }
        }));
        assert!(!differs(&d, &host()));

        let patch = expand_patch(&d);
        assert_eq!(
            patch.dns_client.unwrap().register_connection_suffix,
            Some(String::new())
        );
    }

    #[test]
    fn test_rename_is_reported_in_new_name() {
        let mut d = data(json!({ "name": "Ethernet0", "new_name": "LAN" }));
        assert!(differs(&d, &host()));

        let renamed = NetworkAdapterProperties {
            name: "LAN".to_string(),
            ..host()
        };
        set_properties(&mut d, &renamed);
        assert_eq!(d.state_str("name"), "Ethernet0");
        assert_eq!(d.state_str("new_name"), "LAN");
        assert_eq!(d.state_str("guid"), "6D0E9A3A-3C4B-4B7A-9A1E-3F1C2B4D5E6F");
    }

    #[test]
    fn test_empty_mac_address_means_factory_address() {
        let d = data(json!({ "name": "Ethernet0", "mac_address": "" }));
        assert!(!differs(&d, &host()));
        assert_eq!(expand_patch(&d).mac_address, Some(String::new()));

        let overridden = NetworkAdapterProperties {
            mac_address: "02-00-00-00-00-01".to_string(),
            ..host()
        };
        assert!(differs(&d, &overridden));
    }

    #[test]
    fn test_query_prefers_guid_once_known() {
        let mut d = data(json!({ "name": "Ethernet0" }));
        assert_eq!(state_query(&d), NetworkAdapterQuery::by_name("Ethernet0"));
        d.set("guid", "A");
        assert_eq!(state_query(&d), NetworkAdapterQuery::by_guid("A"));
    }

    #[test]
    fn test_original_patch() {
        let mut d = data(json!({ "name": "Ethernet0" }));
        set_original(&mut d, &host());
        let patch = original_patch(&d).unwrap();
        assert_eq!(patch, host().to_patch());
    }
}
