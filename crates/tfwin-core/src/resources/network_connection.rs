//! `windows_network_connection`

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use crate::client::{
    NetworkConnectionPatch, NetworkConnectionProperties, NetworkConnectionQuery, WindowsClient,
};
use crate::error::{Error, ObjectKind, Result};
use crate::schema::{
    Attribute, MapExt, ResourceData, Schema, StateFunc, Validator, X_LIFECYCLE,
    data_source_lifecycle,
};
use crate::traits::{DataSource, Resource};

use super::finish_lookup;

pub const NETWORK_CONNECTION: &str = "windows_network_connection";

const CONNECTION_PROFILES: &[&str] = &["public", "private"];

/// A network connection profile, looked up by gateway or name and tracked by GUID
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnectionResource;

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnectionDataSource;

fn connectivity(schema: Schema) -> Schema {
    schema
        .attr("ipv4_connectivity", Attribute::string().computed())
        .attr("ipv6_connectivity", Attribute::string().computed())
}

fn lookup_attributes(schema: Schema) -> Schema {
    schema
        .attr(
            "ipv4_gateway_address",
            Attribute::string()
                .optional()
                .computed()
                .validate(Validator::Ip)
                .conflicts_with(&["name"]),
        )
        .attr(
            "ipv6_gateway_address",
            Attribute::string()
                .optional()
                .computed()
                .validate(Validator::Ip)
                .state(StateFunc::Upper)
                .conflicts_with(&["ipv4_gateway_address", "name"]),
        )
        .attr("allow_disconnect", Attribute::bool().optional())
        .attr(
            "name",
            Attribute::string()
                .optional()
                .computed()
                .conflicts_with(&["ipv4_gateway_address", "ipv6_gateway_address"]),
        )
}

/// Query built from what is known in state
///
/// The GUID wins once it is known; before that the declared gateways and name
/// are used.
fn state_query(data: &ResourceData) -> NetworkConnectionQuery {
    let allow_disconnect = data.state_bool("allow_disconnect");
    match data.state_str("guid") {
        "" => NetworkConnectionQuery {
            ipv4_gateway_address: data.state_str("ipv4_gateway_address").to_string(),
            ipv6_gateway_address: data.state_str("ipv6_gateway_address").to_string(),
            name: data.state_str("name").to_string(),
            allow_disconnect,
            ..NetworkConnectionQuery::default()
        },
        guid => NetworkConnectionQuery {
            allow_disconnect,
            ..NetworkConnectionQuery::by_guid(guid)
        },
    }
}

/// Gateways the host can no longer determine keep their known value
fn set_common(data: &mut ResourceData, connection: &NetworkConnectionProperties) {
    data.set("guid", connection.guid.to_uppercase());
    if !connection.ipv4_gateway_address.is_empty() {
        data.set("ipv4_gateway_address", connection.ipv4_gateway_address.as_str());
    }
    if !connection.ipv6_gateway_address.is_empty() {
        data.set("ipv6_gateway_address", connection.ipv6_gateway_address.to_uppercase());
    }
    data.set("connection_profile", connection.connection_profile.as_str());
    data.set("ipv4_connectivity", connection.ipv4_connectivity.as_str());
    data.set("ipv6_connectivity", connection.ipv6_connectivity.as_str());
}

fn set_properties(data: &mut ResourceData, connection: &NetworkConnectionProperties) {
    set_common(data, connection);
    let renaming = !data.state_str("new_name").is_empty();
    if !renaming || data.state_str("name").is_empty() {
        data.set("name", connection.name.as_str());
    }
    if renaming {
        data.set("new_name", connection.name.as_str());
    }
}

fn set_original(data: &mut ResourceData, connection: &NetworkConnectionProperties) {
    data.set(
        "original",
        json!({
            "name": connection.name,
            "connection_profile": connection.connection_profile,
        }),
    );
}

fn differs(data: &ResourceData, connection: &NetworkConnectionProperties) -> bool {
    data.configured_str("new_name")
        .is_some_and(|n| !n.is_empty() && n != connection.name)
        || data
            .configured_str("connection_profile")
            .is_some_and(|p| !p.eq_ignore_ascii_case(&connection.connection_profile))
}

fn expand_patch(data: &ResourceData) -> NetworkConnectionPatch {
    NetworkConnectionPatch {
        new_name: data
            .configured_str("new_name")
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        connection_profile: data.configured_str("connection_profile").map(str::to_string),
    }
}

fn original_patch(data: &ResourceData) -> Result<NetworkConnectionPatch> {
    let original = data.state_block("original").ok_or_else(|| {
        Error::validation("missing original properties of windows_network_connection")
    })?;
    Ok(NetworkConnectionPatch {
        new_name: original.str_at("name").map(str::to_string),
        connection_profile: original.str_at("connection_profile").map(str::to_string),
    })
}

#[async_trait]
impl Resource for NetworkConnectionResource {
    fn type_name(&self) -> &'static str {
        NETWORK_CONNECTION
    }

    fn schema(&self) -> Schema {
        let mut schema = connectivity(lookup_attributes(Schema::new()))
            .attr("guid", Attribute::string().computed().state(StateFunc::Upper))
            .attr("new_name", Attribute::string().optional())
            .attr(
                "connection_profile",
                Attribute::string()
                    .optional()
                    .computed()
                    .validate(Validator::StringIn(CONNECTION_PROFILES))
                    .state(StateFunc::Camel),
            )
            .attr(
                "original",
                Attribute::block(
                    Schema::new()
                        .attr("name", Attribute::string().computed())
                        .attr("connection_profile", Attribute::string().computed()),
                )
                .computed(),
            );
        for gateway in ["ipv4_gateway_address", "ipv6_gateway_address"] {
            if let Some(attr) = schema.get(gateway).cloned() {
                schema = schema.attr(gateway, attr.force_new());
            }
        }
        schema
    }

    async fn create(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let query = state_query(data);
        let id = client.resource_id(
            ObjectKind::NetworkConnection,
            query.selector().unwrap_or_default(),
        );
        info!(resource = NETWORK_CONNECTION, id = %id, "creating");

        let connection = client.read_network_connection(&query).await.map_err(|e| {
            error!(resource = NETWORK_CONNECTION, id = %id, "cannot import into state: {}", e);
            e
        })?;
        set_original(data, &connection);

        if !differs(data, &connection) {
            set_properties(data, &connection);
            data.set_id(id.as_str());
            info!(resource = NETWORK_CONNECTION, id = %id, "created without changes");
            return Ok(());
        }

        let patch = expand_patch(data);
        client
            .update_network_connection(
                &NetworkConnectionQuery::by_guid(connection.guid.as_str()),
                &patch,
            )
            .await
            .map_err(|e| {
                error!(resource = NETWORK_CONNECTION, id = %id, "cannot update: {}", e);
                e
            })?;
        data.set("guid", connection.guid.to_uppercase());
        data.set_id(id.as_str());
        info!(resource = NETWORK_CONNECTION, id = %id, "created");
        self.read(client, data).await
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        match client.read_network_connection(&state_query(data)).await {
            Ok(connection) => {
                set_properties(data, &connection);
                info!(resource = NETWORK_CONNECTION, id = data.id(), "read");
            }
            Err(e) => {
                warn!(resource = NETWORK_CONNECTION, id = data.id(), "cannot read, removing from state: {}", e);
                data.clear_id();
            }
        }
        Ok(())
    }

    async fn update(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let patch = expand_patch(data);
        if !patch.is_empty() {
            let query = NetworkConnectionQuery::by_guid(data.state_str("guid"));
            client.update_network_connection(&query, &patch).await.map_err(|e| {
                error!(resource = NETWORK_CONNECTION, id = data.id(), "cannot update: {}", e);
                e
            })?;
        }
        info!(resource = NETWORK_CONNECTION, id = data.id(), "updated");
        self.read(client, data).await
    }

    async fn delete(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        info!(resource = NETWORK_CONNECTION, id = data.id(), "restoring original properties");
        let query = NetworkConnectionQuery::by_guid(data.state_str("guid"));
        let restored = match original_patch(data) {
            Ok(patch) => client.update_network_connection(&query, &patch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            warn!(resource = NETWORK_CONNECTION, id = data.id(), "cannot restore original properties: {}", e);
        }
        data.clear_id();
        Ok(())
    }
}

#[async_trait]
impl DataSource for NetworkConnectionDataSource {
    fn type_name(&self) -> &'static str {
        NETWORK_CONNECTION
    }

    fn schema(&self) -> Schema {
        connectivity(lookup_attributes(Schema::new()))
            .attr(
                "guid",
                Attribute::string()
                    .optional()
                    .computed()
                    .validate(Validator::Uuid)
                    .state(StateFunc::Upper)
                    .conflicts_with(&["ipv4_gateway_address", "ipv6_gateway_address", "name"]),
            )
            .attr("connection_profile", Attribute::string().computed())
            .attr(X_LIFECYCLE, data_source_lifecycle())
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let query = state_query(data);
        let id = client.resource_id(
            ObjectKind::NetworkConnection,
            query.selector().unwrap_or_default(),
        );
        let result = client.read_network_connection(&query).await;
        finish_lookup(
            data,
            ObjectKind::NetworkConnection,
            id,
            result,
            |data, connection| {
                set_common(data, connection);
                data.set("name", connection.name.as_str());
            },
            |data| {
                set_common(data, &NetworkConnectionProperties::default());
                data.set("ipv4_gateway_address", "");
                data.set("ipv6_gateway_address", "");
                data.set("name", "");
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn data(config: Value) -> ResourceData {
        match config {
            Value::Object(m) => ResourceData::from_config(m),
            _ => panic!("not an object"),
        }
    }

    fn host() -> NetworkConnectionProperties {
        NetworkConnectionProperties {
            guid: "{6d0e9a3a-3c4b-4b7a-9a1e-3f1c2b4d5e6f}".to_string(),
            ipv4_gateway_address: "".to_string(),
            ipv6_gateway_address: "".to_string(),
            name: "corp.local".to_string(),
            connection_profile: "Public".to_string(),
            ipv4_connectivity: "Internet".to_string(),
            ipv6_connectivity: "NoTraffic".to_string(),
        }
    }

    #[test]
    fn test_unresolved_gateway_keeps_declared_value() {
        let mut d = data(json!({ "ipv4_gateway_address": "10.0.0.1" }));
        set_properties(&mut d, &host());
        assert_eq!(d.state_str("ipv4_gateway_address"), "10.0.0.1");
        assert_eq!(d.state_str("name"), "corp.local");
        assert!(d.state().get("new_name").is_none());
    }

    #[test]
    fn test_profile_comparison_ignores_case() {
        let d = data(json!({ "name": "corp.local", "connection_profile": "Public" }));
        assert!(!differs(&d, &host()));
        let d = data(json!({ "name": "corp.local", "connection_profile": "Private" }));
        assert!(differs(&d, &host()));
    }

    #[test]
    fn test_state_query_uses_guid_once_known() {
        let mut d = data(json!({ "name": "corp.local", "allow_disconnect": true }));
        let query = state_query(&d);
        assert_eq!(query.name, "corp.local");
        assert!(query.allow_disconnect);

        d.set("guid", "G");
        let query = state_query(&d);
        assert_eq!(query.guid, "G");
        assert!(query.name.is_empty());
        assert!(query.allow_disconnect);
    }

    #[test]
    fn test_gateways_force_replacement() {
        let schema = NetworkConnectionResource.schema();
        assert!(schema.get("ipv4_gateway_address").is_some_and(|a| a.force_new));
        assert!(schema.get("ipv6_gateway_address").is_some_and(|a| a.force_new));
        assert!(!schema.get("name").is_some_and(|a| a.force_new));
    }
}
