//! `windows_computer`

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

use crate::client::{
    ComputerDnsClient, ComputerDnsClientPatch, ComputerPatch, ComputerProperties, WindowsClient,
};
use crate::error::{Error, ObjectKind, Result};
use crate::schema::{
    Attribute, MapExt, ResourceData, Schema, StateFunc, Validator, X_LIFECYCLE,
    data_source_lifecycle,
};
use crate::traits::{DataSource, Resource};

use super::finish_lookup;

pub const COMPUTER: &str = "windows_computer";

/// The computer itself: name and DNS client settings
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputerResource;

/// Read-only view of the computer
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputerDataSource;

fn dns_client_schema(configurable: bool) -> Schema {
    let attr = |a: Attribute| if configurable { a.optional().computed() } else { a.computed() };
    Schema::new()
        .attr("suffix_search_list", attr(Attribute::list_of_strings()))
        .attr("enable_devolution", attr(Attribute::bool()))
        .attr(
            "devolution_level",
            attr(Attribute::int().validate(Validator::IntBetween(0, 4294967295))),
        )
}

const REBOOT_SIGNALS: [&str; 12] = [
    "reboot_required",
    "post_reboot_reporting",
    "dvd_reboot_signal",
    "reboot_pending",
    "reboot_in_progress",
    "packages_pending",
    "services_pending",
    "update_exe_volatile",
    "computer_rename_pending",
    "file_rename_pending",
    "netlogon_pending",
    "current_reboot_attemps",
];

fn reboot_pending_details_schema() -> Schema {
    REBOOT_SIGNALS
        .iter()
        .fold(Schema::new(), |s, name| s.attr(*name, Attribute::bool().computed()))
}

/// Attributes shared by the resource and the data source
fn computed_properties(schema: Schema) -> Schema {
    schema
        .attr("name", Attribute::string().computed())
        .attr("reboot_pending", Attribute::bool().computed())
        .attr(
            "reboot_pending_details",
            Attribute::block(reboot_pending_details_schema()).computed(),
        )
        .attr("network_adapter_names", Attribute::list_of_strings().computed())
        .attr("network_connection_names", Attribute::list_of_strings().computed())
}

fn dns_client_block(dns: &ComputerDnsClient) -> Value {
    json!({
        "suffix_search_list": dns.suffix_search_list,
        "enable_devolution": dns.enable_devolution,
        "devolution_level": dns.devolution_level,
    })
}

fn set_properties(data: &mut ResourceData, computer: &ComputerProperties) {
    let details = &computer.reboot_pending_details;
    data.set("name", computer.name.as_str());
    data.set("new_name", computer.new_name.as_str());
    data.set("dns_client", dns_client_block(&computer.dns_client));
    data.set("reboot_pending", computer.reboot_pending);
    data.set(
        "reboot_pending_details",
        json!({
            "reboot_required": details.reboot_required,
            "post_reboot_reporting": details.post_reboot_reporting,
            "dvd_reboot_signal": details.dvd_reboot_signal,
            "reboot_pending": details.reboot_pending,
            "reboot_in_progress": details.reboot_in_progress,
            "packages_pending": details.packages_pending,
            "services_pending": details.services_pending,
            "update_exe_volatile": details.update_exe_volatile,
            "computer_rename_pending": details.computer_rename_pending,
            "file_rename_pending": details.file_rename_pending,
            "netlogon_pending": details.netlogon_pending,
            "current_reboot_attemps": details.current_reboot_attemps,
        }),
    );
    data.set("network_adapter_names", computer.network_adapter_names.clone());
    data.set("network_connection_names", computer.network_connection_names.clone());
}

fn set_original(data: &mut ResourceData, computer: &ComputerProperties) {
    data.set(
        "original",
        json!({
            "new_name": computer.new_name,
            "dns_client": dns_client_block(&computer.dns_client),
        }),
    );
}

/// Whether the declared configuration differs from the host
fn differs(data: &ResourceData, computer: &ComputerProperties) -> bool {
    if data
        .configured_str("new_name")
        .is_some_and(|n| !n.is_empty() && n != computer.new_name)
    {
        return true;
    }
    let Some(dns) = data.configured_block("dns_client") else {
        return false;
    };
    let current = &computer.dns_client;
    dns.strings_at("suffix_search_list")
        .is_some_and(|l| l != current.suffix_search_list)
        || dns
            .bool_at("enable_devolution")
            .is_some_and(|b| b != current.enable_devolution)
        || dns
            .u64_at("devolution_level")
            .is_some_and(|l| l != u64::from(current.devolution_level))
}

fn dns_client_patch(dns: &Map<String, Value>) -> ComputerDnsClientPatch {
    ComputerDnsClientPatch {
        suffix_search_list: dns.strings_at("suffix_search_list"),
        enable_devolution: dns.bool_at("enable_devolution"),
        devolution_level: dns
            .u64_at("devolution_level")
            .and_then(|l| u32::try_from(l).ok()),
    }
}

/// Patch for the declared configuration
///
/// While creating, DNS client fields the configuration leaves out are taken
/// from `original` so they are written back unchanged.
fn expand_patch(data: &ResourceData, original: Option<&ComputerDnsClient>) -> ComputerPatch {
    let dns_client = data.configured_block("dns_client").map(|dns| {
        let mut patch = dns_client_patch(dns);
        if let Some(original) = original {
            patch
                .suffix_search_list
                .get_or_insert_with(|| original.suffix_search_list.clone());
            patch.enable_devolution.get_or_insert(original.enable_devolution);
            patch.devolution_level.get_or_insert(original.devolution_level);
        }
        patch
    });
    ComputerPatch {
        new_name: data
            .configured_str("new_name")
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        dns_client,
    }
}

fn original_patch(data: &ResourceData) -> Result<ComputerPatch> {
    let original = data
        .state_block("original")
        .ok_or_else(|| Error::validation("missing original properties of windows_computer"))?;
    Ok(ComputerPatch {
        new_name: original.str_at("new_name").map(str::to_string),
        dns_client: original.block_at("dns_client").map(dns_client_patch),
    })
}

#[async_trait]
impl Resource for ComputerResource {
    fn type_name(&self) -> &'static str {
        COMPUTER
    }

    fn schema(&self) -> Schema {
        computed_properties(Schema::new())
            .attr(
                "new_name",
                Attribute::string().optional().computed().state(StateFunc::Upper),
            )
            .attr(
                "dns_client",
                Attribute::block(dns_client_schema(true)).optional().computed(),
            )
            .attr(
                "original",
                Attribute::block(
                    Schema::new()
                        .attr("new_name", Attribute::string().computed())
                        .attr("dns_client", Attribute::block(dns_client_schema(false)).computed()),
                )
                .computed(),
            )
    }

    async fn create(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let id = client.resource_id(ObjectKind::Computer, "");
        info!(resource = COMPUTER, id = %id, "creating");

        let computer = client.read_computer().await.map_err(|e| {
            error!(resource = COMPUTER, id = %id, "cannot import into state: {}", e);
            e
        })?;
        set_original(data, &computer);

        if !differs(data, &computer) {
            set_properties(data, &computer);
            data.set_id(id.as_str());
            info!(resource = COMPUTER, id = %id, "created without changes");
            return Ok(());
        }

        let patch = expand_patch(data, Some(&computer.dns_client));
        client.update_computer(&patch).await.map_err(|e| {
            error!(resource = COMPUTER, id = %id, "cannot update: {}", e);
            e
        })?;
        data.set_id(id.as_str());
        info!(resource = COMPUTER, id = %id, "created");
        self.read(client, data).await
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        match client.read_computer().await {
            Ok(computer) => {
                set_properties(data, &computer);
                info!(resource = COMPUTER, id = data.id(), "read");
            }
            Err(e) => {
                warn!(resource = COMPUTER, id = data.id(), "cannot read, removing from state: {}", e);
                data.clear_id();
            }
        }
        Ok(())
    }

    async fn update(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let patch = expand_patch(data, None);
        if !patch.is_empty() {
            client.update_computer(&patch).await.map_err(|e| {
                error!(resource = COMPUTER, id = data.id(), "cannot update: {}", e);
                e
            })?;
        }
        info!(resource = COMPUTER, id = data.id(), "updated");
        self.read(client, data).await
    }

    async fn delete(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        info!(resource = COMPUTER, id = data.id(), "restoring original properties");
        let restored = match original_patch(data) {
            Ok(patch) => client.update_computer(&patch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            warn!(resource = COMPUTER, id = data.id(), "cannot restore original properties: {}", e);
        }
        data.clear_id();
        Ok(())
    }
}

#[async_trait]
impl DataSource for ComputerDataSource {
    fn type_name(&self) -> &'static str {
        COMPUTER
    }

    fn schema(&self) -> Schema {
        computed_properties(Schema::new())
            .attr("new_name", Attribute::string().computed())
            .attr("dns_client", Attribute::block(dns_client_schema(false)).computed())
            .attr(X_LIFECYCLE, data_source_lifecycle())
    }

    async fn read(&self, client: &WindowsClient, data: &mut ResourceData) -> Result<()> {
        let id = client.resource_id(ObjectKind::Computer, "");
        let result = client.read_computer().await;
        finish_lookup(data, ObjectKind::Computer, id, result, set_properties, |data| {
            set_properties(data, &ComputerProperties::default())
        })
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

    fn host() -> ComputerProperties {
        ComputerProperties {
            name: "WS01".to_string(),
            new_name: "WS01".to_string(),
            dns_client: ComputerDnsClient {
                suffix_search_list: vec!["corp.local".to_string()],
                enable_devolution: true,
                devolution_level: 2,
            },
            ..ComputerProperties::default()
        }
    }

    #[test]
    fn test_config_equal_to_host_has_no_diff() {
        let d = data(json!({
            "new_name": "WS01",
            "dns_client": { "suffix_search_list": ["corp.local"], "enable_devolution": true, "devolution_level": 2 }
        }));
        assert!(!differs(&d, &host()));
    }

    #[test]
    fn test_zero_values_are_a_diff() {
        let d = data(json!({ "dns_client": { "devolution_level": 0 } }));
        assert!(differs(&d, &host()));
    }

    #[test]
    fn test_create_fills_unspecified_dns_fields_from_original() {
        let d = data(json!({ "dns_client": { "enable_devolution": false } }));
        let patch = expand_patch(&d, Some(&host().dns_client));
        let dns = patch.dns_client.unwrap();
        assert_eq!(dns.enable_devolution, Some(false));
        assert_eq!(dns.devolution_level, Some(2));
        assert_eq!(dns.suffix_search_list, Some(vec!["corp.local".to_string()]));
        assert_eq!(patch.new_name, None);

        let update = expand_patch(&d, None);
        assert_eq!(update.dns_client.unwrap().devolution_level, None);
    }

    #[test]
    fn test_original_patch_replays_snapshot() {
        let mut d = data(json!({}));
        set_original(&mut d, &host());
        let patch = original_patch(&d).unwrap();
        assert_eq!(patch, host().to_patch());
    }

    #[test]
    fn test_schema_rejects_computed_attributes() {
        let schema = ComputerResource.schema();
        let config = match json!({ "reboot_pending": true }) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert!(matches!(schema.validate_config(&config), Err(Error::Schema(_))));
    }
}
