//! Contract Test: Resource lifecycle
//!
//! Constraints verified:
//! - Create adopts the existing object and snapshots it under `original`
//! - Applying the properties just read changes nothing
//! - Delete replays `original` from the first create, even after updates
//! - A failed restore on delete is not fatal: the identity is cleared
//! - Refresh of a vanished object drops it from state instead of failing
//! - Data sources honor `x_lifecycle.ignore_error_if_not_exists`
//!
//! If this test fails, applying and destroying resources is unsafe.

mod common;

use common::*;
use serde_json::{Value, json};
use std::sync::Arc;
use tfwin_core::traits::ScriptOutput;
use tfwin_core::{
    EngineConfig, EngineEvent, MemoryStateStore, ProviderEngine, ProviderRegistry,
};
use tokio_stream::StreamExt;

const ADAPTER: &str = "windows_network_adapter";
const ADAPTER_ID: &str = "//localhost/network_adapters/Ethernet0";
const GUID: &str = "6C2B7A52-0D6C-4E4B-9D7E-2C4F0A1B3E5D";
const ORIGINAL_MAC: &str = "00-15-5D-00-01-02";

fn adapter(name: &str, mac: &str) -> Value {
    json!({
        "GUID": GUID,
        "Name": name,
        "MACAddress": mac,
        "PermanentMACAddress": ORIGINAL_MAC,
        "DNSClient": {
            "RegisterConnectionAddress": true,
            "RegisterConnectionSuffix": "Corp.Example.com"
        },
        "AdminStatus": "Up",
        "OperationalStatus": "Up",
        "ConnectionStatus": "Connected",
        "ConnectionSpeed": "10 Gbps",
        "IsPhysical": true
    })
}

fn reply_adapter(runner: &MockRunner, value: Value) {
    runner.replace("readNetworkAdapter", ScriptOutput::ok(value.to_string()));
}

#[tokio::test]
async fn create_without_changes_only_reads() {
    let runner = MockRunner::new();
    reply_adapter(&runner, adapter("Ethernet0", ORIGINAL_MAC));
    let engine = engine(&runner);

    let config = object(json!({
        "name": "Ethernet0",
        "mac_address": "00-15-5d-00-01-02",
        "dns_client": {
            "register_connection_address": true,
            "register_connection_suffix": "corp.example.com"
        }
    }));
    let created = engine.create(ADAPTER, config.clone()).await.unwrap();

    assert_eq!(created.id, ADAPTER_ID);
    assert_eq!(runner.script_names(), vec!["readNetworkAdapter"]);
    assert_eq!(created.attributes["guid"], GUID);
    assert_eq!(created.attributes["mac_address"], ORIGINAL_MAC);
    assert_eq!(created.attributes["original"]["mac_address"], ORIGINAL_MAC);
    assert!(created.attributes.get("new_name").is_none());

    // Applying what was just read leaves the state as it was
    runner.reply("updateNetworkAdapter", ScriptOutput::ok(""));
    let updated = engine.update(ADAPTER_ID, config).await.unwrap();
    assert_eq!(updated.attributes, created.attributes);
}

#[tokio::test]
async fn delete_replays_the_original_from_create() {
    let runner = MockRunner::new();
    runner.reply_json("readNetworkAdapter", adapter("Ethernet0", ORIGINAL_MAC));
    runner.reply_json("readNetworkAdapter", adapter("Ethernet0", "00-15-5D-00-00-99"));
    runner.reply("updateNetworkAdapter", ScriptOutput::ok(""));
    let engine = engine(&runner);

    let created = engine
        .create(
            ADAPTER,
            object(json!({ "name": "Ethernet0", "mac_address": "00-15-5D-00-00-99" })),
        )
        .await
        .unwrap();
    assert_eq!(
        runner.script_names(),
        vec!["readNetworkAdapter", "updateNetworkAdapter", "readNetworkAdapter"]
    );
    assert_eq!(created.attributes["mac_address"], "00-15-5D-00-00-99");
    assert_eq!(created.attributes["original"]["mac_address"], ORIGINAL_MAC);

    reply_adapter(&runner, adapter("LAN", "00-15-5D-00-00-AA"));
    let updated = engine
        .update(
            ADAPTER_ID,
            object(json!({
                "name": "Ethernet0",
                "new_name": "LAN",
                "mac_address": "00-15-5D-00-00-AA"
            })),
        )
        .await
        .unwrap();
    assert_eq!(updated.attributes["new_name"], "LAN");
    assert_eq!(updated.attributes["original"]["name"], "Ethernet0");

    engine.delete(ADAPTER_ID).await.unwrap();

    let restores = runner.bodies_of("updateNetworkAdapter");
    let restore = restores.last().unwrap();
    assert!(restore.contains(r#""NewName":"Ethernet0""#), "restore: {}", restore);
    assert!(restore.contains(&format!(r#""MACAddress":"{}""#, ORIGINAL_MAC)));
    assert!(restore.contains(r#""RegisterConnectionSuffix":"corp.example.com""#));
    assert!(restore.contains(&format!(r#""GUID":"{}""#, GUID)));
    assert!(engine.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_restore_still_clears_the_identity() {
    let runner = MockRunner::new();
    reply_adapter(&runner, adapter("Ethernet0", ORIGINAL_MAC));
    runner.reply("updateNetworkAdapter", ScriptOutput::failed(1, "Access is denied."));
    let engine = engine(&runner);

    engine
        .create(ADAPTER, object(json!({ "name": "Ethernet0" })))
        .await
        .unwrap();
    assert_eq!(engine.list().await.unwrap(), vec![ADAPTER_ID.to_string()]);

    engine.delete(ADAPTER_ID).await.unwrap();
    assert_eq!(runner.bodies_of("updateNetworkAdapter").len(), 1);
    assert!(engine.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn second_create_keeps_the_first_original() {
    let runner = MockRunner::new();
    reply_adapter(&runner, adapter("Ethernet0", ORIGINAL_MAC));
    let engine = engine(&runner);
    let config = object(json!({ "name": "Ethernet0" }));

    engine.create(ADAPTER, config.clone()).await.unwrap();

    reply_adapter(&runner, adapter("Ethernet0", "00-15-5D-00-00-99"));
    let again = engine.create(ADAPTER, config).await.unwrap();
    assert_eq!(again.attributes["mac_address"], "00-15-5D-00-00-99");
    assert_eq!(again.attributes["original"]["mac_address"], ORIGINAL_MAC);
}

#[tokio::test]
async fn refresh_of_a_vanished_adapter_drops_it() {
    let runner = MockRunner::new();
    reply_adapter(&runner, adapter("Ethernet0", ORIGINAL_MAC));
    let engine = engine(&runner);
    engine
        .create(ADAPTER, object(json!({ "name": "Ethernet0" })))
        .await
        .unwrap();

    let refreshed = engine.read(ADAPTER_ID).await.unwrap().unwrap();
    assert_eq!(refreshed.attributes["guid"], GUID);
    assert!(
        runner.bodies_of("readNetworkAdapter")[1].contains(&format!(r#""GUID":"{}""#, GUID)),
        "refresh looks the adapter up by GUID"
    );

    runner.replace(
        "readNetworkAdapter",
        ScriptOutput::failed(1, format!("cannot find network_adapter '{}'", GUID)),
    );
    assert!(engine.read(ADAPTER_ID).await.unwrap().is_none());
    assert!(engine.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn changing_the_lookup_name_replaces_the_adapter() {
    let runner = MockRunner::new();
    reply_adapter(&runner, adapter("Ethernet0", ORIGINAL_MAC));
    runner.reply("updateNetworkAdapter", ScriptOutput::ok(""));

    let (engine, events) = ProviderEngine::new(
        Arc::new(ProviderRegistry::with_builtin()),
        client(&runner),
        Box::new(MemoryStateStore::new()),
        EngineConfig::default(),
    )
    .unwrap();

    engine
        .create(ADAPTER, object(json!({ "name": "Ethernet0" })))
        .await
        .unwrap();

    reply_adapter(&runner, adapter("Ethernet1", ORIGINAL_MAC));
    let replaced = engine
        .update(ADAPTER_ID, object(json!({ "name": "Ethernet1" })))
        .await
        .unwrap();
    assert_eq!(replaced.id, "//localhost/network_adapters/Ethernet1");
    assert_eq!(
        engine.list().await.unwrap(),
        vec!["//localhost/network_adapters/Ethernet1".to_string()]
    );

    drop(engine);
    let events: Vec<EngineEvent> = events.collect().await;
    assert!(events.contains(&EngineEvent::Replaced {
        resource_type: ADAPTER.to_string(),
        old_id: ADAPTER_ID.to_string(),
        new_id: "//localhost/network_adapters/Ethernet1".to_string(),
        attributes: vec!["name".to_string()],
    }));
}

#[tokio::test]
async fn missing_data_source_can_be_ignored() {
    let runner = MockRunner::new();
    runner.reply(
        "readNetworkAdapter",
        ScriptOutput::failed(1, "cannot find network_adapter 'Ethernet9'"),
    );
    let engine = engine(&runner);

    let err = engine
        .read_data_source(ADAPTER, object(json!({ "name": "Ethernet9" })))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cannot find network_adapter 'Ethernet9'"));

    let state = engine
        .read_data_source(
            ADAPTER,
            object(json!({
                "name": "Ethernet9",
                "x_lifecycle": { "ignore_error_if_not_exists": true }
            })),
        )
        .await
        .unwrap();
    assert_eq!(state.id, "//localhost/network_adapters/Ethernet9");
    assert_eq!(state.attributes["name"], "");
    assert_eq!(state.attributes["guid"], "");
    assert_eq!(state.attributes["x_lifecycle"]["exists"], false);
}

#[tokio::test]
async fn invalid_configuration_runs_no_script() {
    let runner = MockRunner::new();
    let engine = engine(&runner);

    for config in [
        json!({}),
        json!({ "name": "Ethernet0", "mac_address": "00:15:5D:00:01:02" }),
        json!({ "name": "Ethernet0", "guid": GUID }),
        json!({ "name": "Ethernet0", "speed": 10 }),
    ] {
        assert!(engine.create(ADAPTER, object(config)).await.is_err());
    }
    assert_eq!(runner.call_count(), 0);
}
