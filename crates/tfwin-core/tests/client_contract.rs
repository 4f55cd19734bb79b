//! Contract Test: Windows client queries
//!
//! Constraints verified:
//! - An empty query is rejected before any script runs
//! - Only the identifier that wins the precedence reaches the host
//! - Properties survive the JSON exchange with the host unchanged
//! - A missing object is reported with the host's wording
//!
//! If this test fails, the client talks to the host incorrectly.

mod common;

use common::*;
use serde_json::json;
use tfwin_core::ObjectKind;
use tfwin_core::client::{
    InterfaceQuery, NetworkAdapterProperties, NetworkAdapterQuery, NetworkConnectionQuery,
};
use tfwin_core::error::Error;
use tfwin_core::traits::ScriptOutput;

const GUID: &str = "6C2B7A52-0D6C-4E4B-9D7E-2C4F0A1B3E5D";

#[tokio::test]
async fn empty_queries_are_rejected_without_running_scripts() {
    let runner = MockRunner::new();
    let client = client(&runner);

    let adapter = client.read_network_adapter(&NetworkAdapterQuery::default()).await;
    assert!(matches!(adapter, Err(Error::Validation(_))));

    let interface = client.read_network_interface(&InterfaceQuery::default()).await;
    assert!(matches!(interface, Err(Error::Validation(_))));

    let link = client.read_link_ip_interface(&InterfaceQuery::default()).await;
    assert!(matches!(link, Err(Error::Validation(_))));

    // allow_disconnect alone identifies nothing
    let connection = client
        .read_network_connection(&NetworkConnectionQuery {
            allow_disconnect: true,
            ..NetworkConnectionQuery::default()
        })
        .await;
    assert!(matches!(connection, Err(Error::Validation(_))));

    assert_eq!(runner.call_count(), 0, "no script may run for an empty query");
}

#[tokio::test]
async fn only_the_winning_identifier_reaches_the_host() {
    let runner = MockRunner::new();
    runner.reply_json("readNetworkAdapter", json!({ "GUID": GUID, "Name": "Ethernet0" }));
    runner.reply_json("readNetworkInterface", json!({ "Index": 7, "Alias": "Ethernet0" }));
    runner.reply_json("readLinkIPInterface", json!({ "Index": 7, "Alias": "Ethernet0" }));
    let client = client(&runner);

    client
        .read_network_adapter(&NetworkAdapterQuery {
            guid: GUID.to_string(),
            name: "Ethernet0".to_string(),
            old_name: "LAN".to_string(),
        })
        .await
        .unwrap();
    let body = &runner.bodies_of("readNetworkAdapter")[0];
    assert!(body.contains(&format!(r#"{{"GUID":"{}","Name":"","OldName":""}}"#, GUID)));

    let query = InterfaceQuery {
        guid: GUID.to_string(),
        index: 7,
        alias: "Ethernet0".to_string(),
        ..InterfaceQuery::default()
    };
    client.read_network_interface(&query).await.unwrap();
    client.read_link_ip_interface(&query).await.unwrap();

    let interface_body = &runner.bodies_of("readNetworkInterface")[0];
    assert!(interface_body.contains(&format!(r#""GUID":"{}""#, GUID)));
    assert!(interface_body.contains(r#""Index":0"#));
    assert!(interface_body.contains(r#""Alias":"""#));

    let link_body = &runner.bodies_of("readLinkIPInterface")[0];
    assert!(link_body.contains(r#""GUID":"""#));
    assert!(link_body.contains(r#""Index":7"#));
    assert!(link_body.contains(r#""Alias":"""#));
}

#[tokio::test]
async fn properties_survive_the_exchange_with_the_host() {
    let host_json = json!({
        "GUID": GUID,
        "Name": "Ethernet0",
        "MACAddress": "00-15-5D-00-01-02",
        "PermanentMACAddress": "00-15-5D-00-01-02",
        "DNSClient": {
            "RegisterConnectionAddress": true,
            "RegisterConnectionSuffix": "corp.example.com"
        },
        "AdminStatus": "Up",
        "OperationalStatus": "Up",
        "ConnectionStatus": "Connected",
        "ConnectionSpeed": "10 Gbps",
        "IsPhysical": false
    });

    let runner = MockRunner::new();
    runner.reply_json("readNetworkAdapter", host_json.clone());
    let client = client(&runner);

    let properties = client
        .read_network_adapter(&NetworkAdapterQuery::by_name("Ethernet0"))
        .await
        .unwrap();
    assert_eq!(serde_json::to_value(&properties).unwrap(), host_json);

    let back: NetworkAdapterProperties = serde_json::from_value(host_json).unwrap();
    assert_eq!(back, properties);
}

#[tokio::test]
async fn missing_adapter_is_reported_with_host_wording() {
    let runner = MockRunner::new();
    runner.reply(
        "readNetworkAdapter",
        ScriptOutput::failed(
            1,
            "Exception: cannot find network_adapter 'Ethernet0'\r\nAt line:21 char:5",
        ),
    );
    let client = client(&runner);

    let err = client
        .read_network_adapter(&NetworkAdapterQuery::by_name("Ethernet0"))
        .await
        .unwrap_err();
    assert!(err.is_not_found_for(ObjectKind::NetworkAdapter));
    assert!(
        err.to_string().contains("cannot find network_adapter 'Ethernet0'"),
        "unexpected error text: {}",
        err
    );
}

#[tokio::test]
async fn several_matches_are_ambiguous() {
    let runner = MockRunner::new();
    runner.reply(
        "readNetworkInterface",
        ScriptOutput::failed(1, "found multiple network_interface '00-15-5D-00-01-02'"),
    );
    let client = client(&runner);

    let err = client
        .read_network_interface(&InterfaceQuery {
            mac_address: "00-15-5D-00-01-02".to_string(),
            ..InterfaceQuery::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::AmbiguousMatch { kind: ObjectKind::NetworkInterface, .. }
    ));
}
