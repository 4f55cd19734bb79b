//! Test doubles and common utilities for contract tests
//!
//! - [`MockRunner`]: replies to scripts by name, records every script it ran
//!   and how many ran at once
//! - [`MockHostProbe`]: in-memory routes and connection profiles
//! - [`ManualClock`]: records delays instead of sleeping

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tfwin_core::config::ProviderConfig;
use tfwin_core::error::{Error, Result};
use tfwin_core::gateway::{AddressFamily, Clock, ConnectionProfile, GatewayRoute, HostProbe};
use tfwin_core::traits::{Script, ScriptOutput, ScriptRunner};
use tfwin_core::{EngineConfig, MemoryStateStore, ProviderEngine, ProviderRegistry, WindowsClient};

/// A script runner that replies from per-script queues
///
/// The last reply queued for a script is repeated for every later call.
/// Scripts without any queued reply fail with exit code 1.
#[derive(Default)]
pub struct MockRunner {
    replies: Mutex<HashMap<String, VecDeque<ScriptOutput>>>,
    scripts: Mutex<Vec<Script>>,
    call_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for the script called `name`
    pub fn reply(&self, name: &str, output: ScriptOutput) {
        self.replies
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(output);
    }

    /// Queue a JSON reply for the script called `name`
    pub fn reply_json(&self, name: &str, value: Value) {
        self.reply(name, ScriptOutput::ok(value.to_string()));
    }

    /// Drop every reply queued for `name`, then queue `output`
    pub fn replace(&self, name: &str, output: ScriptOutput) {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.entry(name.to_string()).or_default();
        queue.clear();
        queue.push_back(output);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Most scripts that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every script run so far, in order
    pub fn scripts(&self) -> Vec<Script> {
        self.scripts.lock().unwrap().clone()
    }

    /// Names of every script run so far, in order
    pub fn script_names(&self) -> Vec<&'static str> {
        self.scripts.lock().unwrap().iter().map(|s| s.name).collect()
    }

    /// Bodies of the scripts called `name`
    pub fn bodies_of(&self, name: &str) -> Vec<String> {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.body.clone())
            .collect()
    }
}

#[async_trait]
impl ScriptRunner for MockRunner {
    async fn run(&self, script: &Script) -> Result<ScriptOutput> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.scripts.lock().unwrap().push(script.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        // give other callers a chance to overlap
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let output = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(script.name) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(output.unwrap_or_else(|| {
            ScriptOutput::failed(1, format!("no reply scripted for {}", script.name))
        }))
    }

    fn transport_name(&self) -> &'static str {
        "mock"
    }
}

/// Client over a shared mock runner, on `localhost`
pub fn client(runner: &Arc<MockRunner>) -> WindowsClient {
    WindowsClient::new(runner.clone(), ProviderConfig::local())
}

/// Engine with the built-in resources over a shared mock runner
pub fn engine(runner: &Arc<MockRunner>) -> ProviderEngine {
    let (engine, _events) = ProviderEngine::new(
        Arc::new(ProviderRegistry::with_builtin()),
        client(runner),
        Box::new(MemoryStateStore::new()),
        EngineConfig::default(),
    )
    .expect("engine construction succeeds");
    engine
}

/// Unwrap a JSON object literal
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Mutable host state behind [`MockHostProbe`]
#[derive(Debug, Default)]
pub struct ProbeState {
    /// Profile names per interface index
    pub names: HashMap<u32, Vec<String>>,
    pub profiles: Vec<ConnectionProfile>,
    /// Registry GUID per profile name
    pub guids: HashMap<String, String>,
    pub routes: Vec<GatewayRoute>,
    /// Profile that drops off its interface while the route through this next hop is gone
    pub served: HashMap<String, String>,
    /// Routes were added manually
    pub persistent: bool,
    pub dhcp: bool,
    /// Binding state per (alias, component id)
    pub bindings: HashMap<(String, String), bool>,
    /// Every host-changing call, in order
    pub changes: Vec<String>,
    /// Interfaces never come back up
    pub offline: bool,
    /// Times an interface was asked whether it is connected
    pub connectivity_checks: usize,
    /// Listing profile names fails once a route is removed
    pub unreachable_after_removal: bool,
    /// Interface the remote session runs through
    pub session_interface: Option<u32>,
}

/// A host probe over [`ProbeState`]
#[derive(Default)]
pub struct MockHostProbe {
    pub state: Mutex<ProbeState>,
}

impl MockHostProbe {
    pub fn new(state: ProbeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn changes(&self) -> Vec<String> {
        self.state.lock().unwrap().changes.clone()
    }
}

#[async_trait]
impl HostProbe for MockHostProbe {
    async fn profile_names(&self, interface_index: u32) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let removed = state.changes.iter().any(|c| c.starts_with("remove "));
        if state.unreachable_after_removal && removed {
            return Err(Error::transport(
                "probeProfileNames",
                Some(255),
                "Connection to host closed",
            ));
        }
        Ok(state.names.get(&interface_index).cloned().unwrap_or_default())
    }

    async fn profile_by_name(
        &self,
        name: &str,
        interface_index: Option<u32>,
    ) -> Result<Option<ConnectionProfile>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .profiles
            .iter()
            .find(|p| {
                p.name == name
                    && interface_index.is_none_or(|i| p.interface_indexes.contains(&i))
            })
            .cloned())
    }

    async fn profile_name_by_guid(&self, guid: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .guids
            .iter()
            .find(|(_, g)| g.eq_ignore_ascii_case(guid))
            .map(|(name, _)| name.clone()))
    }

    async fn profile_guid_by_name(&self, name: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().guids.get(name).cloned())
    }

    async fn gateway_routes(
        &self,
        family: AddressFamily,
        next_hop: Option<&str>,
    ) -> Result<Vec<GatewayRoute>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .routes
            .iter()
            .filter(|r| r.address_family == family)
            .filter(|r| next_hop.is_none_or(|hop| r.next_hop == hop))
            .cloned()
            .collect())
    }

    async fn adapter_binding(&self, interface_alias: &str, component_id: &str) -> Result<Option<bool>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bindings
            .get(&(interface_alias.to_string(), component_id.to_string()))
            .copied())
    }

    async fn set_adapter_binding(
        &self,
        interface_alias: &str,
        component_id: &str,
        enabled: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .bindings
            .insert((interface_alias.to_string(), component_id.to_string()), enabled);
        state
            .changes
            .push(format!("binding {} {} {}", interface_alias, component_id, enabled));
        Ok(())
    }

    async fn route_is_persistent(&self, _route: &GatewayRoute) -> Result<bool> {
        Ok(self.state.lock().unwrap().persistent)
    }

    async fn dhcp_enabled(&self, _interface_index: u32, _family: AddressFamily) -> Result<bool> {
        Ok(self.state.lock().unwrap().dhcp)
    }

    async fn remove_route(&self, route: &GatewayRoute) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.routes.retain(|r| r != route);
        if let Some(name) = state.served.get(&route.next_hop).cloned() {
            if let Some(names) = state.names.get_mut(&route.interface_index) {
                names.retain(|n| *n != name);
            }
        }
        state.changes.push(format!("remove {}", route.next_hop));
        Ok(())
    }

    async fn add_route(&self, route: &GatewayRoute) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.routes.push(route.clone());
        if let Some(name) = state.served.get(&route.next_hop).cloned() {
            state.names.entry(route.interface_index).or_default().push(name);
        }
        state.changes.push(format!("add {}", route.next_hop));
        Ok(())
    }

    async fn route_exists(&self, route: &GatewayRoute) -> Result<bool> {
        Ok(self.state.lock().unwrap().routes.contains(route))
    }

    async fn cycle_dhcp(&self, interface_index: u32, _family: AddressFamily) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .changes
            .push(format!("cycle dhcp {}", interface_index));
        Ok(())
    }

    async fn interface_connected(&self, _interface_index: u32, _family: AddressFamily) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.connectivity_checks += 1;
        Ok(!state.offline)
    }

    async fn session_interface(&self) -> Result<Option<u32>> {
        Ok(self.state.lock().unwrap().session_interface)
    }
}

/// A clock that records delays and returns immediately
#[derive(Default)]
pub struct ManualClock {
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// A default route
pub fn route(index: u32, family: AddressFamily, next_hop: &str) -> GatewayRoute {
    GatewayRoute {
        interface_index: index,
        interface_alias: format!("Ethernet{}", index),
        address_family: family,
        destination_prefix: family.default_prefix().to_string(),
        next_hop: next_hop.to_string(),
    }
}

/// A connection profile over `indexes`
pub fn profile(name: &str, indexes: &[u32], category: &str) -> ConnectionProfile {
    ConnectionProfile {
        name: name.to_string(),
        interface_indexes: indexes.to_vec(),
        network_category: category.to_string(),
        ipv4_connectivity: "Internet".to_string(),
        ipv6_connectivity: "NoTraffic".to_string(),
    }
}
