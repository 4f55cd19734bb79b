// Host access and time seams of the gateway resolver

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// IP address family of a route or interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    IPv4,
    IPv6,
}

impl AddressFamily {
    /// Destination prefix of the default route
    pub fn default_prefix(&self) -> &'static str {
        match self {
            AddressFamily::IPv4 => "0.0.0.0/0",
            AddressFamily::IPv6 => "::/0",
        }
    }

    pub fn other(&self) -> AddressFamily {
        match self {
            AddressFamily::IPv4 => AddressFamily::IPv6,
            AddressFamily::IPv6 => AddressFamily::IPv4,
        }
    }

    /// Adapter binding component of this family
    pub fn component_id(&self) -> &'static str {
        match self {
            AddressFamily::IPv4 => "ms_tcpip",
            AddressFamily::IPv6 => "ms_tcpip6",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::IPv4 => "IPv4",
            AddressFamily::IPv6 => "IPv6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A default route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayRoute {
    pub interface_index: u32,
    pub interface_alias: String,
    pub address_family: AddressFamily,
    pub destination_prefix: String,
    pub next_hop: String,
}

/// A network connection profile
///
/// A profile spans every interface it is connected through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ConnectionProfile {
    pub name: String,
    pub interface_indexes: Vec<u32>,
    pub network_category: String,
    #[serde(rename = "IPv4Connectivity")]
    pub ipv4_connectivity: String,
    #[serde(rename = "IPv6Connectivity")]
    pub ipv6_connectivity: String,
}

/// Host operations the resolver needs
///
/// Each method maps to one small script in production.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Names of the profiles connected through an interface
    async fn profile_names(&self, interface_index: u32) -> Result<Vec<String>>;

    /// Profile by name, optionally restricted to one interface
    async fn profile_by_name(
        &self,
        name: &str,
        interface_index: Option<u32>,
    ) -> Result<Option<ConnectionProfile>>;

    /// Profile name stored in the registry under a profile GUID
    async fn profile_name_by_guid(&self, guid: &str) -> Result<Option<String>>;

    /// Registry GUID of a profile name
    async fn profile_guid_by_name(&self, name: &str) -> Result<Option<String>>;

    /// Default routes of a family, optionally only those through `next_hop`
    async fn gateway_routes(
        &self,
        family: AddressFamily,
        next_hop: Option<&str>,
    ) -> Result<Vec<GatewayRoute>>;

    /// Whether a binding component is enabled; `None` when the adapter has no such binding
    async fn adapter_binding(&self, interface_alias: &str, component_id: &str)
    -> Result<Option<bool>>;

    async fn set_adapter_binding(
        &self,
        interface_alias: &str,
        component_id: &str,
        enabled: bool,
    ) -> Result<()>;

    /// Whether the route was added manually (lives in the persistent store)
    async fn route_is_persistent(&self, route: &GatewayRoute) -> Result<bool>;

    /// Whether DHCP is enabled for the route's interface and family
    async fn dhcp_enabled(&self, interface_index: u32, family: AddressFamily) -> Result<bool>;

    async fn remove_route(&self, route: &GatewayRoute) -> Result<()>;

    async fn add_route(&self, route: &GatewayRoute) -> Result<()>;

    /// Remove `route`, let `settle` pass and report the profile names left on
    /// its interface
    ///
    /// With `re_add`, the route is put back before returning even when the
    /// observation fails. The default composes the single steps and waits on
    /// `clock`. Script-backed implementations run the whole exchange in one
    /// host-side script.
    async fn observe_without_route(
        &self,
        route: &GatewayRoute,
        re_add: bool,
        settle: Duration,
        clock: &dyn Clock,
    ) -> Result<Vec<String>> {
        self.remove_route(route).await?;
        clock.sleep(settle).await;
        let observed = self.profile_names(route.interface_index).await;
        let restored = if re_add { self.add_route(route).await } else { Ok(()) };
        let names = observed?;
        restored?;
        Ok(names)
    }

    /// Interface carrying the remote session scripts run in, if any
    async fn session_interface(&self) -> Result<Option<u32>> {
        Ok(None)
    }

    async fn route_exists(&self, route: &GatewayRoute) -> Result<bool>;

    /// Disable then re-enable DHCP on an interface
    async fn cycle_dhcp(&self, interface_index: u32, family: AddressFamily) -> Result<()>;

    /// Whether the interface reports `Connected` for a family
    async fn interface_connected(&self, interface_index: u32, family: AddressFamily)
    -> Result<bool>;
}

/// Source of delays
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock delays through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
