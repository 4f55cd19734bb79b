// Bounded-retry resolver over a HostProbe and a Clock

use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::probe::{AddressFamily, Clock, ConnectionProfile, GatewayRoute, HostProbe};
use crate::config::ResolverConfig;
use crate::error::{Error, Result};

/// Outcome of the passive gateway analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayMatch {
    /// Exactly one next hop serves every interface of the profile
    Unique(String),
    /// Several next hops qualify
    Ambiguous,
    /// No next hop qualifies, or the interfaces do not share exactly one profile
    None,
}

impl GatewayMatch {
    pub fn address(self) -> Option<String> {
        match self {
            GatewayMatch::Unique(address) => Some(address),
            _ => None,
        }
    }
}

/// Phase of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverPhase {
    Probing,
    Disabling,
    Observing,
    Restoring,
    Reconnected,
    TimedOut,
}

/// Phase change reported by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEvent {
    pub phase: ResolverPhase,
    pub interface_index: u32,
    pub family: AddressFamily,
}

/// Result of waiting for an interface to come back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Reconnected,
    TimedOut,
}

/// Gateway / connection-profile resolver
pub struct GatewayResolver<'a> {
    probe: &'a dyn HostProbe,
    clock: &'a dyn Clock,
    config: &'a ResolverConfig,
    events: Option<&'a mpsc::Sender<ResolverEvent>>,
}

impl<'a> GatewayResolver<'a> {
    pub fn new(probe: &'a dyn HostProbe, clock: &'a dyn Clock, config: &'a ResolverConfig) -> Self {
        Self {
            probe,
            clock,
            config,
            events: None,
        }
    }

    /// Report phase changes on `tx`
    pub fn with_events(mut self, tx: Option<&'a mpsc::Sender<ResolverEvent>>) -> Self {
        self.events = tx;
        self
    }

    pub fn probe(&self) -> &dyn HostProbe {
        self.probe
    }

    fn emit(&self, phase: ResolverPhase, interface_index: u32, family: AddressFamily) {
        info!(?phase, interface_index, %family, "gateway resolver");
        if let Some(tx) = self.events {
            if tx
                .try_send(ResolverEvent {
                    phase,
                    interface_index,
                    family,
                })
                .is_err()
            {
                warn!("Resolver event channel full or closed, dropping event");
            }
        }
    }

    /// Sorted, de-duplicated profile names of an interface
    async fn profile_names(&self, interface_index: u32) -> Result<Vec<String>> {
        let mut names = self.probe.profile_names(interface_index).await?;
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Find the gateway of `profile` among `routes` without touching the host
    ///
    /// The interfaces of the profile must share exactly one profile name; a
    /// next hop qualifies when it has a route on every one of them.
    pub async fn find_gateway_address(
        &self,
        routes: &[GatewayRoute],
        profile: &ConnectionProfile,
    ) -> Result<GatewayMatch> {
        let indexes: BTreeSet<u32> = profile.interface_indexes.iter().copied().collect();
        let Some(&first) = indexes.iter().next() else {
            return Ok(GatewayMatch::None);
        };
        if let Some(route) = routes.first() {
            self.emit(ResolverPhase::Probing, first, route.address_family);
        }

        let mut common = self.profile_names(first).await?;
        for index in indexes.iter().skip(1) {
            let names = self.profile_names(*index).await?;
            common.retain(|name| names.contains(name));
        }
        if common.len() != 1 {
            debug!(profile = %profile.name, shared = common.len(), "interfaces do not share exactly one profile");
            return Ok(GatewayMatch::None);
        }

        let relevant: Vec<&GatewayRoute> = routes
            .iter()
            .filter(|route| indexes.contains(&route.interface_index))
            .collect();
        let next_hops: BTreeSet<&str> = relevant.iter().map(|route| route.next_hop.as_str()).collect();

        let mut found = GatewayMatch::None;
        for next_hop in next_hops {
            let covered: BTreeSet<u32> = relevant
                .iter()
                .filter(|route| route.next_hop == next_hop)
                .map(|route| route.interface_index)
                .collect();
            if covered == indexes {
                found = match found {
                    GatewayMatch::None => GatewayMatch::Unique(next_hop.to_string()),
                    _ => GatewayMatch::Ambiguous,
                };
            }
        }
        Ok(found)
    }

    /// Find the gateway of `profile` by walking `routes` and disconnecting
    /// where needed
    pub async fn find_gateway_address_with_disconnections(
        &self,
        routes: &[GatewayRoute],
        profile: &ConnectionProfile,
    ) -> Result<Option<String>> {
        let Some(first) = routes.first() else {
            return Ok(None);
        };
        self.ensure_session_survives(first).await?;

        let disabled = self.disable_other_binding(first).await?;
        let walked = self.walk_routes(routes, profile).await;
        if disabled {
            self.restore_other_binding(first).await?;
        }
        walked
    }

    async fn walk_routes(
        &self,
        routes: &[GatewayRoute],
        profile: &ConnectionProfile,
    ) -> Result<Option<String>> {
        for route in routes {
            let names = self.profile_names(route.interface_index).await?;
            let name = if names.len() == 1 {
                names.into_iter().next()
            } else {
                self.find_connection_profile_with_disconnections(route).await?
            };
            if name.as_deref() == Some(profile.name.as_str()) {
                return Ok(Some(route.next_hop.clone()));
            }
        }
        Ok(None)
    }

    /// Find the profile served by `route` by removing it and seeing which
    /// profile disappears
    pub async fn find_connection_profile_with_disconnections(
        &self,
        route: &GatewayRoute,
    ) -> Result<Option<String>> {
        self.ensure_session_survives(route).await?;
        let disabled = self.disable_other_binding(route).await?;
        let observed = self.observe_route_removal(route).await;
        if disabled {
            self.restore_other_binding(route).await?;
        }
        observed
    }

    async fn observe_route_removal(&self, route: &GatewayRoute) -> Result<Option<String>> {
        let names = self.profile_names(route.interface_index).await?;
        if names.len() == 1 {
            return Ok(names.into_iter().next());
        }

        let manual = self.probe.route_is_persistent(route).await?;
        let dhcp = self
            .probe
            .dhcp_enabled(route.interface_index, route.address_family)
            .await?;

        self.emit(ResolverPhase::Observing, route.interface_index, route.address_family);
        let remaining = self
            .probe
            .observe_without_route(route, manual, self.config.net_route_timeout(), self.clock)
            .await;

        // The observation re-adds a manual route itself
        self.emit(ResolverPhase::Restoring, route.interface_index, route.address_family);
        let restored = if !manual && dhcp {
            self.wait_for_dhcp_route(route).await.map(|_| ())
        } else {
            Ok(())
        };

        let remaining = remaining.inspect_err(|e| {
            warn!(
                interface_index = route.interface_index,
                next_hop = %route.next_hop,
                "observation failed, route restored: {}",
                e
            )
        })?;
        restored?;
        Ok(names.into_iter().find(|name| !remaining.contains(name)))
    }

    /// Refuse to disconnect the interface the remote session runs through
    async fn ensure_session_survives(&self, route: &GatewayRoute) -> Result<()> {
        if self.probe.session_interface().await? == Some(route.interface_index) {
            return Err(Error::validation(format!(
                "allow_disconnect would cut the remote session running through interface '{}'",
                route.interface_alias
            )));
        }
        Ok(())
    }

    /// Poll until DHCP put the route back, cycling DHCP periodically
    async fn wait_for_dhcp_route(&self, route: &GatewayRoute) -> Result<bool> {
        let mut retries = self.config.dhcp_max_retries.max(1);
        loop {
            if self.config.dhcp_cycle_every != 0 && retries % self.config.dhcp_cycle_every == 0 {
                self.probe
                    .cycle_dhcp(route.interface_index, route.address_family)
                    .await?;
            }

            self.clock.sleep(self.config.dhcp_timeout()).await;
            if self.probe.route_exists(route).await? {
                return Ok(true);
            }

            retries -= 1;
            if retries == 0 {
                warn!(
                    interface_index = route.interface_index,
                    next_hop = %route.next_hop,
                    "DHCP did not restore the gateway route"
                );
                return Ok(false);
            }
        }
    }

    /// Disable the binding of the family `route` does not use
    ///
    /// Returns whether it was enabled (and is now disabled).
    async fn disable_other_binding(&self, route: &GatewayRoute) -> Result<bool> {
        let component_id = route.address_family.other().component_id();
        let enabled = self
            .probe
            .adapter_binding(&route.interface_alias, component_id)
            .await?;
        if enabled != Some(true) {
            return Ok(false);
        }

        self.emit(ResolverPhase::Disabling, route.interface_index, route.address_family.other());
        self.probe
            .set_adapter_binding(&route.interface_alias, component_id, false)
            .await?;
        Ok(true)
    }

    async fn restore_other_binding(&self, route: &GatewayRoute) -> Result<ReconnectOutcome> {
        let family = route.address_family.other();
        self.emit(ResolverPhase::Restoring, route.interface_index, family);
        self.probe
            .set_adapter_binding(&route.interface_alias, family.component_id(), true)
            .await?;
        self.wait_for_reconnect(route.interface_index, family).await
    }

    /// Poll until the interface reports `Connected`, then wait for connectivity
    pub async fn wait_for_reconnect(
        &self,
        interface_index: u32,
        family: AddressFamily,
    ) -> Result<ReconnectOutcome> {
        let mut outcome = ReconnectOutcome::TimedOut;
        for _ in 0..self.config.network_max_retries.max(1) {
            self.clock.sleep(self.config.network_timeout()).await;
            if self.probe.interface_connected(interface_index, family).await? {
                outcome = ReconnectOutcome::Reconnected;
                break;
            }
        }
        self.clock.sleep(self.config.connectivity_timeout()).await;

        match outcome {
            ReconnectOutcome::Reconnected => {
                self.emit(ResolverPhase::Reconnected, interface_index, family)
            }
            ReconnectOutcome::TimedOut => {
                warn!(interface_index, %family, "interface did not reconnect in time");
                self.emit(ResolverPhase::TimedOut, interface_index, family)
            }
        }
        Ok(outcome)
    }

    /// Profile reached through a gateway address
    ///
    /// Uses the first default route through `address`. When its interface
    /// carries several profiles, disconnecting is the only way to tell them
    /// apart.
    pub async fn profile_for_gateway(
        &self,
        family: AddressFamily,
        address: &str,
        allow_disconnect: bool,
    ) -> Result<Option<ConnectionProfile>> {
        let routes = self.probe.gateway_routes(family, Some(address)).await?;
        let Some(route) = routes.first() else {
            return Ok(None);
        };

        let names = self.profile_names(route.interface_index).await?;
        let name = if names.len() == 1 {
            names.into_iter().next()
        } else if !allow_disconnect {
            debug!(%address, profiles = names.len(), "gateway serves several profiles");
            None
        } else {
            self.find_connection_profile_with_disconnections(route).await?
        };

        match name {
            Some(name) => {
                self.probe
                    .profile_by_name(&name, Some(route.interface_index))
                    .await
            }
            None => Ok(None),
        }
    }

    /// Gateway of `profile` for one family, or an empty string
    ///
    /// Without `allow_disconnect` an inconclusive analysis yields an empty
    /// string rather than an error.
    pub async fn gateway_for_profile(
        &self,
        family: AddressFamily,
        profile: &ConnectionProfile,
        allow_disconnect: bool,
    ) -> Result<String> {
        let routes = self.probe.gateway_routes(family, None).await?;
        if let GatewayMatch::Unique(address) = self.find_gateway_address(&routes, profile).await? {
            return Ok(address);
        }
        if !allow_disconnect {
            return Ok(String::new());
        }
        Ok(self
            .find_gateway_address_with_disconnections(&routes, profile)
            .await?
            .unwrap_or_default())
    }
}
