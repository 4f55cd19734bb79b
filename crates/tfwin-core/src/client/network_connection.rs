//! Network connection profiles (`Get-NetConnectionProfile`)
//!
//! Reads are resolved in Rust by the [`GatewayResolver`] on top of small probe
//! scripts, all run while the client lock is held.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::probe::ScriptHostProbe;
use super::{ScriptTemplate, WindowsClient, ps_json};
use crate::error::{Error, ObjectKind, Result};
use crate::gateway::{AddressFamily, ConnectionProfile, GatewayResolver};

/// Identifiers of a network connection
///
/// Precedence: GUID, IPv4 gateway, IPv6 gateway, name, old name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkConnectionQuery {
    #[serde(rename = "GUID")]
    pub guid: String,
    #[serde(rename = "IPv4GatewayAddress")]
    pub ipv4_gateway_address: String,
    #[serde(rename = "IPv6GatewayAddress")]
    pub ipv6_gateway_address: String,
    pub name: String,
    pub old_name: String,
    /// Allow temporary disconnections while resolving gateways
    pub allow_disconnect: bool,
}

impl NetworkConnectionQuery {
    pub fn by_guid(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn selector(&self) -> Option<&str> {
        [
            &self.guid,
            &self.ipv4_gateway_address,
            &self.ipv6_gateway_address,
            &self.name,
            &self.old_name,
        ]
        .into_iter()
        .find(|v| !v.is_empty())
        .map(String::as_str)
    }

    /// Copy of the query holding only the winning identifier and `allow_disconnect`
    pub fn narrowed(&self) -> Result<Self> {
        let mut narrowed = Self {
            allow_disconnect: self.allow_disconnect,
            ..Self::default()
        };
        if !self.guid.is_empty() {
            narrowed.guid = self.guid.clone();
        } else if !self.ipv4_gateway_address.is_empty() {
            narrowed.ipv4_gateway_address = self.ipv4_gateway_address.clone();
        } else if !self.ipv6_gateway_address.is_empty() {
            narrowed.ipv6_gateway_address = self.ipv6_gateway_address.clone();
        } else if !self.name.is_empty() {
            narrowed.name = self.name.clone();
        } else if !self.old_name.is_empty() {
            narrowed.old_name = self.old_name.clone();
        } else {
            return Err(Error::validation("empty network_connection query"));
        }
        Ok(narrowed)
    }
}

/// Properties of a network connection as read from the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkConnectionProperties {
    #[serde(rename = "GUID")]
    pub guid: String,
    /// Empty when the gateway cannot be determined
    #[serde(rename = "IPv4GatewayAddress")]
    pub ipv4_gateway_address: String,
    #[serde(rename = "IPv6GatewayAddress")]
    pub ipv6_gateway_address: String,
    pub name: String,
    /// `Public`, `Private` or `DomainAuthenticated`
    pub connection_profile: String,
    #[serde(rename = "IPv4Connectivity")]
    pub ipv4_connectivity: String,
    #[serde(rename = "IPv6Connectivity")]
    pub ipv6_connectivity: String,
}

/// Changes to apply to a network connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkConnectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_profile: Option<String>,
}

impl NetworkConnectionPatch {
    pub fn is_empty(&self) -> bool {
        self.new_name.is_none() && self.connection_profile.is_none()
    }
}

impl NetworkConnectionProperties {
    /// Patch that writes back every writable property as read
    pub fn to_patch(&self) -> NetworkConnectionPatch {
        NetworkConnectionPatch {
            new_name: Some(self.name.clone()),
            connection_profile: Some(self.connection_profile.clone()),
        }
    }
}

/// Resolve a network connection through `resolver`
///
/// `query` is expected to be narrowed already.
pub async fn resolve_network_connection(
    resolver: &GatewayResolver<'_>,
    query: &NetworkConnectionQuery,
) -> Result<NetworkConnectionProperties> {
    let probe = resolver.probe();
    let allow = query.allow_disconnect;

    let (id, profile): (&str, Option<ConnectionProfile>) = if !query.guid.is_empty() {
        let profile = match probe.profile_name_by_guid(&query.guid).await? {
            Some(name) if !name.is_empty() => probe.profile_by_name(&name, None).await?,
            _ => None,
        };
        (query.guid.as_str(), profile)
    } else if !query.ipv4_gateway_address.is_empty() {
        let address = query.ipv4_gateway_address.as_str();
        (
            address,
            resolver
                .profile_for_gateway(AddressFamily::IPv4, address, allow)
                .await?,
        )
    } else if !query.ipv6_gateway_address.is_empty() {
        let address = query.ipv6_gateway_address.as_str();
        (
            address,
            resolver
                .profile_for_gateway(AddressFamily::IPv6, address, allow)
                .await?,
        )
    } else if !query.name.is_empty() {
        (query.name.as_str(), probe.profile_by_name(&query.name, None).await?)
    } else if !query.old_name.is_empty() {
        (query.old_name.as_str(), probe.profile_by_name(&query.old_name, None).await?)
    } else {
        return Err(Error::validation("empty network_connection query"));
    };

    let profile = profile.ok_or_else(|| Error::not_found(ObjectKind::NetworkConnection, id))?;

    let guid = if query.guid.is_empty() {
        probe
            .profile_guid_by_name(&profile.name)
            .await?
            .unwrap_or_default()
    } else {
        query.guid.clone()
    };

    let ipv4_gateway_address = if query.ipv4_gateway_address.is_empty() {
        resolver
            .gateway_for_profile(AddressFamily::IPv4, &profile, allow)
            .await?
    } else {
        query.ipv4_gateway_address.clone()
    };

    let ipv6_gateway_address = if query.ipv6_gateway_address.is_empty() {
        resolver
            .gateway_for_profile(AddressFamily::IPv6, &profile, allow)
            .await?
    } else {
        query.ipv6_gateway_address.clone()
    };

    Ok(NetworkConnectionProperties {
        guid,
        ipv4_gateway_address,
        ipv6_gateway_address,
        name: profile.name,
        connection_profile: profile.network_category,
        ipv4_connectivity: profile.ipv4_connectivity,
        ipv6_connectivity: profile.ipv6_connectivity,
    })
}

impl WindowsClient {
    /// Read a network connection
    pub async fn read_network_connection(
        &self,
        query: &NetworkConnectionQuery,
    ) -> Result<NetworkConnectionProperties> {
        let narrowed = query.narrowed()?;

        let properties = {
            let _guard = self.lock().await;
            let probe = ScriptHostProbe::new(self);
            let resolver = GatewayResolver::new(&probe, self.clock(), self.resolver_config())
                .with_events(self.resolver_events());
            resolve_network_connection(&resolver, &narrowed).await?
        };

        info!(
            kind = %ObjectKind::NetworkConnection,
            id = narrowed.selector().unwrap_or_default(),
            guid = %properties.guid,
            "read network connection"
        );
        Ok(properties)
    }

    /// Apply a patch to the network connection identified by `query.guid`
    pub async fn update_network_connection(
        &self,
        query: &NetworkConnectionQuery,
        patch: &NetworkConnectionPatch,
    ) -> Result<()> {
        if query.guid.is_empty() {
            return Err(Error::validation("missing network_connection GUID for update"));
        }
        let script = UPDATE_NETWORK_CONNECTION.render(&[
            ("query", ps_json(&NetworkConnectionQuery::by_guid(query.guid.clone()))?),
            ("patch", ps_json(patch)?),
        ]);
        self.run_unit(&script).await?;
        info!(kind = %ObjectKind::NetworkConnection, id = %query.guid, "updated network connection");
        Ok(())
    }
}

const UPDATE_NETWORK_CONNECTION: ScriptTemplate = ScriptTemplate::new(
    "updateNetworkConnection",
    r#"
$ncQuery = ConvertFrom-Json -InputObject '{{query}}'
$guid = $ncQuery.GUID

$networkConnectionProfile = $null
$registryProfile = Get-Item -Path "HKLM:\SOFTWARE\Microsoft\Windows NT\CurrentVersion\NetworkList\Profiles\{$guid}" -ErrorAction Ignore
if ( $registryProfile ) {
    $n = ( Get-ItemProperty -Path $registryProfile.PSPath -Name 'ProfileName' -ErrorAction Ignore ).ProfileName
    if ( $n ) {
        $networkConnectionProfile = Get-NetConnectionProfile -Name $n -ErrorAction 'Ignore'
    }
}
if ( -not $networkConnectionProfile ) {
    throw "cannot find network_connection '$guid'"
}

$ncPatch = ConvertFrom-Json -InputObject '{{patch}}'

if ( ( $null -ne $ncPatch.NewName ) -and ( $ncPatch.NewName -ne "" ) -and ( $ncPatch.NewName -ne @( $networkConnectionProfile )[0].Name ) ) {
    Set-ItemProperty -Path $registryProfile.PSPath -Name 'ProfileName' -Value $ncPatch.NewName
    $networkConnectionProfile = Get-NetConnectionProfile -Name $ncPatch.NewName -ErrorAction 'Ignore'
}

if ( ( $null -ne $ncPatch.ConnectionProfile ) -and ( $ncPatch.ConnectionProfile -ne "" ) ) {
    $networkConnectionProfile | foreach {
        Set-NetConnectionProfile -InputObject $_ -NetworkCategory $ncPatch.ConnectionProfile -Confirm:$false | Out-Null
    }
}
"#,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_allow_disconnect_survives_narrowing() {
        let query = NetworkConnectionQuery {
            guid: "".to_string(),
            ipv4_gateway_address: "".to_string(),
            ipv6_gateway_address: "FE80::1".to_string(),
            name: "corp.local".to_string(),
            old_name: "Network 2".to_string(),
            allow_disconnect: true,
        };
        assert_eq!(query.selector(), Some("FE80::1"));

        let narrowed = query.narrowed().unwrap();
        assert_eq!(narrowed.ipv6_gateway_address, "FE80::1");
        assert!(narrowed.name.is_empty());
        assert!(narrowed.allow_disconnect);
    }

    #[test]
    fn test_only_allow_disconnect_is_still_empty() {
        let query = NetworkConnectionQuery {
            allow_disconnect: true,
            ..NetworkConnectionQuery::default()
        };
        assert!(matches!(query.narrowed(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_wire_names() {
        let properties = NetworkConnectionProperties {
            ipv4_gateway_address: "10.0.0.1".to_string(),
            ..NetworkConnectionProperties::default()
        };
        let value = serde_json::to_value(&properties).unwrap();
        assert_eq!(value["IPv4GatewayAddress"], "10.0.0.1");
        assert!(value.get("IPv6Connectivity").is_some());
    }
}
