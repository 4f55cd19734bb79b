//! Network adapters (`Get-NetAdapter`)

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ScriptTemplate, WindowsClient, ps_json};
use crate::error::{Error, ObjectKind, Result};

/// Identifiers of a network adapter
///
/// Precedence: GUID, name, old name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkAdapterQuery {
    #[serde(rename = "GUID")]
    pub guid: String,
    pub name: String,
    pub old_name: String,
}

impl NetworkAdapterQuery {
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

    /// Identifier that wins the precedence, if any
    pub fn selector(&self) -> Option<&str> {
        [&self.guid, &self.name, &self.old_name]
            .into_iter()
            .find(|v| !v.is_empty())
            .map(String::as_str)
    }

    /// Copy of the query holding only the winning identifier
    pub fn narrowed(&self) -> Result<Self> {
        if !self.guid.is_empty() {
            Ok(Self::by_guid(self.guid.clone()))
        } else if !self.name.is_empty() {
            Ok(Self::by_name(self.name.clone()))
        } else if !self.old_name.is_empty() {
            Ok(Self {
                old_name: self.old_name.clone(),
                ..Self::default()
            })
        } else {
            Err(Error::validation("empty network_adapter query"))
        }
    }
}

/// Properties of a network adapter as read from the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkAdapterProperties {
    #[serde(rename = "GUID")]
    pub guid: String,
    pub name: String,
    #[serde(rename = "MACAddress")]
    pub mac_address: String,
    #[serde(rename = "PermanentMACAddress")]
    pub permanent_mac_address: String,
    /// `None` when the adapter is not a DNS client
    #[serde(rename = "DNSClient")]
    pub dns_client: Option<AdapterDnsClient>,
    pub admin_status: String,
    pub operational_status: String,
    pub connection_status: String,
    pub connection_speed: String,
    pub is_physical: bool,
}

/// Per-adapter DNS registration settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdapterDnsClient {
    pub register_connection_address: bool,
    /// Empty when the connection suffix is not used for registration
    pub register_connection_suffix: String,
}

/// Changes to apply to a network adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkAdapterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    /// Setting the permanent address removes the override
    #[serde(rename = "MACAddress", skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(rename = "DNSClient", skip_serializing_if = "Option::is_none")]
    pub dns_client: Option<AdapterDnsClientPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdapterDnsClientPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_connection_address: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_connection_suffix: Option<String>,
}

impl NetworkAdapterPatch {
    pub fn is_empty(&self) -> bool {
        self.new_name.is_none() && self.mac_address.is_none() && self.dns_client.is_none()
    }
}

impl From<&AdapterDnsClient> for AdapterDnsClientPatch {
    fn from(dns: &AdapterDnsClient) -> Self {
        Self {
            register_connection_address: Some(dns.register_connection_address),
            register_connection_suffix: Some(dns.register_connection_suffix.clone()),
        }
    }
}

impl NetworkAdapterProperties {
    /// Patch that writes back every writable property as read
    pub fn to_patch(&self) -> NetworkAdapterPatch {
        NetworkAdapterPatch {
            new_name: Some(self.name.clone()),
            mac_address: Some(self.mac_address.clone()),
            dns_client: self.dns_client.as_ref().map(Into::into),
        }
    }
}

impl WindowsClient {
    /// Read a network adapter
    pub async fn read_network_adapter(
        &self,
        query: &NetworkAdapterQuery,
    ) -> Result<NetworkAdapterProperties> {
        let narrowed = query.narrowed()?;
        let script = READ_NETWORK_ADAPTER.render_json(&narrowed)?;
        let properties: NetworkAdapterProperties = self.run_json(&script).await?;
        info!(
            kind = %ObjectKind::NetworkAdapter,
            id = narrowed.selector().unwrap_or_default(),
            guid = %properties.guid,
            "read network adapter"
        );
        Ok(properties)
    }

    /// Apply a patch to the network adapter identified by `query.guid`
    pub async fn update_network_adapter(
        &self,
        query: &NetworkAdapterQuery,
        patch: &NetworkAdapterPatch,
    ) -> Result<()> {
        if query.guid.is_empty() {
            return Err(Error::validation("missing network_adapter GUID for update"));
        }
        let script = UPDATE_NETWORK_ADAPTER.render(&[
            ("query", ps_json(&NetworkAdapterQuery::by_guid(query.guid.clone()))?),
            ("patch", ps_json(patch)?),
        ]);
        self.run_unit(&script).await?;
        info!(kind = %ObjectKind::NetworkAdapter, id = %query.guid, "updated network adapter");
        Ok(())
    }
}

const READ_NETWORK_ADAPTER: ScriptTemplate = ScriptTemplate::new(
    "readNetworkAdapter",
    r#"
$naQuery = ConvertFrom-Json -InputObject '{{args}}'

if ( $naQuery.GUID ) {
    $id = $naQuery.GUID
    $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InstanceID -eq "{$id}" } )
}
elseif ( $naQuery.Name ) {
    $id = $naQuery.Name
    $networkAdapter = @( Get-NetAdapter -Name $id -ErrorAction 'Ignore' )
}
elseif ( $naQuery.OldName ) {
    $id = $naQuery.OldName
    $networkAdapter = @( Get-NetAdapter -Name $id -ErrorAction 'Ignore' )
}
if ( $networkAdapter.Count -eq 0 ) {
    throw "cannot find network_adapter '$id'"
}
if ( $networkAdapter.Count -gt 1 ) {
    throw "found multiple network_adapter '$id'"
}
$networkAdapter = $networkAdapter[0]

$dnsClient = $null
$settings = Get-DnsClient -InterfaceIndex $networkAdapter.InterfaceIndex -ErrorAction 'Ignore'
if ( $settings ) {
    $dnsClient = @{
        RegisterConnectionAddress = [bool]$settings.RegisterThisConnectionsAddress
        RegisterConnectionSuffix  = if ( $settings.UseSuffixWhenRegistering ) { [string]$settings.ConnectionSpecificSuffix } else { "" }
    }
}

$naProperties = @{
    GUID                = $networkAdapter.InstanceID.Trim("{}")
    Name                = $networkAdapter.Name
    MACAddress          = $networkAdapter.MacAddress
    PermanentMACAddress = $networkAdapter.PermanentAddress -replace '..(?!$)', '$&-'
    DNSClient           = $dnsClient
    AdminStatus         = $networkAdapter.AdminStatus.ToString()
    OperationalStatus   = $networkAdapter.ifOperStatus.ToString()
    ConnectionStatus    = $networkAdapter.MediaConnectionState.ToString()
    ConnectionSpeed     = $networkAdapter.LinkSpeed.ToString()
    IsPhysical          = [bool]$networkAdapter.ConnectorPresent
}

Write-Output $( ConvertTo-Json -InputObject $naProperties -Depth 100 )
"#,
);

const UPDATE_NETWORK_ADAPTER: ScriptTemplate = ScriptTemplate::new(
    "updateNetworkAdapter",
    r#"
$naQuery = ConvertFrom-Json -InputObject '{{query}}'
$guid = $naQuery.GUID

$networkAdapter = Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InstanceID -eq "{$guid}" }
if ( -not $networkAdapter ) {
    throw "cannot find network_adapter '$guid'"
}

$naPatch = ConvertFrom-Json -InputObject '{{patch}}'

if ( $null -ne $naPatch.DNSClient ) {
    $settings = Get-DnsClient -InterfaceIndex $networkAdapter.InterfaceIndex -ErrorAction 'Ignore'
    if ( -not $settings ) {
        throw "cannot set 'dns_client'-properties for network_adapter '$guid', network_adapter is not a dns_client"
    }
}

if ( ( $null -ne $naPatch.NewName ) -and ( $naPatch.NewName -ne "" ) -and ( $naPatch.NewName -ne $networkAdapter.Name ) ) {
    Rename-NetAdapter -InputObject $networkAdapter -NewName $naPatch.NewName -Confirm:$false | Out-Null
    $networkAdapter = Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InstanceID -eq "{$guid}" }
}

if ( ( $null -ne $naPatch.MACAddress ) -and ( $naPatch.MACAddress -ne $networkAdapter.MacAddress ) ) {
    if ( ( $naPatch.MACAddress -eq "" ) -or ( $naPatch.MACAddress -eq ( $networkAdapter.PermanentAddress -replace '..(?!$)', '$&-' ) ) ) {
        Set-NetAdapter -InputObject $networkAdapter -MacAddress "" -Confirm:$false | Out-Null
    }
    else {
        Set-NetAdapter -InputObject $networkAdapter -MacAddress $naPatch.MACAddress -Confirm:$false | Out-Null
    }
}

if ( $null -ne $naPatch.DNSClient ) {
    $arguments = @{}
    if ( $null -ne $naPatch.DNSClient.RegisterConnectionAddress ) {
        $arguments.RegisterThisConnectionsAddress = [bool]$naPatch.DNSClient.RegisterConnectionAddress
    }
    if ( $null -ne $naPatch.DNSClient.RegisterConnectionSuffix ) {
        $arguments.UseSuffixWhenRegistering = ( $naPatch.DNSClient.RegisterConnectionSuffix -ne "" )
        $arguments.ConnectionSpecificSuffix = $naPatch.DNSClient.RegisterConnectionSuffix
    }
    if ( $arguments.Count -gt 0 ) {
        Set-DnsClient -InterfaceIndex $networkAdapter.InterfaceIndex @arguments -Confirm:$false | Out-Null
    }
}
"#,
);
