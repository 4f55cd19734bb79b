//! Network interfaces: an adapter seen through its interface identifiers
//!
//! Network interfaces and link IP interfaces share their query and
//! properties; they differ in identifier precedence and in the kind reported
//! in errors.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ScriptTemplate, WindowsClient};
use crate::error::{Error, ObjectKind, Result};

/// Identifiers of an interface
///
/// `index == 0` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InterfaceQuery {
    #[serde(rename = "GUID")]
    pub guid: String,
    pub index: u32,
    pub alias: String,
    pub description: String,
    #[serde(rename = "MACAddress")]
    pub mac_address: String,
    pub network_adapter_name: String,
    pub vnetwork_adapter_name: String,
}

pub type NetworkInterfaceQuery = InterfaceQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterfaceKey {
    Guid,
    Index,
    Alias,
    Description,
    MacAddress,
    NetworkAdapterName,
    VNetworkAdapterName,
}

pub(crate) const NETWORK_INTERFACE_PRECEDENCE: [InterfaceKey; 7] = [
    InterfaceKey::Guid,
    InterfaceKey::Index,
    InterfaceKey::Alias,
    InterfaceKey::Description,
    InterfaceKey::MacAddress,
    InterfaceKey::NetworkAdapterName,
    InterfaceKey::VNetworkAdapterName,
];

impl InterfaceQuery {
    fn value(&self, key: InterfaceKey) -> Option<String> {
        let v = match key {
            InterfaceKey::Guid => self.guid.clone(),
            InterfaceKey::Index => {
                return (self.index != 0).then(|| self.index.to_string());
            }
            InterfaceKey::Alias => self.alias.clone(),
            InterfaceKey::Description => self.description.clone(),
            InterfaceKey::MacAddress => self.mac_address.clone(),
            InterfaceKey::NetworkAdapterName => self.network_adapter_name.clone(),
            InterfaceKey::VNetworkAdapterName => self.vnetwork_adapter_name.clone(),
        };
        (!v.is_empty()).then_some(v)
    }

    /// Identifier that wins `precedence`, rendered as text
    pub(crate) fn selector_in(&self, precedence: &[InterfaceKey]) -> Option<String> {
        precedence.iter().find_map(|key| self.value(*key))
    }

    /// Copy of the query holding only the identifier that wins `precedence`
    pub(crate) fn narrowed_in(&self, precedence: &[InterfaceKey], kind: ObjectKind) -> Result<Self> {
        let key = precedence
            .iter()
            .copied()
            .find(|key| self.value(*key).is_some())
            .ok_or_else(|| Error::validation(format!("empty {} query", kind)))?;

        let mut narrowed = Self::default();
        match key {
            InterfaceKey::Guid => narrowed.guid = self.guid.clone(),
            InterfaceKey::Index => narrowed.index = self.index,
            InterfaceKey::Alias => narrowed.alias = self.alias.clone(),
            InterfaceKey::Description => narrowed.description = self.description.clone(),
            InterfaceKey::MacAddress => narrowed.mac_address = self.mac_address.clone(),
            InterfaceKey::NetworkAdapterName => {
                narrowed.network_adapter_name = self.network_adapter_name.clone()
            }
            InterfaceKey::VNetworkAdapterName => {
                narrowed.vnetwork_adapter_name = self.vnetwork_adapter_name.clone()
            }
        }
        Ok(narrowed)
    }

    /// Network-interface precedence: GUID, index, alias, description, MAC,
    /// adapter name, virtual adapter name
    pub fn selector(&self) -> Option<String> {
        self.selector_in(&NETWORK_INTERFACE_PRECEDENCE)
    }

    pub fn narrowed(&self) -> Result<Self> {
        self.narrowed_in(&NETWORK_INTERFACE_PRECEDENCE, ObjectKind::NetworkInterface)
    }
}

/// Properties of an interface as read from the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InterfaceProperties {
    #[serde(rename = "GUID")]
    pub guid: String,
    pub index: u32,
    pub alias: String,
    pub description: String,
    #[serde(rename = "MACAddress")]
    pub mac_address: String,
    pub network_adapter_name: String,
    /// Hyper-V management OS adapter name, empty for other adapters
    pub vnetwork_adapter_name: String,
    pub network_connection_names: Vec<String>,
    pub vswitch_name: String,
    pub computer_name: String,
}

pub type NetworkInterfaceProperties = InterfaceProperties;

impl WindowsClient {
    /// Read a network interface
    pub async fn read_network_interface(
        &self,
        query: &NetworkInterfaceQuery,
    ) -> Result<NetworkInterfaceProperties> {
        let narrowed = query.narrowed()?;
        let script = READ_NETWORK_INTERFACE.render_json(&narrowed)?;
        let properties: NetworkInterfaceProperties = self.run_json(&script).await?;
        info!(
            kind = %ObjectKind::NetworkInterface,
            id = narrowed.selector().unwrap_or_default(),
            guid = %properties.guid,
            "read network interface"
        );
        Ok(properties)
    }
}

/// Shared lookup script; `{{kind}}` is the kind reported in errors
pub(crate) const READ_INTERFACE_TEXT: &str = r#"
$iQuery = ConvertFrom-Json -InputObject '{{args}}'
$kind = '{{kind}}'

$vnetworkAdapter = $null
if ( $iQuery.GUID ) {
    $id = $iQuery.GUID
    $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InterfaceGUID -eq "{$id}" } )
}
elseif ( $iQuery.Index -ne 0 ) {
    $id = $iQuery.Index
    $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InterfaceIndex -eq $id } )
}
elseif ( $iQuery.Alias ) {
    $id = $iQuery.Alias
    $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InterfaceAlias -eq $id } )
}
elseif ( $iQuery.Description ) {
    $id = $iQuery.Description
    $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.InterfaceDescription -eq $id } )
}
elseif ( $iQuery.MACAddress ) {
    $id = $iQuery.MACAddress
    $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.MacAddress -eq $id } )
}
elseif ( $iQuery.NetworkAdapterName ) {
    $id = $iQuery.NetworkAdapterName
    $networkAdapter = @( Get-NetAdapter -Name $id -ErrorAction 'Ignore' )
}
elseif ( $iQuery.VNetworkAdapterName ) {
    $id = $iQuery.VNetworkAdapterName
    $networkAdapter = @()
    $vnetworkAdapter = Get-VMNetworkAdapter -ManagementOS -Name $id -ErrorAction 'Ignore' | Select-Object -First 1
    if ( $vnetworkAdapter ) {
        $networkAdapter = @( Get-NetAdapter -IncludeHidden -ErrorAction 'Ignore' | where { $_.DeviceID -eq $vnetworkAdapter.DeviceID } )
    }
}
if ( $networkAdapter.Count -eq 0 ) {
    throw "cannot find $kind '$id'"
}
if ( $networkAdapter.Count -gt 1 ) {
    throw "found multiple $kind '$id'"
}
$networkAdapter = $networkAdapter[0]

if ( ( -not $vnetworkAdapter ) -and ( $networkAdapter.DriverDescription -eq 'Hyper-V Virtual Ethernet Adapter' ) ) {
    $vnetworkAdapter = Get-VMNetworkAdapter -ManagementOS -ErrorAction 'Ignore' | where { $_.DeviceID -eq $networkAdapter.DeviceID } | Select-Object -First 1
}

$iProperties = @{
    GUID                   = $networkAdapter.InterfaceGUID.Trim("{}")
    Index                  = [uint32]$networkAdapter.InterfaceIndex
    Alias                  = $networkAdapter.InterfaceAlias
    Description            = $networkAdapter.InterfaceDescription
    MACAddress             = $networkAdapter.MacAddress
    NetworkAdapterName     = $networkAdapter.Name
    VNetworkAdapterName    = ""
    NetworkConnectionNames = @( Get-NetConnectionProfile -InterfaceIndex $networkAdapter.InterfaceIndex -ErrorAction 'Ignore' | foreach { $_.Name } )
    VSwitchName            = ""
    ComputerName           = $networkAdapter.SystemName
}
if ( $vnetworkAdapter ) {
    $iProperties.VNetworkAdapterName = $vnetworkAdapter.Name
    $iProperties.VSwitchName         = [string]$vnetworkAdapter.SwitchName
}

Write-Output $( ConvertTo-Json -InputObject $iProperties -Depth 100 )
"#;

const READ_NETWORK_INTERFACE: InterfaceScript =
    InterfaceScript::new("readNetworkInterface", ObjectKind::NetworkInterface);

/// The shared lookup script bound to one kind
pub(crate) struct InterfaceScript {
    template: ScriptTemplate,
    kind: ObjectKind,
}

impl InterfaceScript {
    pub(crate) const fn new(name: &'static str, kind: ObjectKind) -> Self {
        Self {
            template: ScriptTemplate::new(name, READ_INTERFACE_TEXT),
            kind,
        }
    }

    pub(crate) fn render_json(&self, query: &InterfaceQuery) -> Result<crate::traits::Script> {
        Ok(self.template.render(&[
            ("args", super::ps_json(query)?),
            ("kind", self.kind.as_str().to_string()),
        ]))
    }
}
