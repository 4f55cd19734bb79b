//! [`HostProbe`] backed by one small script per probe
//!
//! The probe runs scripts without taking the client lock: it is only built
//! by operations that already hold it.
//!
//! Removing a route and putting it back happen inside a single script, so a
//! transport that drops with the route still leaves the host restored.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::{ScriptTemplate, WindowsClient};
use crate::error::Result;
use crate::gateway::{AddressFamily, Clock, ConnectionProfile, GatewayRoute, HostProbe};

/// Probe scripts reply with `{"Result": ...}`
#[derive(Deserialize)]
struct ProbeReply<T> {
    #[serde(rename = "Result")]
    result: T,
}

pub struct ScriptHostProbe<'a> {
    client: &'a WindowsClient,
}

impl<'a> ScriptHostProbe<'a> {
    /// The caller must hold the client lock for the probe's whole lifetime
    pub(crate) fn new(client: &'a WindowsClient) -> Self {
        Self { client }
    }

    async fn query<T, A>(&self, template: &ScriptTemplate, args: &A) -> Result<T>
    where
        T: DeserializeOwned,
        A: Serialize + ?Sized,
    {
        let script = template.render_json(args)?;
        let reply: ProbeReply<T> = self.client.exec_json(&script).await?;
        Ok(reply.result)
    }

    async fn command<A: Serialize + ?Sized>(&self, template: &ScriptTemplate, args: &A) -> Result<()> {
        let script = template.render_json(args)?;
        self.client.exec(&script).await.map(|_| ())
    }
}

#[async_trait]
impl HostProbe for ScriptHostProbe<'_> {
    async fn profile_names(&self, interface_index: u32) -> Result<Vec<String>> {
        self.query(&PROFILE_NAMES, &json!({ "InterfaceIndex": interface_index }))
            .await
    }

    async fn profile_by_name(
        &self,
        name: &str,
        interface_index: Option<u32>,
    ) -> Result<Option<ConnectionProfile>> {
        self.query(
            &PROFILE_BY_NAME,
            &json!({ "Name": name, "InterfaceIndex": interface_index.unwrap_or(0) }),
        )
        .await
    }

    async fn profile_name_by_guid(&self, guid: &str) -> Result<Option<String>> {
        self.query(&PROFILE_NAME_BY_GUID, &json!({ "GUID": guid })).await
    }

    async fn profile_guid_by_name(&self, name: &str) -> Result<Option<String>> {
        self.query(&PROFILE_GUID_BY_NAME, &json!({ "Name": name })).await
    }

    async fn gateway_routes(
        &self,
        family: AddressFamily,
        next_hop: Option<&str>,
    ) -> Result<Vec<GatewayRoute>> {
        self.query(
            &GATEWAY_ROUTES,
            &json!({
                "DestinationPrefix": family.default_prefix(),
                "NextHop": next_hop.unwrap_or_default(),
            }),
        )
        .await
    }

    async fn adapter_binding(&self, interface_alias: &str, component_id: &str) -> Result<Option<bool>> {
        self.query(
            &ADAPTER_BINDING,
            &json!({ "InterfaceAlias": interface_alias, "ComponentID": component_id }),
        )
        .await
    }

    async fn set_adapter_binding(
        &self,
        interface_alias: &str,
        component_id: &str,
        enabled: bool,
    ) -> Result<()> {
        self.command(
            &SET_ADAPTER_BINDING,
            &json!({
                "InterfaceAlias": interface_alias,
                "ComponentID": component_id,
                "Enabled": enabled,
            }),
        )
        .await
    }

    async fn route_is_persistent(&self, route: &GatewayRoute) -> Result<bool> {
        self.query(&ROUTE_IS_PERSISTENT, route).await
    }

    async fn dhcp_enabled(&self, interface_index: u32, family: AddressFamily) -> Result<bool> {
        self.query(
            &DHCP_ENABLED,
            &json!({ "InterfaceIndex": interface_index, "AddressFamily": family }),
        )
        .await
    }

    async fn remove_route(&self, route: &GatewayRoute) -> Result<()> {
        self.command(&REMOVE_ROUTE, route).await
    }

    async fn add_route(&self, route: &GatewayRoute) -> Result<()> {
        self.command(&ADD_ROUTE, route).await
    }

    async fn route_exists(&self, route: &GatewayRoute) -> Result<bool> {
        self.query(&ROUTE_EXISTS, route).await
    }

    async fn cycle_dhcp(&self, interface_index: u32, family: AddressFamily) -> Result<()> {
        self.command(
            &CYCLE_DHCP,
            &json!({ "InterfaceIndex": interface_index, "AddressFamily": family }),
        )
        .await
    }

    async fn interface_connected(&self, interface_index: u32, family: AddressFamily) -> Result<bool> {
        self.query(
            &INTERFACE_CONNECTED,
            &json!({ "InterfaceIndex": interface_index, "AddressFamily": family }),
        )
        .await
    }

    /// The host waits out `settle` itself
    async fn observe_without_route(
        &self,
        route: &GatewayRoute,
        re_add: bool,
        settle: Duration,
        _clock: &dyn Clock,
    ) -> Result<Vec<String>> {
        self.query(
            &OBSERVE_WITHOUT_ROUTE,
            &json!({
                "Route": route,
                "ReAdd": re_add,
                "SettleMilliseconds": settle.as_millis() as u64,
            }),
        )
        .await
    }

    async fn session_interface(&self) -> Result<Option<u32>> {
        self.query(&SESSION_INTERFACE, &json!({})).await
    }
}

const PROFILE_NAMES: ScriptTemplate = ScriptTemplate::new(
    "probeProfileNames",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$names = @( Get-NetConnectionProfile -InterfaceIndex $a.InterfaceIndex -ErrorAction 'Ignore' | foreach { $_.Name } )
Write-Output $( ConvertTo-Json -InputObject @{ Result = $names } -Depth 10 )
"#,
);

const PROFILE_BY_NAME: ScriptTemplate = ScriptTemplate::new(
    "probeProfileByName",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
if ( $a.InterfaceIndex -ne 0 ) {
    $profiles = @( Get-NetConnectionProfile -Name $a.Name -InterfaceIndex $a.InterfaceIndex -ErrorAction 'Ignore' )
}
else {
    $profiles = @( Get-NetConnectionProfile -Name $a.Name -ErrorAction 'Ignore' )
}
$r = $null
if ( $profiles.Count -gt 0 ) {
    $r = @{
        Name             = $profiles[0].Name
        InterfaceIndexes = @( $profiles | foreach { [uint32]$_.InterfaceIndex } )
        NetworkCategory  = $profiles[0].NetworkCategory.ToString()
        IPv4Connectivity = $profiles[0].IPv4Connectivity.ToString()
        IPv6Connectivity = $profiles[0].IPv6Connectivity.ToString()
    }
}
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const PROFILE_NAME_BY_GUID: ScriptTemplate = ScriptTemplate::new(
    "probeProfileNameByGuid",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$r = $null
$key = Get-Item -Path "HKLM:\SOFTWARE\Microsoft\Windows NT\CurrentVersion\NetworkList\Profiles\{$( $a.GUID )}" -ErrorAction Ignore
if ( $key ) {
    $r = ( Get-ItemProperty -Path $key.PSPath -Name 'ProfileName' -ErrorAction Ignore ).ProfileName
}
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const PROFILE_GUID_BY_NAME: ScriptTemplate = ScriptTemplate::new(
    "probeProfileGuidByName",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$r = $null
Get-ChildItem -Path 'HKLM:\SOFTWARE\Microsoft\Windows NT\CurrentVersion\NetworkList\Profiles' -ErrorAction Ignore | foreach {
    if ( ( Get-ItemProperty -Path $_.PSPath -Name 'ProfileName' -ErrorAction Ignore ).ProfileName -eq $a.Name ) {
        $r = $_.PSChildName.Trim("{}")
    }
}
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const GATEWAY_ROUTES: ScriptTemplate = ScriptTemplate::new(
    "probeGatewayRoutes",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$arguments = @{ DestinationPrefix = $a.DestinationPrefix }
if ( $a.NextHop ) {
    $arguments.NextHop = $a.NextHop
}
$routes = @( Get-NetRoute @arguments -ErrorAction 'Ignore' | foreach {
    @{
        InterfaceIndex    = [uint32]$_.InterfaceIndex
        InterfaceAlias    = $_.InterfaceAlias
        AddressFamily     = $_.AddressFamily.ToString()
        DestinationPrefix = $_.DestinationPrefix
        NextHop           = $_.NextHop
    }
} )
Write-Output $( ConvertTo-Json -InputObject @{ Result = $routes } -Depth 10 )
"#,
);

const ADAPTER_BINDING: ScriptTemplate = ScriptTemplate::new(
    "probeAdapterBinding",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$r = $null
$binding = Get-NetAdapterBinding -Name $a.InterfaceAlias -ComponentID $a.ComponentID -ErrorAction 'Ignore'
if ( $binding ) {
    $r = [bool]$binding.Enabled
}
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const SET_ADAPTER_BINDING: ScriptTemplate = ScriptTemplate::new(
    "probeSetAdapterBinding",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
Set-NetAdapterBinding -Name $a.InterfaceAlias -ComponentID $a.ComponentID -Enabled ( [bool]$a.Enabled ) -Confirm:$false | Out-Null
"#,
);

const ROUTE_IS_PERSISTENT: ScriptTemplate = ScriptTemplate::new(
    "probeRouteIsPersistent",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$r = [bool]( Get-NetRoute -InterfaceIndex $a.InterfaceIndex -DestinationPrefix $a.DestinationPrefix -NextHop $a.NextHop -PolicyStore PersistentStore -ErrorAction 'Ignore' )
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const DHCP_ENABLED: ScriptTemplate = ScriptTemplate::new(
    "probeDhcpEnabled",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$interface = Get-NetIPInterface -InterfaceIndex $a.InterfaceIndex -AddressFamily $a.AddressFamily -ErrorAction 'Ignore'
$r = [bool]( $interface -and ( $interface.Dhcp.ToString() -eq 'Enabled' ) )
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const REMOVE_ROUTE: ScriptTemplate = ScriptTemplate::new(
    "probeRemoveRoute",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
Remove-NetRoute -InterfaceIndex $a.InterfaceIndex -DestinationPrefix $a.DestinationPrefix -NextHop $a.NextHop -Confirm:$false | Out-Null
"#,
);

const ADD_ROUTE: ScriptTemplate = ScriptTemplate::new(
    "probeAddRoute",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
New-NetRoute -InterfaceIndex $a.InterfaceIndex -DestinationPrefix $a.DestinationPrefix -NextHop $a.NextHop -Confirm:$false | Out-Null
"#,
);

const ROUTE_EXISTS: ScriptTemplate = ScriptTemplate::new(
    "probeRouteExists",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$r = [bool]( Get-NetRoute -InterfaceIndex $a.InterfaceIndex -DestinationPrefix $a.DestinationPrefix -NextHop $a.NextHop -ErrorAction 'Ignore' )
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const CYCLE_DHCP: ScriptTemplate = ScriptTemplate::new(
    "probeCycleDhcp",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
Set-NetIPInterface -InterfaceIndex $a.InterfaceIndex -AddressFamily $a.AddressFamily -Dhcp 'Disabled' -Confirm:$false | Out-Null
Set-NetIPInterface -InterfaceIndex $a.InterfaceIndex -AddressFamily $a.AddressFamily -Dhcp 'Enabled' -Confirm:$false | Out-Null
"#,
);

const INTERFACE_CONNECTED: ScriptTemplate = ScriptTemplate::new(
    "probeInterfaceConnected",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$interface = Get-NetIPInterface -InterfaceIndex $a.InterfaceIndex -AddressFamily $a.AddressFamily -ErrorAction 'Ignore'
$r = [bool]( $interface -and ( $interface.ConnectionState.ToString() -eq 'Connected' ) )
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);

const OBSERVE_WITHOUT_ROUTE: ScriptTemplate = ScriptTemplate::new(
    "observeWithoutRoute",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$route = $a.Route
Remove-NetRoute -InterfaceIndex $route.InterfaceIndex -DestinationPrefix $route.DestinationPrefix -NextHop $route.NextHop -Confirm:$false | Out-Null
try {
    Start-Sleep -Milliseconds $a.SettleMilliseconds
    $names = @( Get-NetConnectionProfile -InterfaceIndex $route.InterfaceIndex -ErrorAction 'Ignore' | foreach { $_.Name } )
}
finally {
    if ( $a.ReAdd ) {
        New-NetRoute -InterfaceIndex $route.InterfaceIndex -DestinationPrefix $route.DestinationPrefix -NextHop $route.NextHop -Confirm:$false | Out-Null
    }
}
Write-Output $( ConvertTo-Json -InputObject @{ Result = $names } -Depth 10 )
"#,
);

const SESSION_INTERFACE: ScriptTemplate = ScriptTemplate::new(
    "sessionInterface",
    r#"
$a = ConvertFrom-Json -InputObject '{{args}}'
$r = $null
if ( $env:SSH_CONNECTION ) {
    $local = ( $env:SSH_CONNECTION -split ' ' )[2]
    $address = Get-NetIPAddress -IPAddress $local -ErrorAction 'Ignore' | Select-Object -First 1
    if ( $address ) {
        $r = [uint32]$address.InterfaceIndex
    }
}
Write-Output $( ConvertTo-Json -InputObject @{ Result = $r } -Depth 10 )
"#,
);
