//! Computer identity, DNS client settings and reboot-pending signals

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ScriptTemplate, WindowsClient};
use crate::error::Result;

/// Properties of the computer as read from the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ComputerProperties {
    /// Current computer name
    pub name: String,
    /// Computer name after the next reboot
    pub new_name: String,
    #[serde(rename = "DNSClient")]
    pub dns_client: ComputerDnsClient,
    /// OR of every signal in `reboot_pending_details`
    pub reboot_pending: bool,
    pub reboot_pending_details: RebootPendingDetails,
    pub network_adapter_names: Vec<String>,
    pub network_connection_names: Vec<String>,
}

/// Global DNS client settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ComputerDnsClient {
    pub suffix_search_list: Vec<String>,
    pub enable_devolution: bool,
    pub devolution_level: u32,
}

/// Individual reboot-pending signals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RebootPendingDetails {
    pub reboot_required: bool,
    pub post_reboot_reporting: bool,
    #[serde(rename = "DVDRebootSignal")]
    pub dvd_reboot_signal: bool,
    pub reboot_pending: bool,
    pub reboot_in_progress: bool,
    pub packages_pending: bool,
    pub services_pending: bool,
    pub update_exe_volatile: bool,
    pub computer_rename_pending: bool,
    pub file_rename_pending: bool,
    pub netlogon_pending: bool,
    pub current_reboot_attemps: bool,
}

impl RebootPendingDetails {
    /// Whether any signal is raised
    pub fn any(&self) -> bool {
        self.reboot_required
            || self.post_reboot_reporting
            || self.dvd_reboot_signal
            || self.reboot_pending
            || self.reboot_in_progress
            || self.packages_pending
            || self.services_pending
            || self.update_exe_volatile
            || self.computer_rename_pending
            || self.file_rename_pending
            || self.netlogon_pending
            || self.current_reboot_attemps
    }
}

/// Changes to apply to the computer
///
/// `None` leaves the host value untouched; `Some` is applied even when it
/// holds an empty string, `false` or `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComputerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(rename = "DNSClient", skip_serializing_if = "Option::is_none")]
    pub dns_client: Option<ComputerDnsClientPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ComputerDnsClientPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix_search_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_devolution: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devolution_level: Option<u32>,
}

impl ComputerPatch {
    pub fn is_empty(&self) -> bool {
        self.new_name.is_none() && self.dns_client.is_none()
    }
}

impl From<&ComputerDnsClient> for ComputerDnsClientPatch {
    fn from(dns: &ComputerDnsClient) -> Self {
        Self {
            suffix_search_list: Some(dns.suffix_search_list.clone()),
            enable_devolution: Some(dns.enable_devolution),
            devolution_level: Some(dns.devolution_level),
        }
    }
}

impl ComputerProperties {
    /// Patch that writes back every writable property as read
    pub fn to_patch(&self) -> ComputerPatch {
        ComputerPatch {
            new_name: Some(self.new_name.clone()),
            dns_client: Some((&self.dns_client).into()),
        }
    }
}

impl WindowsClient {
    /// Read the computer
    pub async fn read_computer(&self) -> Result<ComputerProperties> {
        let script = READ_COMPUTER.render(&[]);
        let properties: ComputerProperties = self.run_json(&script).await?;
        info!(name = %properties.name, "read computer");
        Ok(properties)
    }

    /// Apply a patch to the computer
    ///
    /// The computer is a singleton, so no query is needed.
    pub async fn update_computer(&self, patch: &ComputerPatch) -> Result<()> {
        let script = UPDATE_COMPUTER.render_json(patch)?;
        self.run_unit(&script).await?;
        info!(new_name = ?patch.new_name, "updated computer");
        Ok(())
    }
}

const READ_COMPUTER: ScriptTemplate = ScriptTemplate::new(
    "readComputer",
    r#"
$pendingName = ( Get-ItemProperty -Path 'HKLM:\SYSTEM\CurrentControlSet\Control\ComputerName\ComputerName' -Name 'ComputerName' -ErrorAction Ignore ).ComputerName

$details = [ordered]@{
    RebootRequired        = [bool]( Get-Item -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\WindowsUpdate\Auto Update\RebootRequired' -ErrorAction Ignore )
    PostRebootReporting   = [bool]( Get-Item -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\WindowsUpdate\Auto Update\PostRebootReporting' -ErrorAction Ignore )
    DVDRebootSignal       = [bool]( Get-ItemProperty -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\RunOnce' -Name 'DVDRebootSignal' -ErrorAction Ignore )
    RebootPending         = [bool]( Get-Item -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Component Based Servicing\RebootPending' -ErrorAction Ignore )
    RebootInProgress      = [bool]( Get-Item -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Component Based Servicing\RebootInProgress' -ErrorAction Ignore )
    PackagesPending       = [bool]( Get-Item -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Component Based Servicing\PackagesPending' -ErrorAction Ignore )
    ServicesPending       = [bool]( Get-ChildItem -Path 'HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\WindowsUpdate\Services\Pending' -ErrorAction Ignore )
    UpdateExeVolatile     = $false
    ComputerRenamePending = ( $pendingName -and ( $pendingName -ne $env:ComputerName ) )
    FileRenamePending     = $false
    NetlogonPending       = $false
    CurrentRebootAttemps  = [bool]( Get-Item -Path 'HKLM:\SOFTWARE\Microsoft\ServerManager\CurrentRebootAttemps' -ErrorAction Ignore )
}

$v = Get-ItemProperty -Path 'HKLM:\SOFTWARE\Microsoft\Updates' -Name 'UpdateExeVolatile' -ErrorAction Ignore | Select-Object -ExpandProperty 'UpdateExeVolatile'
if ( $v -and ( $v -ne 0 ) ) {
    $details.UpdateExeVolatile = $true
}

$sessionManager = 'HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager'
foreach ( $valueName in @( 'PendingFileRenameOperations', 'PendingFileRenameOperations2' ) ) {
    $v = Get-ItemProperty -Path $sessionManager -Name $valueName -ErrorAction Ignore | Select-Object -ExpandProperty $valueName
    if ( $v ) {
        $details.FileRenamePending = $true
    }
}

$netlogon = 'HKLM:\SYSTEM\CurrentControlSet\Services\Netlogon'
if ( ( Get-ItemProperty -Path $netlogon -Name 'JoinDomain' -ErrorAction Ignore ) -or ( Get-ItemProperty -Path $netlogon -Name 'AvoidSpnSet' -ErrorAction Ignore ) ) {
    $details.NetlogonPending = $true
}

$dnsClient = @{ SuffixSearchList = @(); EnableDevolution = $false; DevolutionLevel = 0 }
$settings = Get-DnsClientGlobalSetting -ErrorAction Ignore
if ( $settings ) {
    $dnsClient = @{
        SuffixSearchList = @( $settings.SuffixSearchList )
        EnableDevolution = [bool]$settings.UseDevolution
        DevolutionLevel  = [uint32]$settings.DevolutionLevel
    }
}

$cProperties = @{
    Name                   = $env:ComputerName
    NewName                = if ( $pendingName ) { $pendingName } else { $env:ComputerName }
    DNSClient              = $dnsClient
    RebootPending          = ( $details.Values -contains $true )
    RebootPendingDetails   = $details
    NetworkAdapterNames    = @( Get-NetAdapter -ErrorAction 'Ignore' | foreach { $_.Name } )
    NetworkConnectionNames = @( Get-NetConnectionProfile -ErrorAction 'Ignore' | foreach { $_.Name } )
}

Write-Output $( ConvertTo-Json -InputObject $cProperties -Depth 100 )
"#,
);

const UPDATE_COMPUTER: ScriptTemplate = ScriptTemplate::new(
    "updateComputer",
    r#"
$cPatch = ConvertFrom-Json -InputObject '{{args}}'

if ( $null -ne $cPatch.NewName ) {
    $pendingName = ( Get-ItemProperty -Path 'HKLM:\SYSTEM\CurrentControlSet\Control\ComputerName\ComputerName' -Name 'ComputerName' -ErrorAction Ignore ).ComputerName
    if ( $cPatch.NewName -ne $pendingName ) {
        # WMI allows reverting a pending rename, Rename-Computer does not
        $returnValue = ( Invoke-WmiMethod -Name 'Rename' -Path "Win32_ComputerSystem.Name='$env:ComputerName'" -ArgumentList $cPatch.NewName ).ReturnValue
        if ( $returnValue -eq 87 ) {
            throw "invalid new computer-name '$( $cPatch.NewName )'"
        }
        elseif ( $returnValue -ne 0 ) {
            throw "WMI execution failed with ReturnValue $returnValue"
        }
    }
}

if ( $null -ne $cPatch.DNSClient ) {
    $arguments = @{}
    if ( $null -ne $cPatch.DNSClient.SuffixSearchList ) {
        $arguments.SuffixSearchList = @( $cPatch.DNSClient.SuffixSearchList )
    }
    if ( $null -ne $cPatch.DNSClient.EnableDevolution ) {
        $arguments.UseDevolution = [bool]$cPatch.DNSClient.EnableDevolution
    }
    if ( $null -ne $cPatch.DNSClient.DevolutionLevel ) {
        $arguments.DevolutionLevel = [uint32]$cPatch.DNSClient.DevolutionLevel
    }
    if ( $arguments.Count -gt 0 ) {
        Set-DnsClientGlobalSetting @arguments -Confirm:$false | Out-Null
    }
}
"#,
);
