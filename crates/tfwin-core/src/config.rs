//! Configuration types for the Windows provider
//!
//! This module defines the connection configuration handed to script runners,
//! the gateway resolver timings and the engine settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Transport used to reach the Windows host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Run PowerShell as a child process of the provider
    #[default]
    Local,
    /// Run PowerShell on a remote host through OpenSSH
    Ssh,
}

impl ConnectionType {
    /// Name under which the runner factory is registered
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Local => "local",
            ConnectionType::Ssh => "ssh",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = crate::Error;

    /// Case-insensitive; anything but `local`/`ssh` is a configuration error
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(ConnectionType::Local),
            "ssh" => Ok(ConnectionType::Ssh),
            other => Err(crate::Error::config(format!(
                "Unknown connection type '{}': expected 'local' or 'ssh'",
                other
            ))),
        }
    }
}

/// Connection configuration of the provider
///
/// Immutable once a client has been built from it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Transport type
    #[serde(rename = "type", default)]
    pub connection_type: ConnectionType,

    /// Host to connect to (ignored by the local transport)
    #[serde(default = "default_host")]
    pub host: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SSH user
    #[serde(default)]
    pub user: String,

    /// SSH password (never logged)
    #[serde(default)]
    pub password: String,

    /// Skip host key verification
    #[serde(default)]
    pub insecure: bool,
}

impl ProviderConfig {
    /// Configuration for the local transport
    pub fn local() -> Self {
        Self::default()
    }

    /// Configuration for the SSH transport
    pub fn ssh(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            connection_type: ConnectionType::Ssh,
            host: host.into(),
            user: user.into(),
            ..Self::default()
        }
    }

    /// Validate the connection configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.connection_type == ConnectionType::Ssh {
            if self.host.trim().is_empty() {
                return Err(crate::Error::config("SSH host cannot be empty"));
            }
            if self.user.trim().is_empty() {
                return Err(crate::Error::config("SSH user cannot be empty"));
            }
        }
        Ok(())
    }

    /// Host name used in resource identities
    ///
    /// The local transport always reports `localhost`.
    pub fn identity_host(&self) -> &str {
        match self.connection_type {
            ConnectionType::Local => "localhost",
            ConnectionType::Ssh => &self.host,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Local,
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            insecure: false,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("type", &self.connection_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "<redacted>" },
            )
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// Timings of the gateway / connection-profile resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Wait after removing a route before looking at the profiles again
    #[serde(default = "default_net_route_timeout_ms")]
    pub net_route_timeout_ms: u64,

    /// Interval between polls for a DHCP route to come back
    #[serde(default = "default_dhcp_timeout_ms")]
    pub dhcp_timeout_ms: u64,

    /// Maximum polls for a DHCP route to come back
    #[serde(default = "default_dhcp_max_retries")]
    pub dhcp_max_retries: u32,

    /// Cycle DHCP off/on every this many polls
    #[serde(default = "default_dhcp_cycle_every")]
    pub dhcp_cycle_every: u32,

    /// Interval between polls for the interface to reconnect
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,

    /// Maximum polls for the interface to reconnect
    #[serde(default = "default_network_max_retries")]
    pub network_max_retries: u32,

    /// Wait for connectivity after the interface reconnected
    #[serde(default = "default_connectivity_timeout_ms")]
    pub connectivity_timeout_ms: u64,
}

impl ResolverConfig {
    pub fn net_route_timeout(&self) -> Duration {
        Duration::from_millis(self.net_route_timeout_ms)
    }

    pub fn dhcp_timeout(&self) -> Duration {
        Duration::from_millis(self.dhcp_timeout_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity_timeout_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            net_route_timeout_ms: default_net_route_timeout_ms(),
            dhcp_timeout_ms: default_dhcp_timeout_ms(),
            dhcp_max_retries: default_dhcp_max_retries(),
            dhcp_cycle_every: default_dhcp_cycle_every(),
            network_timeout_ms: default_network_timeout_ms(),
            network_max_retries: default_network_max_retries(),
            connectivity_timeout_ms: default_connectivity_timeout_ms(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the event channel
    ///
    /// Events are dropped (with a warning) when the channel is full.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_net_route_timeout_ms() -> u64 {
    250
}

fn default_dhcp_timeout_ms() -> u64 {
    1000
}

fn default_dhcp_max_retries() -> u32 {
    60
}

fn default_dhcp_cycle_every() -> u32 {
    5
}

fn default_network_timeout_ms() -> u64 {
    1000
}

fn default_network_max_retries() -> u32 {
    60
}

fn default_connectivity_timeout_ms() -> u64 {
    5000
}

fn default_event_channel_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_type_parsing() {
        assert_eq!("LOCAL".parse::<ConnectionType>().unwrap(), ConnectionType::Local);
        assert_eq!("Ssh".parse::<ConnectionType>().unwrap(), ConnectionType::Ssh);
        assert_eq!("".parse::<ConnectionType>().unwrap(), ConnectionType::Local);
        assert!("winrm".parse::<ConnectionType>().is_err());
    }

    #[test]
    fn test_provider_config_defaults_from_json() {
        let config: ProviderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 22);
        assert!(config.validate().is_ok());

        let config: ProviderConfig =
            serde_json::from_str(r#"{"type":"ssh","host":"win01","user":"admin"}"#).unwrap();
        assert_eq!(config.connection_type, ConnectionType::Ssh);
        assert_eq!(config.identity_host(), "win01");
    }

    #[test]
    fn test_ssh_config_requires_host_and_user() {
        let mut config = ProviderConfig::ssh("win01", "");
        assert!(config.validate().is_err());
        config.user = "admin".to_string();
        config.host = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = ProviderConfig::ssh("win01", "admin");
        config.password = "hunter2".to_string();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_local_identity_host_is_localhost() {
        let mut config = ProviderConfig::local();
        config.host = "ignored".to_string();
        assert_eq!(config.identity_host(), "localhost");
    }

    #[test]
    fn test_resolver_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.net_route_timeout(), Duration::from_millis(250));
        assert_eq!(config.dhcp_max_retries, 60);
        assert_eq!(config.dhcp_cycle_every, 5);
        assert_eq!(config.network_max_retries, 60);
        assert_eq!(config.connectivity_timeout(), Duration::from_secs(5));
    }
}
