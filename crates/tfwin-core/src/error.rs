//! Error types for the Windows provider
//!
//! This module defines all error types used throughout the crate.

use std::fmt;
use thiserror::Error;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of object managed on the Windows host
///
/// Used to tag "not found" and "ambiguous match" errors with the object
/// kind, and to build resource identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// The computer itself (singleton)
    Computer,
    /// A network adapter (`Get-NetAdapter`)
    NetworkAdapter,
    /// A network interface (adapter seen through its interface identifiers)
    NetworkInterface,
    /// A link-layer IP interface
    LinkIpInterface,
    /// A network connection profile (`Get-NetConnectionProfile`)
    NetworkConnection,
}

impl ObjectKind {
    /// The name used by the host scripts and in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Computer => "computer",
            ObjectKind::NetworkAdapter => "network_adapter",
            ObjectKind::NetworkInterface => "network_interface",
            ObjectKind::LinkIpInterface => "link_ip_interface",
            ObjectKind::NetworkConnection => "network_connection",
        }
    }

    /// The path segment used in resource identities (`//host/<segment>/id`)
    pub fn id_segment(&self) -> &'static str {
        match self {
            ObjectKind::Computer => "computer",
            ObjectKind::NetworkAdapter => "network_adapters",
            ObjectKind::NetworkInterface => "network_interfaces",
            ObjectKind::LinkIpInterface => "link_ip_interfaces",
            ObjectKind::NetworkConnection => "network_connections",
        }
    }

    /// All kinds, in the order the host scripts report them
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Computer,
        ObjectKind::NetworkAdapter,
        ObjectKind::NetworkInterface,
        ObjectKind::LinkIpInterface,
        ObjectKind::NetworkConnection,
    ];
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for the Windows provider
#[derive(Error, Debug)]
pub enum Error {
    /// Query or configuration rejected before any remote call
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The host has no object matching the query
    #[error("cannot find {kind} '{id}'")]
    NotFound {
        /// Kind of the object that was looked up
        kind: ObjectKind,
        /// Identifier used for the lookup
        id: String,
    },

    /// The query matched more than one object on the host
    #[error("found multiple {kind} '{id}'")]
    AmbiguousMatch {
        /// Kind of the object that was looked up
        kind: ObjectKind,
        /// Identifier used for the lookup
        id: String,
    },

    /// The script could not be run, or exited non-zero
    #[error("runner: script '{script}' failed (exit code {}): {stderr}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Transport {
        /// Name of the script
        script: String,
        /// Exit code, when the process ran at all
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Schema errors (unknown attribute, wrong type)
    #[error("Schema error: {0}")]
    Schema(String),

    /// I/O errors (spawning processes, state files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(kind: ObjectKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an "ambiguous match" error
    pub fn ambiguous(kind: ObjectKind, id: impl Into<String>) -> Self {
        Self::AmbiguousMatch {
            kind,
            id: id.into(),
        }
    }

    /// Create a transport error
    pub fn transport(
        script: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Transport {
            script: script.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Whether this error means the object does not exist on the host
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Whether this error means the object of the given kind does not exist
    pub fn is_not_found_for(&self, expected: ObjectKind) -> bool {
        matches!(self, Error::NotFound { kind, .. } if *kind == expected)
    }

    /// Classify the stderr of a failed script
    ///
    /// The host scripts signal lookup failures with `throw "cannot find <kind> '<id>'"`
    /// and `throw "found multiple <kind> '<id>'"`. This is the single place where
    /// that text is turned into a tagged error; everything else matches on variants.
    pub fn from_script_failure(script: &str, exit_code: Option<i32>, stderr: &str) -> Self {
        for kind in ObjectKind::ALL {
            if let Some(id) = extract_quoted(stderr, &format!("cannot find {} '", kind.as_str())) {
                return Self::not_found(kind, id);
            }
            if let Some(id) = extract_quoted(stderr, &format!("found multiple {} '", kind.as_str())) {
                return Self::ambiguous(kind, id);
            }
        }
        Self::transport(script, exit_code, stderr.trim())
    }
}

fn extract_quoted(text: &str, prefix: &str) -> Option<String> {
    let start = text.find(prefix)? + prefix.len();
    let len = text[start..].find('\'')?;
    Some(text[start..start + len].to_string())
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_keeps_host_wording() {
        let err = Error::not_found(ObjectKind::NetworkAdapter, "Ethernet0");
        assert_eq!(err.to_string(), "cannot find network_adapter 'Ethernet0'");
        assert!(err.is_not_found());
        assert!(err.is_not_found_for(ObjectKind::NetworkAdapter));
        assert!(!err.is_not_found_for(ObjectKind::NetworkInterface));
    }

    #[test]
    fn test_script_failure_classification() {
        let stderr = "Exception: cannot find network_interface 'vEthernet (LAN)'\r\nAt line:12 char:5";
        match Error::from_script_failure("readNetworkInterface", Some(1), stderr) {
            Error::NotFound { kind, id } => {
                assert_eq!(kind, ObjectKind::NetworkInterface);
                assert_eq!(id, "vEthernet (LAN)");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stderr = "found multiple network_interface '00-15-5D-00-01-02'";
        assert!(matches!(
            Error::from_script_failure("readNetworkInterface", Some(1), stderr),
            Error::AmbiguousMatch { kind: ObjectKind::NetworkInterface, .. }
        ));

        let err = Error::from_script_failure("readComputer", Some(1), "Access is denied.\r\n");
        match err {
            Error::Transport { script, exit_code, stderr } => {
                assert_eq!(script, "readComputer");
                assert_eq!(exit_code, Some(1));
                assert_eq!(stderr, "Access is denied.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
