//! Windows client
//!
//! The client turns typed queries, properties and patches into PowerShell
//! scripts, runs them through a [`ScriptRunner`] and parses the JSON the
//! scripts print on stdout.
//!
//! ## Serialization
//!
//! At most one script is in flight per client. Every public operation takes
//! the client lock for its whole duration, so a network connection read that
//! runs several probe scripts is not interleaved with other operations.
//!
//! ## Failures
//!
//! A script that exits non-zero is classified once, here, by
//! [`Error::from_script_failure`]: lookup failures become
//! [`Error::NotFound`]/[`Error::AmbiguousMatch`], everything else
//! [`Error::Transport`].

pub mod computer;
pub mod link_ip_interface;
pub mod network_adapter;
pub mod network_connection;
pub mod network_interface;
pub mod probe;
mod script;

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::{debug, error, trace};

use crate::config::{ProviderConfig, ResolverConfig};
use crate::error::{Error, ObjectKind, Result};
use crate::gateway::{Clock, ResolverEvent, TokioClock};
use crate::traits::{Script, ScriptRunner};

pub use computer::{ComputerDnsClient, ComputerDnsClientPatch, ComputerPatch, ComputerProperties, RebootPendingDetails};
pub use link_ip_interface::{LinkIpInterfaceProperties, LinkIpInterfaceQuery};
pub use network_adapter::{
    AdapterDnsClient, AdapterDnsClientPatch, NetworkAdapterPatch, NetworkAdapterProperties,
    NetworkAdapterQuery,
};
pub use network_connection::{
    NetworkConnectionPatch, NetworkConnectionProperties, NetworkConnectionQuery,
};
pub use network_interface::{
    InterfaceProperties, InterfaceQuery, NetworkInterfaceProperties, NetworkInterfaceQuery,
};
pub use script::{ScriptTemplate, encode_command, ps_json};

/// Client for one Windows host
pub struct WindowsClient {
    runner: Arc<dyn ScriptRunner>,
    config: ProviderConfig,
    resolver: ResolverConfig,
    clock: Arc<dyn Clock>,
    resolver_events: Option<mpsc::Sender<ResolverEvent>>,
    lock: Mutex<()>,
}

impl WindowsClient {
    /// Create a client running scripts through `runner`
    pub fn new(runner: Arc<dyn ScriptRunner>, config: ProviderConfig) -> Self {
        Self {
            runner,
            config,
            resolver: ResolverConfig::default(),
            clock: Arc::new(TokioClock),
            resolver_events: None,
            lock: Mutex::new(()),
        }
    }

    /// Override the gateway resolver timings
    pub fn with_resolver_config(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    /// Override the clock used by the gateway resolver
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report gateway resolver phases on a channel
    pub fn with_resolver_events(mut self, tx: mpsc::Sender<ResolverEvent>) -> Self {
        self.resolver_events = Some(tx);
        self
    }

    /// Connection configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Gateway resolver timings
    pub fn resolver_config(&self) -> &ResolverConfig {
        &self.resolver
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn resolver_events(&self) -> Option<&mpsc::Sender<ResolverEvent>> {
        self.resolver_events.as_ref()
    }

    /// Host name used in resource identities
    pub fn host(&self) -> &str {
        self.config.identity_host()
    }

    /// Identity of an object on this host: `//<host>/<kinds>/<id>`
    ///
    /// The computer is a singleton and has no trailing identifier.
    pub fn resource_id(&self, kind: ObjectKind, id: &str) -> String {
        match kind {
            ObjectKind::Computer => format!("//{}/computer", self.host()),
            _ => format!("//{}/{}/{}", self.host(), kind.id_segment(), id),
        }
    }

    /// Run a script under the client lock and parse its JSON output
    pub(crate) async fn run_json<T: DeserializeOwned>(&self, script: &Script) -> Result<T> {
        let _guard = self.lock().await;
        self.exec_json(script).await
    }

    /// Run a script under the client lock, ignoring its output
    pub(crate) async fn run_unit(&self, script: &Script) -> Result<()> {
        let _guard = self.lock().await;
        self.exec(script).await.map(|_| ())
    }

    /// Take the client lock
    ///
    /// Callers that hold the guard use [`exec`](Self::exec) and
    /// [`exec_json`](Self::exec_json) directly.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Run a script without taking the lock; returns stdout
    pub(crate) async fn exec(&self, script: &Script) -> Result<String> {
        trace!(script = script.name, body = %script.body, "running script");

        let output = self.runner.run(script).await.map_err(|e| {
            error!(
                script = script.name,
                transport = self.runner.transport_name(),
                "cannot run script: {}",
                e
            );
            e
        })?;

        if !output.success() {
            error!(
                script = script.name,
                exit_code = ?output.exit_code,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "script failed"
            );
            return Err(Error::from_script_failure(
                script.name,
                output.exit_code,
                &output.stderr,
            ));
        }

        debug!(script = script.name, stdout = %output.stdout, "script succeeded");
        Ok(output.stdout)
    }

    /// Run a script without taking the lock and parse its JSON output
    pub(crate) async fn exec_json<T: DeserializeOwned>(&self, script: &Script) -> Result<T> {
        let stdout = self.exec(script).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| {
            error!(script = script.name, "cannot convert script output to properties: {}", e);
            Error::Json(e)
        })
    }
}

impl std::fmt::Debug for WindowsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsClient")
            .field("transport", &self.runner.transport_name())
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish()
    }
}
