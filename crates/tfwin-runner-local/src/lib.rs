// # Local Script Runner
//
// This crate runs provider scripts as a child `powershell.exe` process on the
// machine the provider itself runs on.
//
// ## Encoding
//
// The script body is passed with `-EncodedCommand`: base64 of the UTF-16LE
// bytes. No quoting rules apply, so JSON arguments embedded in the body reach
// PowerShell exactly as rendered.
//
// ## Registration
//
// ```rust,ignore
// let registry = ProviderRegistry::with_builtin();
// tfwin_runner_local::register(&registry);
// ```

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use tfwin_core::client::encode_command;
use tfwin_core::config::{ConnectionType, ProviderConfig};
use tfwin_core::traits::{RunnerFactory, Script, ScriptOutput, ScriptRunner};
use tfwin_core::{Error, ProviderRegistry, Result};

/// Program started when none is configured
pub const DEFAULT_PROGRAM: &str = "powershell.exe";

/// Arguments passed to PowerShell for one script
pub fn powershell_args(body: &str) -> Vec<String> {
    vec![
        "-NoLogo".to_string(),
        "-NoProfile".to_string(),
        "-NonInteractive".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-EncodedCommand".to_string(),
        encode_command(body),
    ]
}

/// Runs scripts through a local PowerShell process
#[derive(Debug, Clone)]
pub struct LocalRunner {
    program: String,
}

impl LocalRunner {
    /// Create a runner for `powershell.exe`
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
        }
    }

    /// Use another PowerShell executable (e.g. `pwsh`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, script: &Script) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(powershell_args(&script.body))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptRunner for LocalRunner {
    async fn run(&self, script: &Script) -> Result<ScriptOutput> {
        debug!(script = script.name, program = %self.program, "Starting local PowerShell");

        let output = self.command(script).output().await.map_err(|e| {
            Error::transport(
                script.name,
                None,
                format!("cannot start '{}': {}", self.program, e),
            )
        })?;

        let result = ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        trace!(
            script = script.name,
            exit_code = ?result.exit_code,
            stdout_len = result.stdout.len(),
            "Local PowerShell finished"
        );
        Ok(result)
    }

    fn transport_name(&self) -> &'static str {
        "local"
    }
}

/// Factory for creating local runners
pub struct LocalRunnerFactory;

impl RunnerFactory for LocalRunnerFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ScriptRunner>> {
        match config.connection_type {
            ConnectionType::Local => Ok(Box::new(LocalRunner::new())),
            other => Err(Error::config(format!(
                "Invalid config for local runner: connection type '{}'",
                other
            ))),
        }
    }
}

/// Register the local runner with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_runner(ConnectionType::Local.as_str(), Box::new(LocalRunnerFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_powershell_args_end_with_encoded_body() {
        let args = powershell_args("Get-NetAdapter");
        assert_eq!(args[args.len() - 2], "-EncodedCommand");
        assert_eq!(args[args.len() - 1], encode_command("Get-NetAdapter"));
        assert!(args.contains(&"-NonInteractive".to_string()));
    }

    #[test]
    fn test_factory_creation() {
        let factory = LocalRunnerFactory;

        let runner = factory.create(&ProviderConfig::local()).unwrap();
        assert_eq!(runner.transport_name(), "local");

        let ssh = ProviderConfig::ssh("win01", "admin");
        assert!(matches!(factory.create(&ssh), Err(Error::Config(_))));
    }

    #[test]
    fn test_register() {
        let registry = ProviderRegistry::new();
        register(&registry);
        assert!(registry.has_runner("local"));
        assert!(registry.create_client(&ProviderConfig::local()).is_ok());
    }

    #[tokio::test]
    async fn test_missing_program_is_a_transport_error() {
        let runner = LocalRunner::new().with_program("/nonexistent/tfwin-powershell");
        let err = runner
            .run(&Script::new("readComputer", "Get-ComputerInfo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { exit_code: None, .. }));
        assert!(err.to_string().contains("readComputer"));
    }
}
