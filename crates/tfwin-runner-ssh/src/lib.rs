// # SSH Script Runner
//
// This crate runs provider scripts on a remote Windows host through the
// system OpenSSH client.
//
// ## Transport
//
// ```text
// [sshpass -e] ssh -p <port> [-o ...] <user>@<host> powershell ... -EncodedCommand <bootstrap>
//                                                   stdin: script body
// ```
//
// The remote command line only carries a short encoded bootstrap that reads
// the script body from stdin and runs it, so the size of a script is never
// limited by the remote command line.
//
// ## Credentials
//
// - With a password, `sshpass -e` is used and the password travels in the
//   `SSHPASS` environment variable of the child process only.
// - Without a password, `BatchMode=yes` makes ssh fail instead of prompting;
//   keys and agents configured for the user are used as usual.
// - `insecure = true` disables host key checking.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace, warn};

use tfwin_core::client::encode_command;
use tfwin_core::config::{ConnectionType, ProviderConfig};
use tfwin_core::traits::{RunnerFactory, Script, ScriptOutput, ScriptRunner};
use tfwin_core::{Error, ProviderRegistry, Result};

/// Reads the script body from stdin as UTF-8 and runs it in the current scope
const BOOTSTRAP: &str = "[Console]::InputEncoding = [Text.Encoding]::UTF8\n\
                         $script = [Console]::In.ReadToEnd()\n\
                         . ([ScriptBlock]::Create($script))\n\
                         exit $LASTEXITCODE";

/// Exit code of `ssh` itself when the connection fails
const SSH_CONNECTION_FAILED: i32 = 255;

/// Runs scripts on a remote host through `ssh`
#[derive(Clone)]
pub struct SshRunner {
    host: String,
    port: u16,
    user: String,
    password: String,
    insecure: bool,
    ssh_program: String,
    sshpass_program: String,
}

impl SshRunner {
    /// Create a runner from the connection configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if config.connection_type != ConnectionType::Ssh {
            return Err(Error::config(format!(
                "Invalid config for SSH runner: connection type '{}'",
                config.connection_type
            )));
        }
        config.validate()?;

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: config.password.clone(),
            insecure: config.insecure,
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        })
    }

    /// Use another `ssh` executable
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Use another `sshpass` executable
    pub fn with_sshpass_program(mut self, program: impl Into<String>) -> Self {
        self.sshpass_program = program.into();
        self
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Program started for every script
    pub fn program(&self) -> &str {
        if self.password.is_empty() {
            &self.ssh_program
        } else {
            &self.sshpass_program
        }
    }

    /// Arguments passed to [`SshRunner::program`]
    ///
    /// Never contains the password.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.password.is_empty() {
            args.push("-e".to_string());
            args.push(self.ssh_program.clone());
        }

        args.push("-p".to_string());
        args.push(self.port.to_string());
        args.push("-T".to_string());

        let mut options = Vec::new();
        if self.password.is_empty() {
            options.push("BatchMode=yes");
        } else {
            options.push("PubkeyAuthentication=no");
            options.push("PreferredAuthentications=password,keyboard-interactive");
        }
        if self.insecure {
            options.push("StrictHostKeyChecking=no");
            options.push("UserKnownHostsFile=/dev/null");
            options.push("LogLevel=ERROR");
        }
        for option in options {
            args.push("-o".to_string());
            args.push(option.to_string());
        }

        args.push(self.destination());
        args.extend(
            [
                "powershell",
                "-NoLogo",
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-EncodedCommand",
            ]
            .map(String::from),
        );
        args.push(encode_command(BOOTSTRAP));
        args
    }

    fn command(&self) -> Command {
        let mut command = Command::new(self.program());
        command
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.password.is_empty() {
            command.env("SSHPASS", &self.password);
        }
        command
    }
}

impl std::fmt::Debug for SshRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshRunner")
            .field("destination", &self.destination())
            .field("port", &self.port)
            .field("password", &!self.password.is_empty())
            .field("insecure", &self.insecure)
            .finish()
    }
}

#[async_trait]
impl ScriptRunner for SshRunner {
    async fn run(&self, script: &Script) -> Result<ScriptOutput> {
        debug!(
            script = script.name,
            destination = %self.destination(),
            port = self.port,
            "Running script over SSH"
        );

        let mut child = self.command().spawn().map_err(|e| {
            Error::transport(
                script.name,
                None,
                format!("cannot start '{}': {}", self.program(), e),
            )
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.body.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let result = ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };

        if result.exit_code == Some(SSH_CONNECTION_FAILED) {
            warn!(
                script = script.name,
                destination = %self.destination(),
                "SSH connection failed: {}",
                result.stderr.trim()
            );
            return Err(Error::transport(script.name, result.exit_code, result.stderr));
        }

        trace!(
            script = script.name,
            exit_code = ?result.exit_code,
            stdout_len = result.stdout.len(),
            "SSH script finished"
        );
        Ok(result)
    }

    fn transport_name(&self) -> &'static str {
        "ssh"
    }
}

/// Factory for creating SSH runners
pub struct SshRunnerFactory;

impl RunnerFactory for SshRunnerFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ScriptRunner>> {
        Ok(Box::new(SshRunner::new(config)?))
    }
}

/// Register the SSH runner with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_runner(ConnectionType::Ssh.as_str(), Box::new(SshRunnerFactory));
}
