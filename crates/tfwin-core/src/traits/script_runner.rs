// # Script Runner Trait
//
// Defines the interface for running a PowerShell script on a Windows host.
//
// ## Implementations
//
// - Local child process: `tfwin-runner-local` crate
// - OpenSSH client: `tfwin-runner-ssh` crate
//
// ## Usage
//
// ```rust,ignore
// use tfwin_core::traits::{Script, ScriptRunner};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let runner = /* ScriptRunner implementation */;
//
//     let output = runner.run(&Script::new("hello", "Write-Output 'hello'")).await?;
//     assert!(output.success());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::ProviderConfig;

/// A rendered script, ready to be sent to a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Name of the script, used in logs and errors
    pub name: &'static str,
    /// Full PowerShell text with all arguments substituted
    pub body: String,
}

impl Script {
    /// Create a script from a name and a rendered body
    pub fn new(name: &'static str, body: impl Into<String>) -> Self {
        Self {
            name,
            body: body.into(),
        }
    }
}

/// Captured output of a script run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl ScriptOutput {
    /// Output of a script that exited with code 0
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Output of a script that failed
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    /// Whether the script exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for script runner implementations
///
/// A runner takes one rendered script, executes it over its transport and
/// returns everything the process produced.
///
/// # Contract
///
/// - A non-zero exit code is *not* an error at this level: the runner returns
///   `Ok(ScriptOutput)` and the client decides what the failure means.
/// - `Err` is reserved for failures to run the script at all (process could
///   not be spawned, connection refused).
/// - Runners do not serialize calls; the client owns the lock.
/// - Runners never log the script body or credentials above `trace`.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run a script and capture its output
    async fn run(&self, script: &Script) -> Result<ScriptOutput, crate::Error>;

    /// Transport name, used in logs
    fn transport_name(&self) -> &'static str;
}

/// Helper trait for constructing runners from configuration
pub trait RunnerFactory: Send + Sync {
    /// Create a ScriptRunner from the connection configuration
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn ScriptRunner>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_output_success() {
        assert!(ScriptOutput::ok("{}").success());
        assert!(!ScriptOutput::failed(1, "boom").success());
        assert!(!ScriptOutput::default().success());
    }
}
