// # terraform-provider-windows - command-line driver
//
// A thin integration layer over tfwin-core:
// 1. Reading the connection configuration from flags or environment variables
// 2. Initializing logging and the runtime
// 3. Registering the script runners
// 4. Running one provider operation and printing the result as JSON
//
// All provider logic lives in tfwin-core. Logs go to stderr; stdout only ever
// carries the JSON result.
//
// ## Configuration
//
// ### Connection
// - `TFWIN_TYPE`: Transport (local, ssh)
// - `TFWIN_HOST`: Host to connect to (ssh)
// - `TFWIN_PORT`: SSH port (default 22)
// - `TFWIN_USER`: SSH user
// - `TFWIN_PASSWORD`: SSH password (optional, uses sshpass)
// - `TFWIN_INSECURE`: Skip host key verification (true/false)
//
// ### State
// - `TFWIN_STATE_PATH`: Path to the state file
//
// ### Logging
// - `TFWIN_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export TFWIN_TYPE=ssh
// export TFWIN_HOST=win01.corp.example.com
// export TFWIN_USER=admin
// export TFWIN_STATE_PATH=/var/lib/tfwin/state.json
//
// terraform-provider-windows create windows_network_adapter '{"name":"Ethernet0","new_name":"LAN"}'
// terraform-provider-windows read //win01.corp.example.com/network_adapters/Ethernet0
// terraform-provider-windows delete //win01.corp.example.com/network_adapters/Ethernet0
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

use tfwin_core::{
    ConnectionType, EngineConfig, FileStateStore, ProviderConfig, ProviderEngine, ProviderRegistry,
};

/// Exit codes for different termination scenarios
///
/// - 0: Operation succeeded
/// - 1: Configuration or startup error
/// - 2: Runtime error (the operation failed)
#[derive(Debug, Clone, Copy)]
enum TfwinExitCode {
    /// Operation succeeded
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// The operation failed
    RuntimeError = 2,
}

impl From<TfwinExitCode> for ExitCode {
    fn from(code: TfwinExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Manage Windows host settings through PowerShell
#[derive(Debug, Parser)]
#[command(name = "terraform-provider-windows", version, about)]
struct Cli {
    /// Transport used to reach the host (local, ssh)
    #[arg(long = "type", env = "TFWIN_TYPE", default_value = "local")]
    connection_type: String,

    /// Host to connect to
    #[arg(long, env = "TFWIN_HOST", default_value = "localhost")]
    host: String,

    /// SSH port
    #[arg(long, env = "TFWIN_PORT", default_value_t = 22)]
    port: u16,

    /// SSH user
    #[arg(long, env = "TFWIN_USER", default_value = "")]
    user: String,

    /// SSH password
    #[arg(long, env = "TFWIN_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Skip host key verification
    #[arg(long, env = "TFWIN_INSECURE", default_value_t = false)]
    insecure: bool,

    /// Path to the state file
    #[arg(long, env = "TFWIN_STATE_PATH", default_value = "tfwin-state.json")]
    state_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TFWIN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the provider, resource and data source schemas
    Schema,
    /// Adopt an object and converge it to the given configuration
    Create {
        resource_type: String,
        /// JSON object, or `-` to read it from stdin
        config: String,
    },
    /// Refresh a resource from the host
    Read { id: String },
    /// Apply a changed configuration to a resource
    Update {
        id: String,
        /// JSON object, or `-` to read it from stdin
        config: String,
    },
    /// Restore the original properties and forget the resource
    Delete { id: String },
    /// Read a data source
    Data {
        data_source_type: String,
        /// JSON object, or `-` to read it from stdin
        config: String,
    },
}

impl Cli {
    /// Validate the configuration
    ///
    /// Builds the connection configuration the runners are created from.
    fn validate(&self) -> Result<ProviderConfig> {
        parse_log_level(&self.log_level)?;

        let connection_type: ConnectionType = self
            .connection_type
            .parse()
            .with_context(|| "TFWIN_TYPE is not valid")?;

        if self.state_path.trim().is_empty() {
            anyhow::bail!(
                "TFWIN_STATE_PATH cannot be empty. \
                Set it via: export TFWIN_STATE_PATH=/var/lib/tfwin/state.json"
            );
        }

        let config = ProviderConfig {
            connection_type,
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            insecure: self.insecure,
        };
        config
            .validate()
            .with_context(|| "Set TFWIN_HOST and TFWIN_USER when TFWIN_TYPE=ssh")?;

        Ok(config)
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "TFWIN_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Parse a configuration argument into a JSON object
fn parse_object(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(text).context("configuration is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("configuration must be a JSON object, got: {}", other),
    }
}

fn read_config_arg(arg: &str) -> Result<Map<String, Value>> {
    if arg == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("cannot read configuration from stdin")?;
        parse_object(&text)
    } else {
        parse_object(arg)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                TfwinExitCode::ConfigError.into()
            } else {
                TfwinExitCode::Success.into()
            };
        }
    };

    let config = match cli.validate() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return TfwinExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = parse_log_level(&cli.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TfwinExitCode::ConfigError.into();
    }

    debug!(?config, "Configuration loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TfwinExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(cli, config).await {
            Ok(()) => TfwinExitCode::Success,
            Err(e) => {
                error!("{:#}", e);
                if is_config_error(&e) {
                    TfwinExitCode::ConfigError
                } else {
                    TfwinExitCode::RuntimeError
                }
            }
        }
    })
    .into()
}

fn is_config_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<tfwin_core::Error>(),
        Some(tfwin_core::Error::Config(_))
    )
}

/// Run one provider operation
async fn run(cli: Cli, config: ProviderConfig) -> Result<()> {
    let registry = ProviderRegistry::with_builtin();

    #[cfg(feature = "local")]
    tfwin_runner_local::register(&registry);

    #[cfg(feature = "ssh")]
    tfwin_runner_ssh::register(&registry);

    if let Command::Schema = cli.command {
        return print_json(&registry.schema());
    }

    let client = registry.create_client(&config)?;
    let state_store = FileStateStore::new(&cli.state_path).await?;
    let (engine, mut events) = ProviderEngine::new(
        Arc::new(registry),
        client,
        Box::new(state_store),
        EngineConfig::default(),
    )?;

    let drain = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            info!(?event, "Provider event");
        }
    });

    let result = execute(&engine, cli.command).await;
    let flushed = engine.flush().await;

    drop(engine);
    let _ = drain.await;

    result?;
    flushed?;
    Ok(())
}

async fn execute(engine: &ProviderEngine, command: Command) -> Result<()> {
    match command {
        Command::Schema => print_json(&engine.schema()),
        Command::Create {
            resource_type,
            config,
        } => {
            let state = engine
                .create(&resource_type, read_config_arg(&config)?)
                .await?;
            print_json(&state)
        }
        Command::Read { id } => {
            let state = engine.read(&id).await?;
            if state.is_none() {
                info!(id = %id, "Resource no longer exists");
            }
            print_json(&state)
        }
        Command::Update { id, config } => {
            let state = engine.update(&id, read_config_arg(&config)?).await?;
            print_json(&state)
        }
        Command::Delete { id } => {
            engine.delete(&id).await?;
            Ok(())
        }
        Command::Data {
            data_source_type,
            config,
        } => {
            let state = engine
                .read_data_source(&data_source_type, read_config_arg(&config)?)
                .await?;
            print_json(&state)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("cannot serialize result")?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_command() {
        let cli = Cli::try_parse_from([
            "terraform-provider-windows",
            "--type",
            "ssh",
            "--host",
            "win01",
            "--user",
            "admin",
            "create",
            "windows_network_adapter",
            r#"{"name":"Ethernet0"}"#,
        ])
        .unwrap();

        let config = cli.validate().unwrap();
        assert_eq!(config.connection_type, ConnectionType::Ssh);
        assert_eq!(config.port, 22);
        assert!(matches!(cli.command, Command::Create { .. }));
    }

    #[test]
    fn test_ssh_requires_user() {
        let cli = Cli::try_parse_from([
            "terraform-provider-windows",
            "--type",
            "ssh",
            "--host",
            "win01",
            "schema",
        ])
        .unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_unknown_transport_and_log_level_are_rejected() {
        let cli =
            Cli::try_parse_from(["terraform-provider-windows", "--type", "winrm", "schema"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from([
            "terraform-provider-windows",
            "--log-level",
            "verbose",
            "schema",
        ])
        .unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_port_out_of_range_is_rejected() {
        let parsed = Cli::try_parse_from(["terraform-provider-windows", "--port", "70000", "schema"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_object() {
        let map = parse_object(r#"{"name":"Ethernet0"}"#).unwrap();
        assert_eq!(map["name"], "Ethernet0");

        assert!(parse_object("[1,2]").is_err());
        assert!(parse_object("not json").is_err());
    }
}
