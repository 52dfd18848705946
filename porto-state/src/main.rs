//! porto-state: Porto container operations from the command line.
//!
//! Imperative subcommands map one-to-one to supervisor operations.
//! `running`, `absent` and `apply` reconcile towards a desired state and
//! report one result per container. Output is JSON on stdout; logs go to
//! stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use porto_state::clients::porto::DEFAULT_SOCKET;
use porto_state::manifest::Manifest;
use porto_state::{
    ClientConfig, ContainerReconciler, DesiredContainer, PortoClient, Properties,
    ReconcileResult, Supervisor,
};

/// Porto container operations and desired-state reconciliation
#[derive(Parser, Debug)]
#[command(name = "porto-state", version, about)]
struct Args {
    /// Porto daemon socket
    #[arg(long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    /// Timeout for each supervisor call in seconds
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Only report what running/absent/apply would change (rejected for
    /// imperative commands)
    #[arg(long)]
    test: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check if a container exists
    Exists { name: String },

    /// Print the state of a container
    State { name: String },

    /// Print all properties of a container (empty if it does not exist)
    Inspect { name: String },

    /// List all containers
    List,

    /// Create a container
    Create {
        name: String,
        /// Initial property, KEY=VALUE (repeatable)
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },

    /// Destroy a container
    Destroy { name: String },

    /// Start a container
    Start { name: String },

    /// Stop a container
    Stop { name: String },

    /// Stop and start a container
    Restart { name: String },

    /// Create a container running COMMAND and start it
    Run { name: String, command: String },

    /// Set container properties
    SetProperty {
        name: String,
        /// KEY=VALUE pairs
        #[arg(required = true, value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },

    /// Ensure a container exists with the given properties and is running
    Running {
        name: String,
        /// Desired property, KEY=VALUE (repeatable)
        #[arg(short = 'p', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
        /// Configure the container but do not start it
        #[arg(long)]
        no_start: bool,
    },

    /// Ensure containers do not exist
    Absent {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Apply a JSON manifest of desired container states
    Apply { manifest: PathBuf },
}

impl Command {
    /// Subcommands that reconcile and therefore support `--test`.
    fn reconciles(&self) -> bool {
        matches!(
            self,
            Command::Running { .. } | Command::Absent { .. } | Command::Apply { .. }
        )
    }
}

impl Args {
    /// Reject `--test` where it would be silently ignored.
    fn validate(&self) -> std::result::Result<(), clap::Error> {
        if self.test && !self.command.reconciles() {
            return Err(Args::command().error(
                ErrorKind::ArgumentConflict,
                "--test is only supported by running, absent and apply",
            ));
        }
        Ok(())
    }
}

fn parse_property(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[derive(Serialize)]
struct OperationResult<'a> {
    name: &'a str,
    operation: &'a str,
    result: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode output")?
    );
    Ok(())
}

fn done(name: &str, operation: &str) -> Result<ExitCode> {
    print_json(&OperationResult {
        name,
        operation,
        result: true,
    })?;
    Ok(ExitCode::SUCCESS)
}

fn report(results: &[ReconcileResult]) -> Result<ExitCode> {
    print_json(&results)?;
    if results.iter().any(|r| r.failed) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs on stderr so stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "porto_state=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = args.validate() {
        e.exit();
    }

    let client = PortoClient::new(ClientConfig {
        socket_path: args.socket.clone(),
        timeout: Duration::from_secs(args.timeout),
    });
    info!(socket = %args.socket.display(), "Using Porto socket");

    match args.command {
        Command::Exists { name } => {
            print_json(&client.exists(&name).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::State { name } => {
            let state = client
                .get_state(&name)
                .await
                .with_context(|| format!("Can't get state of container '{}'", name))?;
            print_json(&state)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Inspect { name } => {
            print_json(&client.inspect(&name).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            print_json(&client.list().await?)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Create { name, properties } => {
            let properties: Properties = properties.into_iter().collect();
            client
                .create_with(&name, &properties)
                .await
                .with_context(|| format!("Can't create container '{}'", name))?;
            done(&name, "create")
        }
        Command::Destroy { name } => {
            client
                .destroy(&name)
                .await
                .with_context(|| format!("Can't destroy container '{}'", name))?;
            done(&name, "destroy")
        }
        Command::Start { name } => {
            client
                .start(&name)
                .await
                .with_context(|| format!("Can't start container '{}'", name))?;
            done(&name, "start")
        }
        Command::Stop { name } => {
            client
                .stop(&name)
                .await
                .with_context(|| format!("Can't stop container '{}'", name))?;
            done(&name, "stop")
        }
        Command::Restart { name } => {
            client
                .restart(&name)
                .await
                .with_context(|| format!("Can't restart container '{}'", name))?;
            done(&name, "restart")
        }
        Command::Run { name, command } => {
            client
                .run(&name, &command)
                .await
                .with_context(|| format!("Can't run container '{}'", name))?;
            done(&name, "run")
        }
        Command::SetProperty { name, properties } => {
            let properties: Properties = properties.into_iter().collect();
            client
                .set_properties(&name, &properties)
                .await
                .with_context(|| format!("Can't set properties of container '{}'", name))?;
            done(&name, "set_property")
        }
        Command::Running {
            name,
            properties,
            no_start,
        } => {
            let reconciler = ContainerReconciler::new(client).with_dry_run(args.test);
            let desired = DesiredContainer::new(properties.into_iter().collect(), !no_start);
            let result = reconciler.ensure_running(&name, &desired).await;
            report(&[result])
        }
        Command::Absent { names } => {
            let reconciler = ContainerReconciler::new(client).with_dry_run(args.test);
            let mut results = Vec::with_capacity(names.len());
            for name in &names {
                results.push(reconciler.ensure_absent(name).await);
            }
            report(&results)
        }
        Command::Apply { manifest } => {
            let manifest = Manifest::load(&manifest)?;
            let reconciler = ContainerReconciler::new(client).with_dry_run(args.test);
            let results = manifest.apply(&reconciler).await;
            report(&results)
        }
    }
}
