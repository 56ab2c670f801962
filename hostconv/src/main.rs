//! hostconv: plan and apply declared host resources.
//!
//! Loads a resource file, builds the kind registry once at start-up, then
//! walks the resources in order:
//! - `plan` runs check only and reports what would change
//! - `apply` runs check, then apply for every resource that will change
//!
//! Ctrl-C cancels the run; the resource in flight aborts at its next
//! blocking point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use hostconv_resource::lvm::LvmCli;
use hostconv_resource::{ParamRenderer, default_registry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod report;
mod run;

use config::{ResourceFile, parse_param};
use report::Format;
use run::{Mode, Runner};

/// hostconv resource reconciler
#[derive(Parser, Debug)]
#[command(name = "hostconv", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what would change without changing anything
    Plan(RunArgs),
    /// Converge resources to their declared state
    Apply(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Resource file (JSON)
    #[arg(short, long)]
    file: PathBuf,

    /// Parameter override, repeatable (key=value)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// Seconds to wait for a new device to appear
    #[arg(long, default_value = "30")]
    lvm_wait_timeout: u64,

    /// Milliseconds between device checks
    #[arg(long, default_value = "100")]
    lvm_poll_interval: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hostconv=info,hostconv_resource=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let (mode, args) = match cli.command {
        Command::Plan(args) => (Mode::Plan, args),
        Command::Apply(args) => (Mode::Apply, args),
    };

    let file = ResourceFile::load(&args.file)?;
    let renderer = ParamRenderer::new(file.params_with(&args.params));

    let lvm = LvmCli::new().with_wait(
        Duration::from_millis(args.lvm_poll_interval),
        Duration::from_secs(args.lvm_wait_timeout),
    );
    let registry = default_registry(Arc::new(lvm)).context("Failed to build kind registry")?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    info!(
        file = %args.file.display(),
        resources = file.resources.len(),
        ?mode,
        "Starting hostconv on {}",
        host
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            signal_cancel.cancel();
        }
    });

    let runner = Runner::new(&registry, &renderer, cancel, host);
    let summary = runner.run(&file.resources, mode).await;

    println!("{}", report::render(&summary, args.format)?);

    Ok(if summary.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
