//! Konductor CLI - deploy a curated stack of platform modules onto Kubernetes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::GlobalArgs;

#[derive(Parser)]
#[command(name = "konductor")]
#[command(author = "Konductor Contributors")]
#[command(version)]
#[command(about = "Deploy a curated stack of platform modules onto Kubernetes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Stack configuration file
    #[arg(short, long, global = true, env = "KONDUCTOR_CONFIG", default_value = "stack.yaml")]
    config: PathBuf,

    /// Stack name (defaults to the file's `stack` key, then its file stem)
    #[arg(long, global = true, env = "KONDUCTOR_STACK")]
    stack: Option<String>,

    /// Ignore the version cache and run the version cascade again
    #[arg(long, global = true)]
    refresh_versions: bool,

    /// kubeconfig context to deploy to
    #[arg(long, global = true)]
    kube_context: Option<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every enabled module to the cluster
    Up {
        /// Server-side dry run: validate against the API server without persisting
        #[arg(long)]
        dry_run: bool,

        /// Create timeout for resources that do not set their own (e.g. 10m)
        #[arg(long)]
        timeout: Option<String>,
    },

    /// Show the resources a deployment would apply, without a cluster
    Preview {
        /// Also print resources and run outputs as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Resolve and print the version table
    Versions,

    /// List registered modules
    Modules {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let args = GlobalArgs {
        config: cli.config,
        stack: cli.stack,
        refresh_versions: cli.refresh_versions,
        kube_context: cli.kube_context,
    };

    let result = match cli.command {
        Commands::Up { dry_run, timeout } => {
            commands::up::run(&args, dry_run, timeout.as_deref()).await
        }
        Commands::Preview { json } => commands::preview::run(&args, json).await,
        Commands::Versions => commands::versions::run(&args).await,
        Commands::Modules { json } => commands::modules::run(&args, json),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
