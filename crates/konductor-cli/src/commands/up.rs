//! Deploy the stack to the cluster

use console::style;
use konductor_engine::RunOutputs;
use konductor_kube::{KubeEngine, KubeEngineOptions, parse_duration};
use std::sync::Arc;

use super::{GlobalArgs, Session};
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(args: &GlobalArgs, dry_run: bool, timeout: Option<&str>) -> Result<()> {
    let default_timeout = timeout
        .map(|t| {
            parse_duration(t).ok_or_else(|| {
                CliError::usage(format!("invalid --timeout '{}': expected e.g. 90s, 10m, 1h", t))
            })
        })
        .transpose()?;

    let session = Session::load(args)?;
    let (versions, source) = session.resolve_versions(args.refresh_versions).await?;
    eprintln!(
        "{} Deploying stack {} (versions from {})",
        style("→").blue().bold(),
        style(session.stack.name()).cyan(),
        source
    );

    let engine = KubeEngine::connect(KubeEngineOptions {
        context: args.kube_context.clone(),
        dry_run,
        default_timeout,
        ..Default::default()
    })
    .await?;
    if dry_run {
        eprintln!("  {}", style("server-side dry run, nothing is persisted").yellow());
    }

    let driver = session.driver(Arc::new(engine)).await;
    let order = session.module_order();
    let mut outputs = RunOutputs::default();
    let result = driver
        .run_into(&order, &session.stack, &versions, &mut outputs)
        .await;

    if !outputs.states.is_empty() {
        display::print_run_summary(&outputs);
    }
    if let Err(e) = result {
        // Modules deployed before the failure stay deployed; report them
        if !outputs.versions.is_empty() {
            display::print_json(&outputs)?;
        }
        return Err(e.into());
    }
    display::print_json(&outputs)
}
