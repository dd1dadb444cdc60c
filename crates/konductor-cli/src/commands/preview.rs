//! Dry run of a deployment against the recording engine

use console::style;
use konductor_engine::RunOutputs;
use konductor_kube::RecordingEngine;
use serde_json::json;
use std::sync::Arc;

use super::{GlobalArgs, Session};
use crate::display;
use crate::error::Result;

pub async fn run(args: &GlobalArgs, json: bool) -> Result<()> {
    let session = Session::load(args)?;
    let (versions, source) = session.resolve_versions(args.refresh_versions).await?;
    eprintln!(
        "{} Previewing stack {} (versions from {})",
        style("→").blue().bold(),
        style(session.stack.name()).cyan(),
        source
    );

    let engine = Arc::new(RecordingEngine::new());
    let driver = session.driver(engine.clone()).await;
    let order = session.module_order();
    let mut outputs = RunOutputs::default();
    let result = driver
        .run_into(&order, &session.stack, &versions, &mut outputs)
        .await;

    let applied = engine.applied();
    display::print_preview(&applied);

    if json {
        let resources: Vec<_> = applied
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.resource.id().to_string(),
                    "resource": entry.resource,
                    "depends_on": entry
                        .depends_on
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                    "timeouts": entry.timeouts,
                })
            })
            .collect();
        display::print_json(&json!({ "resources": resources, "outputs": outputs }))?;
    }
    result.map_err(Into::into)
}
