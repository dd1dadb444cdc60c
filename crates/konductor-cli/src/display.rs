//! Display formatting for CLI output
//!
//! Run progress and previews go to stderr so the JSON a command prints on
//! stdout can be piped as-is.

use console::style;
use konductor_engine::{ModuleState, RunOutputs};
use konductor_kube::AppliedResource;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One line per considered module with its final state
pub fn print_run_summary(outputs: &RunOutputs) {
    for (name, state) in &outputs.states {
        let marker = match state {
            ModuleState::Deployed => style("✓").green().bold(),
            ModuleState::Failed => style("✗").red().bold(),
            _ => style("-").dim(),
        };
        let version = outputs
            .versions
            .get(name)
            .map(|v| format!(" {}", style(v).cyan()))
            .unwrap_or_default();
        eprintln!("  {} {}{} {}", marker, style(name).bold(), version, style(state).dim());
    }

    let deployed = outputs.deployed().count();
    eprintln!();
    eprintln!(
        "{} {} module(s) deployed",
        style("→").blue().bold(),
        style(deployed).bold()
    );
}

/// Resources a preview would apply, in submission order
pub fn print_preview(applied: &[AppliedResource]) {
    if applied.is_empty() {
        eprintln!("{}", style("No resources would be applied.").dim());
        return;
    }

    for (i, entry) in applied.iter().enumerate() {
        eprintln!(
            "{:>3}. {}",
            i + 1,
            style(entry.resource.id()).bold()
        );
        if let Some(timeout) = &entry.timeouts.create {
            eprintln!("     {} {}", style("timeout:").dim(), timeout);
        }
        if !entry.depends_on.is_empty() {
            let deps: Vec<String> = entry.depends_on.iter().map(ToString::to_string).collect();
            eprintln!("     {} {}", style("after:").dim(), deps.join(", "));
        }
        print_map("labels", &entry.resource.metadata.labels);
        print_map("annotations", &entry.resource.metadata.annotations);
    }

    eprintln!();
    eprintln!(
        "{} {} resource(s) would be applied",
        style("→").blue().bold(),
        style(applied.len()).bold()
    );
}

fn print_map(title: &str, map: &BTreeMap<String, String>) {
    if map.is_empty() {
        return;
    }
    eprintln!("     {}", style(format!("{}:", title)).dim());
    for (key, value) in map {
        eprintln!("       {}={}", style(key).cyan(), value);
    }
}

/// Aligned table of registered modules
pub fn print_module_table(rows: &[(String, bool, Option<bool>)]) {
    let width = rows.iter().map(|(name, _, _)| name.len()).max().unwrap_or(0);
    let with_stack = rows.iter().any(|(_, _, enabled)| enabled.is_some());

    if with_stack {
        println!(
            "{}",
            style(format!("{:<width$}  {:<8}  {}", "MODULE", "DEFAULT", "STACK")).bold()
        );
    } else {
        println!(
            "{}",
            style(format!("{:<width$}  {}", "MODULE", "DEFAULT")).bold()
        );
    }

    for (name, default, enabled) in rows {
        let default = if *default { "enabled" } else { "disabled" };
        match enabled {
            Some(true) => println!(
                "{:<width$}  {:<8}  {}",
                name,
                default,
                style("enabled").green()
            ),
            Some(false) => println!(
                "{:<width$}  {:<8}  {}",
                name,
                default,
                style("disabled").dim()
            ),
            None => println!("{:<width$}  {}", name, default),
        }
    }
}
