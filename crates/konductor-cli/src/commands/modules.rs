//! List the registered modules

use konductor_core::StackConfig;
use konductor_engine::ModuleRegistry;
use serde_json::{Value as JsonValue, json};

use super::GlobalArgs;
use crate::display;
use crate::error::Result;

pub fn run(args: &GlobalArgs, json: bool) -> Result<()> {
    let registry = ModuleRegistry::builtin();

    // The stack file is optional here; when present its enablement is shown too
    let stack = if args.config.exists() {
        Some(StackConfig::from_file(&args.config)?)
    } else {
        None
    };

    if json {
        let modules = registry
            .names()
            .iter()
            .map(|name| module_json(&registry, name, stack.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        return display::print_json(&modules);
    }

    let rows = registry
        .names()
        .into_iter()
        .map(|name| {
            let schema = registry.find_config_schema(&name)?;
            let default = schema.enabled_by_default();
            let enabled = stack.as_ref().map(|s| s.module_enabled(&name, default));
            Ok((name, default, enabled))
        })
        .collect::<Result<Vec<_>>>()?;
    display::print_module_table(&rows);
    Ok(())
}

fn module_json(
    registry: &ModuleRegistry,
    name: &str,
    stack: Option<&StackConfig>,
) -> Result<JsonValue> {
    let descriptor = registry.descriptor(name)?;
    let schema = &descriptor.config_schema;
    let mut entry = json!({
        "name": name,
        "enabled_by_default": schema.enabled_by_default(),
        "entrypoint": descriptor.deploy_entrypoint.name(),
        "config_type": schema.type_name(),
        "fields": schema.fields(),
        "defaults": schema.defaults(),
    });
    if let Some(stack) = stack {
        entry["enabled"] = json!(stack.module_enabled(name, schema.enabled_by_default()));
    }
    Ok(entry)
}
