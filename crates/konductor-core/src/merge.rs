//! Module configuration merging
//!
//! Every module config is produced the same way: the typed defaults of the
//! module, overridden by whatever the stack supplies for that module.
//!
//! Rules:
//! - Keys known to the schema override the default
//! - Keys unknown to the schema are logged and dropped
//! - Objects merge one level deep; lists, scalars and deeper objects are replaced
//! - A value of the wrong type is logged and the default is kept
//!
//! Schemas must serialize every field (no `skip_serializing_if`) so that the
//! serialized defaults describe the full set of known keys.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

/// Merge a raw user configuration over the defaults of `C`
///
/// Never fails: anything that cannot be applied is reported and skipped.
pub fn merge_config<C>(module: &str, user: &JsonValue) -> C
where
    C: Serialize + DeserializeOwned + Default,
{
    let Some(mut merged) = defaults_object::<C>() else {
        return C::default();
    };

    let user_map = match user {
        JsonValue::Object(map) => map,
        JsonValue::Null => return C::default(),
        other => {
            warn!(
                module,
                "configuration block is not a mapping ({}), using defaults",
                type_name(other)
            );
            return C::default();
        }
    };

    for (key, user_value) in user_map {
        let Some(default_value) = merged.get(key) else {
            warn!(module, key = %key, "unknown configuration key ignored");
            continue;
        };

        let candidate = merge_one_level(default_value, user_value);
        let previous = merged.insert(key.clone(), candidate);

        if let Err(e) = serde_json::from_value::<C>(JsonValue::Object(merged.clone())) {
            warn!(module, key = %key, "invalid value ignored, keeping default: {}", e);
            if let Some(previous) = previous {
                merged.insert(key.clone(), previous);
            }
        }
    }

    serde_json::from_value(JsonValue::Object(merged)).unwrap_or_default()
}

/// Field names declared by the schema of `C`
pub fn schema_fields<C>() -> Vec<String>
where
    C: Serialize + Default,
{
    defaults_object::<C>()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn defaults_object<C>() -> Option<Map<String, JsonValue>>
where
    C: Serialize + Default,
{
    match serde_json::to_value(C::default()) {
        Ok(JsonValue::Object(map)) => Some(map),
        _ => None,
    }
}

/// Overlay `user` on `default`, descending into objects exactly once
fn merge_one_level(default: &JsonValue, user: &JsonValue) -> JsonValue {
    match (default, user) {
        (JsonValue::Object(base), JsonValue::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            JsonValue::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "mapping",
    }
}
