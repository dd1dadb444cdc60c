//! Stack configuration
//!
//! A stack file is a nested YAML document. Konductor only relies on its shape:
//! one block per module (keyed by module name, optionally containing `enabled`),
//! a `compliance` block and a `versions` block.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Nested key-value stack configuration
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    name: String,
    root: JsonValue,
}

impl StackConfig {
    /// Create an empty stack configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: JsonValue::Object(Map::new()),
        }
    }

    /// Build from an already parsed JSON tree
    pub fn from_value(name: impl Into<String>, root: JsonValue) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Load a stack file
    ///
    /// The stack name is taken from the top-level `stack` key, falling back to
    /// the file stem (`dev.yaml` -> `dev`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::StackNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());
        let mut stack = Self::from_yaml(&content)?;
        if stack.name.is_empty() {
            stack.name = fallback;
        }
        Ok(stack)
    }

    /// Parse a stack from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let root: JsonValue = serde_yaml::from_str(yaml)?;
        let root = match root {
            JsonValue::Null => JsonValue::Object(Map::new()),
            other => other,
        };
        let name = root
            .get("stack")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self { name, root })
    }

    /// Stack name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the stack name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Get a value by dotted path (e.g., "versions.channel")
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.root, &parts)
    }

    /// Get a string value
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(JsonValue::as_str)
    }

    /// Get a boolean value
    ///
    /// YAML stacks written by hand often quote booleans, so `"true"` and
    /// `"false"` are accepted too.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Get an object value, or `None` when absent or not an object
    pub fn get_object(&self, path: &str) -> Option<&Map<String, JsonValue>> {
        self.get(path).and_then(JsonValue::as_object)
    }

    /// Get a value, failing when absent
    pub fn require(&self, path: &str) -> Result<&JsonValue> {
        self.get(path).ok_or_else(|| CoreError::MissingKey {
            key: path.to_string(),
        })
    }

    /// Deserialize a block into a typed value, using `T::default()` when absent
    pub fn get_typed<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T> {
        match self.get(path) {
            None | Some(JsonValue::Null) => Ok(T::default()),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| CoreError::InvalidConfig {
                    key: path.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Raw configuration block of a module (`Null` when absent)
    pub fn module_block(&self, module: &str) -> JsonValue {
        self.root.get(module).cloned().unwrap_or(JsonValue::Null)
    }

    /// Enablement flag of a module, falling back to the module's own default
    pub fn module_enabled(&self, module: &str, default: bool) -> bool {
        self.get_bool(&format!("{}.enabled", module))
            .unwrap_or(default)
    }

    /// Explicit module order from the `modules` key, if any
    pub fn module_order(&self) -> Option<Vec<String>> {
        self.get("modules")?.as_array().map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}
