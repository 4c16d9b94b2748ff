//! Workload container edits: environment merge and shared volumes.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::document::{kind, TreePath};
use crate::error::DocumentError;

/// `Name` of a container definition, empty when absent
#[must_use]
pub fn container_name(container: &Map<String, Value>) -> &str {
    container.get("Name").and_then(Value::as_str).unwrap_or_default()
}

/// Check that the fields this module edits have usable shapes.
///
/// Run before any edit so a rejected container is left untouched.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] for a non-array `Environment`/`VolumesFrom`
/// or a non-object entry inside them
pub fn check_shape(container: &Map<String, Value>) -> Result<(), DocumentError> {
    for field in ["Environment", "VolumesFrom"] {
        match container.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        return Err(DocumentError::type_mismatch(
                            TreePath::new(&[field]).child(i.to_string()),
                            "object",
                            kind(item),
                        ));
                    }
                }
            }
            Some(other) => {
                return Err(DocumentError::type_mismatch(
                    TreePath::new(&[field]),
                    "array",
                    kind(other),
                ))
            }
        }
    }
    Ok(())
}

fn array_field<'a>(
    container: &'a mut Map<String, Value>,
    field: &str,
) -> Result<&'a mut Vec<Value>, DocumentError> {
    let slot = container
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    let found = kind(slot);
    slot.as_array_mut()
        .ok_or_else(|| DocumentError::type_mismatch(TreePath::new(&[field]), "array", found))
}

/// Merge `env` into the container's `Environment` list.
///
/// Build spec values win: an existing entry keeps its position and takes the new
/// value, later duplicates of the same name are dropped, new names are
/// appended in `env` order.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if `Environment` is not an array
pub fn merge_environment(
    container: &mut Map<String, Value>,
    env: &IndexMap<String, String>,
) -> Result<(), DocumentError> {
    if env.is_empty() {
        return Ok(());
    }
    let entries = array_field(container, "Environment")?;

    for (name, value) in env {
        let mut seen = false;
        entries.retain_mut(|entry| {
            if entry.get("Name").and_then(Value::as_str) != Some(name.as_str()) {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            if let Some(map) = entry.as_object_mut() {
                map.insert("Value".to_string(), Value::String(value.clone()));
            }
            true
        });
        if !seen {
            entries.push(json!({"Name": name, "Value": value}));
        }
    }
    Ok(())
}

/// Give the container read-only access to a sidecar's volumes.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if `VolumesFrom` is not an array
pub fn add_volumes_from(
    container: &mut Map<String, Value>,
    sidecar: &str,
) -> Result<(), DocumentError> {
    let entries = array_field(container, "VolumesFrom")?;
    let present = entries
        .iter()
        .any(|e| e.get("SourceContainer").and_then(Value::as_str) == Some(sidecar));
    if !present {
        entries.push(json!({"ReadOnly": true, "SourceContainer": sidecar}));
    }
    Ok(())
}
