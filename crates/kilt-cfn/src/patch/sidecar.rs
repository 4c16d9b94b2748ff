//! Sidecar injection
//!
//! Each mount of the build spec becomes one non-essential container that
//! exposes its volumes to the wrapped workload containers.

use std::collections::BTreeSet;

use kilt_core::{BuildSpec, Configuration, MountResource};
use serde_json::{json, Map, Value};

use crate::document::{kind, string_array, TreePath};
use crate::error::DocumentError;

const DEFAULT_SIDECAR_NAME: &str = "kilt-sidecar";

/// A volume shared by a sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarVolume {
    /// Unit-level volume name
    pub name: String,
    /// Path inside the containers
    pub container_path: String,
}

/// A mount resolved to a concrete sidecar name and volumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarPlan<'a> {
    /// Container name of the sidecar
    pub name: String,
    /// Source mount
    pub mount: &'a MountResource,
    /// Volumes declared on the unit and mounted into the sidecar
    pub volumes: Vec<SidecarVolume>,
}

/// Resolve every mount of `spec` to a uniquely named sidecar.
///
/// Unnamed mounts take their name from the image; a name already used by an
/// earlier mount gets a `-<index>` suffix, then `-<index>-<n>` until unique.
#[must_use]
pub fn plan(spec: &BuildSpec) -> Vec<SidecarPlan<'_>> {
    let mut used = BTreeSet::new();
    let mut plans = Vec::with_capacity(spec.mounts.len());

    for (index, mount) in spec.mounts.iter().enumerate() {
        let base = if mount.name().is_empty() {
            default_name(mount.image())
        } else {
            mount.name().to_string()
        };
        let mut name = base.clone();
        if used.contains(&name) {
            name = format!("{base}-{index}");
            let mut n = 1;
            while used.contains(&name) {
                name = format!("{base}-{index}-{n}");
                n += 1;
            }
        }
        used.insert(name.clone());

        let volumes = mount
            .volumes()
            .iter()
            .map(|path| SidecarVolume {
                name: volume_name(&name, path),
                container_path: path.clone(),
            })
            .collect();

        plans.push(SidecarPlan {
            name,
            mount,
            volumes,
        });
    }
    plans
}

/// Sidecar name derived from an image reference.
///
/// `registry:5000/org/agent:1.2@sha256:..` → `agent`
#[must_use]
pub fn default_name(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or_default();
    let repository = without_digest.rsplit('/').next().unwrap_or_default();
    let basename = repository.split(':').next().unwrap_or_default();
    let name = sanitize(basename);
    if name.is_empty() {
        DEFAULT_SIDECAR_NAME.to_string()
    } else {
        name
    }
}

/// Unit-level volume name for a sidecar path: `<sidecar>-<path segments>`
#[must_use]
pub fn volume_name(sidecar: &str, path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        format!("{sidecar}-root")
    } else {
        format!("{sidecar}-{}", segments.join("-"))
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Container definition for a sidecar of `unit`
#[must_use]
pub fn definition(plan: &SidecarPlan<'_>, unit: &str, config: &Configuration) -> Value {
    let mount_points: Vec<Value> = plan
        .volumes
        .iter()
        .map(|v| {
            json!({
                "SourceVolume": v.name,
                "ContainerPath": v.container_path,
                "ReadOnly": false,
            })
        })
        .collect();

    let mut def = Map::new();
    def.insert("Name".to_string(), Value::String(plan.name.clone()));
    def.insert("Image".to_string(), Value::String(plan.mount.image().to_string()));
    def.insert("EntryPoint".to_string(), string_array(plan.mount.entry_point()));
    def.insert("Essential".to_string(), Value::Bool(false));
    def.insert("MountPoints".to_string(), Value::Array(mount_points));

    if !config.image_auth_secret.is_empty() {
        def.insert(
            "RepositoryCredentials".to_string(),
            json!({"CredentialsParameter": config.image_auth_secret}),
        );
    }
    if !config.log_group.is_empty() {
        def.insert(
            "LogConfiguration".to_string(),
            json!({
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": config.log_group,
                    "awslogs-region": {"Ref": "AWS::Region"},
                    "awslogs-stream-prefix": unit,
                }
            }),
        );
    }
    Value::Object(def)
}

/// Whether `container` is this plan's sidecar from an earlier run
#[must_use]
pub fn is_injected(container: &Map<String, Value>, plan: &SidecarPlan<'_>) -> bool {
    container.get("Image").and_then(Value::as_str) == Some(plan.mount.image())
        && container.get("EntryPoint") == Some(&string_array(plan.mount.entry_point()))
}

/// Insert a sidecar definition, replacing a container of the same name
pub fn upsert(containers: &mut Vec<Value>, definition: Value) {
    let name = definition.get("Name").and_then(Value::as_str).map(ToString::to_string);
    let existing = containers
        .iter()
        .position(|c| c.get("Name").and_then(Value::as_str) == name.as_deref());
    match existing {
        Some(i) => containers[i] = definition,
        None => containers.push(definition),
    }
}

/// Check the unit-level `Volumes` list before editing it.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if `Volumes` or an entry has the wrong type
pub fn check_volumes(properties: &Map<String, Value>) -> Result<(), DocumentError> {
    match properties.get("Volumes") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) => items.iter().enumerate().try_for_each(|(i, item)| {
            if item.is_object() {
                Ok(())
            } else {
                Err(DocumentError::type_mismatch(
                    TreePath::new(&["Properties", "Volumes"]).child(i.to_string()),
                    "object",
                    kind(item),
                ))
            }
        }),
        Some(other) => Err(DocumentError::type_mismatch(
            TreePath::new(&["Properties", "Volumes"]),
            "array",
            kind(other),
        )),
    }
}

/// Declare the plan's volumes on the unit when not already declared
pub fn declare_volumes(volumes: &mut Vec<Value>, plan: &SidecarPlan<'_>) {
    for volume in &plan.volumes {
        let declared = volumes
            .iter()
            .any(|v| v.get("Name").and_then(Value::as_str) == Some(volume.name.as_str()));
        if !declared {
            volumes.push(json!({"Name": volume.name}));
        }
    }
}
