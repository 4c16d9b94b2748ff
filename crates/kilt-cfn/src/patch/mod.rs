//! Task definition patch applier
//!
//! For one included compute unit:
//!
//! 1. resolve the linked execution role (missing role is only a warning)
//! 2. wrap eligible workload containers and merge the build spec environment
//! 3. inject sidecars and declare their shared volumes
//! 4. merge policy grants into the role
//!
//! Every container and the volume list are shape-checked before the first
//! edit, so a rejected unit is left as it was. Edits are keyed (by container
//! name, env name, volume name, policy name) which makes re-application a
//! no-op.

pub mod container;
pub mod entrypoint;
pub mod role;
pub mod sidecar;

use std::collections::BTreeMap;

use kilt_core::{BuildSpec, Configuration, InstrumentationHints};
use serde_json::{Map, Value};

use crate::classify::ResourceHandle;
use crate::document::{kind, Tree, TreePath};
use crate::error::{DocumentError, UnitPatchError};

pub use entrypoint::{original_process, OriginalProcess, WrapOutcome};
pub use sidecar::SidecarPlan;

/// Non-fatal observations made while patching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchWarning {
    /// Unit has no resolvable execution role; no grants were made
    UnresolvedRole {
        /// Compute unit
        unit: String,
    },
    /// Wrapped container declared neither entrypoint nor command
    UnknownOriginalProcess {
        /// Compute unit
        unit: String,
        /// Container name
        container: String,
    },
}

/// Result of patching one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// At least one container was instrumented
    Patched(UnitSummary),
    /// Included unit without any eligible workload container; nothing changed
    NoEligibleContainers,
}

/// What changed on a patched unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitSummary {
    /// Compute unit
    pub unit: String,
    /// Instrumented workload containers
    pub containers: Vec<String>,
    /// Injected sidecars
    pub sidecars: Vec<String>,
    /// Role that received grants
    pub role: Option<String>,
    /// Policy keys written to the role
    pub grants: Vec<String>,
    /// Observations
    pub warnings: Vec<PatchWarning>,
}

/// Applies one build spec to task definitions
#[derive(Debug)]
pub struct TaskDefinitionPatcher<'a> {
    spec: &'a BuildSpec,
    config: &'a Configuration,
    sidecars: Vec<SidecarPlan<'a>>,
}

impl<'a> TaskDefinitionPatcher<'a> {
    /// Create a patcher; sidecar names are resolved once here
    #[must_use]
    pub fn new(spec: &'a BuildSpec, config: &'a Configuration) -> Self {
        Self {
            spec,
            config,
            sidecars: sidecar::plan(spec),
        }
    }

    /// Resolved sidecars
    #[inline]
    #[must_use]
    pub fn sidecars(&self) -> &[SidecarPlan<'a>] {
        &self.sidecars
    }

    fn sidecar_named(&self, name: &str) -> Option<&SidecarPlan<'a>> {
        self.sidecars.iter().find(|s| s.name == name)
    }

    /// Patch `unit` inside `template`.
    ///
    /// Only the unit's own subtree and its linked role are touched.
    ///
    /// # Errors
    /// [`UnitPatchError`] when the unit or its role has an unusable shape
    pub fn apply(
        &self,
        template: &mut Value,
        unit: &ResourceHandle,
        hints: &InstrumentationHints,
        roles: &BTreeMap<String, ResourceHandle>,
    ) -> Result<UnitOutcome, UnitPatchError> {
        let name = unit.name();
        let resource = unit.resource(template).ok_or_else(|| {
            DocumentError::missing(TreePath::new(&["Resources", name]))
        })?;

        let role = role::execution_role_name(resource)
            .filter(|r| roles.contains_key(*r))
            .map(ToString::to_string);

        if let Some(role_name) = &role {
            let role_resource = roles[role_name].resource(template).ok_or_else(|| {
                DocumentError::missing(TreePath::new(&["Resources", role_name.as_str()]))
            })?;
            role::check_role(role_resource).map_err(|source| UnitPatchError::InvalidRole {
                role: role_name.clone(),
                source,
            })?;
        }

        let resource = unit.resource_mut(template).ok_or_else(|| {
            DocumentError::missing(TreePath::new(&["Resources", name]))
        })?;
        let properties = properties_mut(resource)?;
        let Some(mut summary) = self.patch_containers(name, properties, hints)? else {
            return Ok(UnitOutcome::NoEligibleContainers);
        };

        match role {
            Some(role_name) => {
                let handle = &roles[&role_name];
                let role_resource = handle.resource_mut(template).ok_or_else(|| {
                    DocumentError::missing(TreePath::new(&["Resources", role_name.as_str()]))
                })?;
                summary.grants = role::merge_policies(role_resource, &self.spec.policies)
                    .map_err(|source| UnitPatchError::InvalidRole {
                        role: role_name.clone(),
                        source,
                    })?;
                summary.role = Some(role_name);
            }
            None => {
                tracing::warn!(resource = name, "no execution role was specified");
                summary.warnings.push(PatchWarning::UnresolvedRole {
                    unit: name.to_string(),
                });
            }
        }

        Ok(UnitOutcome::Patched(summary))
    }

    /// Steps 2 and 3. `None` when no container is eligible.
    fn patch_containers(
        &self,
        unit: &str,
        properties: &mut Map<String, Value>,
        hints: &InstrumentationHints,
    ) -> Result<Option<UnitSummary>, UnitPatchError> {
        let containers = match properties.get("ContainerDefinitions") {
            None | Some(Value::Null) => return Err(UnitPatchError::NoContainerDefinitions),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(DocumentError::type_mismatch(
                    TreePath::new(&["Properties", "ContainerDefinitions"]),
                    "array",
                    kind(other),
                )
                .into())
            }
        };

        let mut eligible = Vec::new();
        for (index, def) in containers.iter().enumerate() {
            let container = def.as_object().ok_or_else(|| UnitPatchError::InvalidContainer {
                index,
                source: DocumentError::type_mismatch(TreePath::root(), "object", kind(def)),
            })?;
            let container_name = container::container_name(container);
            if let Some(plan) = self.sidecar_named(container_name) {
                if !sidecar::is_injected(container, plan) {
                    return Err(UnitPatchError::SidecarNameConflict {
                        container: container_name.to_string(),
                    });
                }
                continue;
            }
            if !hints.is_container_eligible(container_name, self.config.opt_in) {
                tracing::debug!(resource = unit, container = container_name, "container not eligible");
                continue;
            }
            container::check_shape(container)
                .and_then(|()| entrypoint::current_process(container).map(|_| ()))
                .map_err(|source| UnitPatchError::InvalidContainer { index, source })?;
            eligible.push(index);
        }

        if eligible.is_empty() {
            return Ok(None);
        }
        if !self.sidecars.is_empty() {
            sidecar::check_volumes(properties)?;
        }

        let mut summary = UnitSummary {
            unit: unit.to_string(),
            ..UnitSummary::default()
        };

        let Some(containers) = properties
            .get_mut("ContainerDefinitions")
            .and_then(Value::as_array_mut)
        else {
            return Err(UnitPatchError::NoContainerDefinitions);
        };
        for index in eligible {
            let Some(container) = containers[index].as_object_mut() else {
                continue;
            };
            let container_name = container::container_name(container).to_string();
            let outcome = entrypoint::wrap(container, self.spec, self.config.entrypoint_strategy)
                .map_err(|source| UnitPatchError::InvalidContainer { index, source })?;
            container::merge_environment(container, &self.spec.env)
                .map_err(|source| UnitPatchError::InvalidContainer { index, source })?;
            for plan in &self.sidecars {
                container::add_volumes_from(container, &plan.name)
                    .map_err(|source| UnitPatchError::InvalidContainer { index, source })?;
            }

            if matches!(outcome, WrapOutcome::Wrapped { original_known: false }) {
                tracing::warn!(
                    resource = unit,
                    container = container_name.as_str(),
                    "container declares no entrypoint or command; image defaults are not preserved"
                );
                summary.warnings.push(PatchWarning::UnknownOriginalProcess {
                    unit: unit.to_string(),
                    container: container_name.clone(),
                });
            }
            tracing::debug!(resource = unit, container = container_name.as_str(), ?outcome, "patched container");
            summary.containers.push(container_name);
        }

        for plan in &self.sidecars {
            sidecar::upsert(containers, sidecar::definition(plan, unit, self.config));
            summary.sidecars.push(plan.name.clone());
        }

        if !self.sidecars.is_empty() {
            let volumes = properties
                .entry("Volumes".to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if volumes.is_null() {
                *volumes = Value::Array(Vec::new());
            }
            if let Some(volumes) = volumes.as_array_mut() {
                for plan in &self.sidecars {
                    sidecar::declare_volumes(volumes, plan);
                }
            }
        }

        Ok(Some(summary))
    }
}

fn properties_mut(resource: &mut Value) -> Result<&mut Map<String, Value>, UnitPatchError> {
    match resource.lookup_mut(&["Properties"]) {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(DocumentError::type_mismatch(
            TreePath::new(&["Properties"]),
            "object",
            kind(other),
        )
        .into()),
        None => Err(DocumentError::missing(TreePath::new(&["Properties"])).into()),
    }
}
