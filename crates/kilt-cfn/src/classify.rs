//! Resource classification
//!
//! One read-only pass over `Resources` that picks out Fargate task
//! definitions (the compute units) and IAM roles (their permission holders).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::document::Tree;

/// CloudFormation type of a task definition
pub const TASK_DEFINITION_TYPE: &str = "AWS::ECS::TaskDefinition";
/// CloudFormation type of an IAM role
pub const IAM_ROLE_TYPE: &str = "AWS::IAM::Role";
/// Execution environment marker for Fargate
pub const FARGATE_COMPATIBILITY: &str = "FARGATE";

/// A classified reference to a resource under `Resources`.
///
/// Holds the logical name rather than a borrow so the tree stays mutable
/// while handles are alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    name: String,
    type_tag: String,
}

impl ResourceHandle {
    /// Create handle
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
        }
    }

    /// Logical resource name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// CloudFormation type
    #[inline]
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The resource subtree
    #[must_use]
    pub fn resource<'a>(&self, template: &'a Value) -> Option<&'a Value> {
        template.lookup(&["Resources", self.name.as_str()])
    }

    /// Mutable resource subtree
    #[must_use]
    pub fn resource_mut<'a>(&self, template: &'a mut Value) -> Option<&'a mut Value> {
        template.lookup_mut(&["Resources", self.name.as_str()])
    }

    /// The resource's `Properties`
    #[must_use]
    pub fn properties<'a>(&self, template: &'a Value) -> Option<&'a Value> {
        template.lookup(&["Resources", self.name.as_str(), "Properties"])
    }
}

/// Name-indexed result of classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Fargate task definitions
    pub compute_units: BTreeMap<String, ResourceHandle>,
    /// IAM roles
    pub roles: BTreeMap<String, ResourceHandle>,
}

/// Classify every resource of a template.
///
/// Resources matching neither predicate are left out. A missing or
/// non-object `Resources` yields an empty classification.
#[must_use]
pub fn classify(template: &Value) -> Classification {
    let mut out = Classification::default();

    let Some(resources) = template.lookup(&["Resources"]).and_then(Value::as_object) else {
        return out;
    };

    for (name, resource) in resources {
        if is_fargate_task_definition(resource) {
            out.compute_units
                .insert(name.clone(), ResourceHandle::new(name, TASK_DEFINITION_TYPE));
        }
        if has_type(resource, IAM_ROLE_TYPE) {
            out.roles
                .insert(name.clone(), ResourceHandle::new(name, IAM_ROLE_TYPE));
        }
    }

    tracing::debug!(
        compute_units = out.compute_units.len(),
        roles = out.roles.len(),
        "classified resources"
    );

    out
}

/// Task definition that lists `FARGATE` among its required compatibilities
#[must_use]
pub fn is_fargate_task_definition(resource: &Value) -> bool {
    has_type(resource, TASK_DEFINITION_TYPE) && requires_fargate(resource)
}

fn requires_fargate(resource: &Value) -> bool {
    resource
        .array_at(&["Properties", "RequiresCompatibilities"])
        .is_some_and(|compat| {
            compat
                .iter()
                .any(|c| c.as_str() == Some(FARGATE_COMPATIBILITY))
        })
}

/// Whether `Type` is a string equal to `resource_type`
#[must_use]
pub fn has_type(resource: &Value, resource_type: &str) -> bool {
    resource.str_at(&["Type"]) == Some(resource_type)
}
