//! Patch orchestration
//!
//! Parse once, classify once, patch every included compute unit, serialize
//! once. A unit that fails is reported and left alone; the run goes on.

use kilt_core::inclusion::{hints, is_included};
use kilt_core::{BuildSpec, Configuration, TagSource};
use serde_json::Value;

use crate::classify::classify;
use crate::document::{kind, TreePath};
use crate::error::{DocumentError, PatchError, PatchResult, UnitPatchError};
use crate::patch::{PatchWarning, TaskDefinitionPatcher, UnitOutcome, UnitSummary};
use crate::tags::CfnTags;

/// Why an included-looking unit was not patched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Tags exclude the unit under the active inclusion mode
    Ignored,
    /// Unit included but none of its containers is eligible
    NoEligibleContainers,
}

/// A unit whose patch was aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Compute unit
    pub unit: String,
    /// Cause
    pub error: UnitPatchError,
}

/// Aggregate result of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Units that were instrumented
    pub patched: Vec<UnitSummary>,
    /// Units left untouched on purpose
    pub skipped: Vec<(String, SkipReason)>,
    /// Units whose patch failed
    pub failed: Vec<UnitFailure>,
}

impl PatchReport {
    /// No unit failed
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Warnings of every patched unit
    pub fn warnings(&self) -> impl Iterator<Item = &PatchWarning> {
        self.patched.iter().flat_map(|s| s.warnings.iter())
    }
}

/// Serialized template plus what happened to it
#[derive(Debug)]
pub struct PatchOutput {
    /// Patched template, compact JSON in input key order
    pub document: Vec<u8>,
    /// Per-unit report
    pub report: PatchReport,
}

impl PatchOutput {
    /// No unit failed
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

/// Patch a serialized template.
///
/// # Errors
/// [`PatchError`] if the input cannot be parsed, is not a template, or the
/// result cannot be serialized. Per-unit failures are in the report instead.
pub fn patch(document: &[u8], config: &Configuration, spec: &BuildSpec) -> PatchResult<PatchOutput> {
    let mut template: Value = serde_json::from_slice(document).map_err(PatchError::Parse)?;
    let report = patch_value(&mut template, config, spec)?;
    let document = serde_json::to_vec(&template).map_err(PatchError::Serialize)?;
    Ok(PatchOutput { document, report })
}

/// Patch an already parsed template in place.
///
/// # Errors
/// [`PatchError::MalformedTemplate`] if the root is not an object
pub fn patch_value(
    template: &mut Value,
    config: &Configuration,
    spec: &BuildSpec,
) -> PatchResult<PatchReport> {
    if !template.is_object() {
        return Err(DocumentError::type_mismatch(TreePath::root(), "object", kind(template)).into());
    }

    let span = tracing::info_span!(
        "patch",
        opt_in = config.opt_in,
        kilt_version = config.kilt_version.as_str()
    );
    let _guard = span.enter();

    let classification = classify(template);
    let patcher = TaskDefinitionPatcher::new(spec, config);
    let mut report = PatchReport::default();

    for (name, unit) in &classification.compute_units {
        let tags = match unit.resource(template) {
            Some(resource) => CfnTags::new(resource).tags(),
            None => continue,
        };

        if !is_included(&tags, config.opt_in) {
            tracing::info!(resource = name.as_str(), "ignored resource due to tag");
            report.skipped.push((name.clone(), SkipReason::Ignored));
            continue;
        }

        match patcher.apply(template, unit, &hints(&tags), &classification.roles) {
            Ok(UnitOutcome::Patched(summary)) => {
                tracing::info!(
                    resource = name.as_str(),
                    containers = summary.containers.len(),
                    sidecars = summary.sidecars.len(),
                    grants = summary.grants.len(),
                    "patched task definition"
                );
                report.patched.push(summary);
            }
            Ok(UnitOutcome::NoEligibleContainers) => {
                tracing::info!(resource = name.as_str(), "no eligible containers");
                report
                    .skipped
                    .push((name.clone(), SkipReason::NoEligibleContainers));
            }
            Err(error) => {
                tracing::error!(resource = name.as_str(), %error, "could not patch task definition");
                report.failed.push(UnitFailure {
                    unit: name.clone(),
                    error,
                });
            }
        }
    }

    Ok(report)
}
