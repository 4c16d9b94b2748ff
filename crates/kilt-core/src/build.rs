//! Build spec model
//!
//! Typed description of what gets injected into a compute unit: the wrapping
//! entrypoint, extra environment, sidecar mounts and execution-policy grants.

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::Serialize;

/// Everything the patcher injects into an instrumented compute unit.
///
/// `entry_point` and `command` are plain vectors: an absent recipe value
/// loads as an empty sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSpec {
    /// Base agent image
    pub image: String,
    /// Entrypoint that wraps the workload's original process
    pub entry_point: Vec<String>,
    /// Leading arguments passed to the wrapping entrypoint
    pub command: Vec<String>,
    /// Environment injected into every wrapped container, in recipe order
    pub env: IndexMap<String, String>,
    /// Sidecars providing the instrumentation payload
    pub mounts: Vec<MountResource>,
    /// Statements granted to the unit's execution role
    pub policies: Vec<PolicyStatement>,
}

impl BuildSpec {
    /// Create an empty build spec
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With base image
    #[inline]
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// With wrapping entrypoint
    #[must_use]
    pub fn with_entry_point<I, S>(mut self, entry_point: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_point = entry_point.into_iter().map(Into::into).collect();
        self
    }

    /// With leading command arguments
    #[must_use]
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// With one more environment variable
    #[inline]
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// With one more sidecar mount
    #[inline]
    #[must_use]
    pub fn with_mount(mut self, mount: MountResource) -> Self {
        self.mounts.push(mount);
        self
    }

    /// With one more policy grant
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: PolicyStatement) -> Self {
        self.policies.push(policy);
        self
    }

    /// Whether this build spec wraps entrypoints at all
    #[inline]
    #[must_use]
    pub fn wraps_entry_point(&self) -> bool {
        !self.entry_point.is_empty()
    }
}

/// Names of required fields that were absent or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingFields(Vec<&'static str>);

impl MissingFields {
    fn check(mut self, field: &'static str, present: bool) -> Self {
        if !present {
            self.0.push(field);
        }
        self
    }

    fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Missing field names, in declaration order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[&'static str] {
        &self.0
    }
}

impl Display for MissingFields {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

/// A sidecar container that ships the instrumentation payload on shared volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountResource {
    name: String,
    image: String,
    volumes: Vec<String>,
    entry_point: Vec<String>,
}

impl MountResource {
    /// Create a validated mount.
    ///
    /// `name` may be empty; the patcher derives a default from the image.
    ///
    /// # Errors
    /// Returns the missing fields when `image`, `volumes` or `entry_point` is empty.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        volumes: Vec<String>,
        entry_point: Vec<String>,
    ) -> Result<Self, MissingFields> {
        let image = image.into();
        MissingFields::default()
            .check("image", !image.is_empty())
            .check("volumes", !volumes.is_empty())
            .check("entry_point", !entry_point.is_empty())
            .into_result()?;

        Ok(Self {
            name: name.into(),
            image,
            volumes,
            entry_point,
        })
    }

    /// Declared sidecar name, possibly empty
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sidecar image
    #[inline]
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Container paths shared with the workload
    #[inline]
    #[must_use]
    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    /// Sidecar entrypoint
    #[inline]
    #[must_use]
    pub fn entry_point(&self) -> &[String] {
        &self.entry_point
    }
}

/// One execution-policy grant.
///
/// `effect` is expected to be `Allow` or `Deny`; the cloud provider enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyStatement {
    name: String,
    version: String,
    effect: String,
    actions: Vec<String>,
    resources: Vec<String>,
}

impl PolicyStatement {
    /// Create a validated policy statement.
    ///
    /// # Errors
    /// Returns the missing fields when `version`, `effect`, `actions` or
    /// `resources` is empty.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        effect: impl Into<String>,
        actions: Vec<String>,
        resources: Vec<String>,
    ) -> Result<Self, MissingFields> {
        let version = version.into();
        let effect = effect.into();
        MissingFields::default()
            .check("version", !version.is_empty())
            .check("effect", !effect.is_empty())
            .check("action", !actions.is_empty())
            .check("resource", !resources.is_empty())
            .into_result()?;

        Ok(Self {
            name: name.into(),
            version,
            effect,
            actions,
            resources,
        })
    }

    /// Declared name, possibly empty
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key under which the grant is merged: the name, or the version if unnamed
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        if self.name.is_empty() {
            &self.version
        } else {
            &self.name
        }
    }

    /// Policy language version
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `Allow` or `Deny`
    #[inline]
    #[must_use]
    pub fn effect(&self) -> &str {
        &self.effect
    }

    /// Granted actions
    #[inline]
    #[must_use]
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Resources the actions apply to
    #[inline]
    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }
}
