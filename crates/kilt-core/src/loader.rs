//! Recipe loader
//!
//! Reads a build recipe (YAML, JSON or TOML) into a validated [`BuildSpec`].
//!
//! Recipe shape:
//! ```yaml
//! build:
//!   image: "kilt:latest"
//!   entry_point: ["/kilt/run"]
//!   command: ["--"]
//!   environment_variables:
//!     KILT_MODE: trace
//!   mount:
//!     - name: KiltAgent
//!       image: "kilt-agent:1"
//!       volumes: ["/kilt"]
//!       entry_point: ["/kilt/install"]
//!   execution_policies:
//!     - name: secrets
//!       version: "2012-10-17"
//!       effect: Allow
//!       action: ["secretsmanager:GetSecretValue"]
//!       resource: ["*"]
//! ```
//!
//! Either the whole recipe loads, or the first offending `mount` or
//! `execution_policies` entry is reported by index.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::build::{BuildSpec, MountResource, PolicyStatement};
use crate::error::{LoadError, LoadResult};

/// Text format of a recipe or configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFormat {
    /// YAML (also accepts plain JSON)
    Yaml,
    /// JSON
    Json,
    /// TOML
    Toml,
}

impl RecipeFormat {
    /// Pick the format from a file extension
    ///
    /// # Errors
    /// Returns [`LoadError::UnsupportedFormat`] for unknown extensions
    pub fn from_path(path: &Path) -> LoadResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Human-readable name used in error messages
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Deserialize `text` in this format
    ///
    /// # Errors
    /// Returns [`LoadError::Syntax`] if the text does not match `T`
    pub fn parse<T: serde::de::DeserializeOwned>(self, text: &str) -> LoadResult<T> {
        match self {
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| LoadError::syntax(self.name(), e)),
            Self::Json => serde_json::from_str(text).map_err(|e| LoadError::syntax(self.name(), e)),
            Self::Toml => toml::from_str(text).map_err(|e| LoadError::syntax(self.name(), e)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawRecipe {
    #[serde(default)]
    build: RawBuild,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    entry_point: Option<Vec<String>>,
    #[serde(default)]
    command: Option<Vec<String>>,
    #[serde(default)]
    environment_variables: Option<IndexMap<String, Value>>,
    #[serde(default)]
    mount: Option<Vec<RawMount>>,
    #[serde(default)]
    execution_policies: Option<Vec<RawPolicy>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMount {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    volumes: Option<Vec<String>>,
    #[serde(default)]
    entry_point: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPolicy {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    effect: Option<String>,
    #[serde(default)]
    action: Option<Vec<String>>,
    #[serde(default)]
    resource: Option<Vec<String>>,
}

/// Load a build spec from recipe text.
///
/// # Errors
/// Returns [`LoadError::Syntax`] for malformed text or non-scalar environment
/// values, and [`LoadError::InvalidMount`] / [`LoadError::InvalidPolicy`] with
/// the first offending index.
pub fn load_build_spec(text: &str, format: RecipeFormat) -> LoadResult<BuildSpec> {
    let raw: RawRecipe = format.parse(text)?;
    let build = raw.build;

    let mut env = IndexMap::new();
    for (name, value) in build.environment_variables.unwrap_or_default() {
        let value = scalar_to_string(&value).ok_or_else(|| {
            LoadError::syntax(
                format.name(),
                format!("environment variable '{name}' must be a scalar"),
            )
        })?;
        env.insert(name, value);
    }

    let mut mounts = Vec::new();
    for (index, m) in build.mount.unwrap_or_default().into_iter().enumerate() {
        let mount = MountResource::new(
            m.name.unwrap_or_default(),
            m.image.unwrap_or_default(),
            m.volumes.unwrap_or_default(),
            m.entry_point.unwrap_or_default(),
        )
        .map_err(|missing| LoadError::InvalidMount { index, missing })?;
        mounts.push(mount);
    }

    let mut policies = Vec::new();
    for (index, p) in build
        .execution_policies
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        let policy = PolicyStatement::new(
            p.name.unwrap_or_default(),
            p.version.unwrap_or_default(),
            p.effect.unwrap_or_default(),
            p.action.unwrap_or_default(),
            p.resource.unwrap_or_default(),
        )
        .map_err(|missing| LoadError::InvalidPolicy { index, missing })?;
        policies.push(policy);
    }

    let spec = BuildSpec {
        image: build.image.unwrap_or_default(),
        entry_point: build.entry_point.unwrap_or_default(),
        command: build.command.unwrap_or_default(),
        env,
        mounts,
        policies,
    };

    tracing::debug!(
        mounts = spec.mounts.len(),
        policies = spec.policies.len(),
        env = spec.env.len(),
        "loaded build spec"
    );

    Ok(spec)
}

/// Load a build spec from a recipe file, choosing the format by extension.
///
/// # Errors
/// Returns [`LoadError::Io`] if the file cannot be read, otherwise as
/// [`load_build_spec`].
pub fn load_build_spec_file(path: impl AsRef<Path>) -> LoadResult<BuildSpec> {
    let path = path.as_ref();
    let format = RecipeFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::io_error(path, e))?;
    load_build_spec(&text, format)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
