//! Patch configuration
//!
//! Options that select the inclusion mode and parameterize injected sidecars.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};
use crate::loader::RecipeFormat;

/// How a container's original entrypoint and command are handed to the
/// wrapping entrypoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrypointStrategy {
    /// Original entrypoint and command follow the build spec command as plain arguments
    #[default]
    Append,
    /// Original entrypoint and command are passed as one JSON-encoded argument
    Blob,
}

impl FromStr for EntrypointStrategy {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "blob" => Ok(Self::Blob),
            other => Err(LoadError::InvalidConfiguration(format!(
                "unknown entrypoint strategy '{other}' (expected append or blob)"
            ))),
        }
    }
}

/// Patch configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Version of the kilt runtime the recipe targets
    pub kilt_version: String,
    /// Secret used to pull sidecar images from a private registry
    pub image_auth_secret: String,
    /// Only instrument units that explicitly ask for it
    pub opt_in: bool,
    /// Opaque recipe parameters
    pub recipe_config: String,
    /// Whether image repository metadata may be consulted
    pub use_repository_hints: bool,
    /// Log group for injected sidecars
    pub log_group: String,
    /// Entrypoint wrapping convention
    pub entrypoint_strategy: EntrypointStrategy,
}

impl Configuration {
    /// Create default (opt-out) configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With inclusion mode
    #[inline]
    #[must_use]
    pub fn with_opt_in(mut self, opt_in: bool) -> Self {
        self.opt_in = opt_in;
        self
    }

    /// With sidecar log group
    #[inline]
    #[must_use]
    pub fn with_log_group(mut self, log_group: impl Into<String>) -> Self {
        self.log_group = log_group.into();
        self
    }

    /// With registry credentials secret
    #[inline]
    #[must_use]
    pub fn with_image_auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.image_auth_secret = secret.into();
        self
    }

    /// With kilt version
    #[inline]
    #[must_use]
    pub fn with_kilt_version(mut self, version: impl Into<String>) -> Self {
        self.kilt_version = version.into();
        self
    }

    /// With recipe parameters
    #[inline]
    #[must_use]
    pub fn with_recipe_config(mut self, recipe_config: impl Into<String>) -> Self {
        self.recipe_config = recipe_config.into();
        self
    }

    /// With repository hints
    #[inline]
    #[must_use]
    pub fn with_repository_hints(mut self, enabled: bool) -> Self {
        self.use_repository_hints = enabled;
        self
    }

    /// With entrypoint wrapping convention
    #[inline]
    #[must_use]
    pub fn with_entrypoint_strategy(mut self, strategy: EntrypointStrategy) -> Self {
        self.entrypoint_strategy = strategy;
        self
    }

    /// Load configuration from a YAML, JSON or TOML file
    ///
    /// # Errors
    /// Returns [`LoadError`] if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let format = RecipeFormat::from_path(path)?;
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::io_error(path, e))?;
        format.parse(&text)
    }
}
