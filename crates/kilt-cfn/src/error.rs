//! Error types for template patching
//!
//! - [`DocumentError`]: a lookup in the untyped tree found nothing or the wrong shape
//! - [`UnitPatchError`]: one compute unit could not be patched; the run continues
//! - [`PatchError`]: the whole run failed and produced no output

use crate::document::TreePath;

/// Errors from path-based tree access
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Required subtree absent
    #[error("missing required value at {path}")]
    Missing { path: TreePath },

    /// Value present with an unexpected type
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: TreePath,
        expected: &'static str,
        found: &'static str,
    },
}

impl DocumentError {
    /// Create missing-value error
    #[inline]
    pub fn missing(path: TreePath) -> Self {
        Self::Missing { path }
    }

    /// Create type mismatch error
    #[inline]
    pub fn type_mismatch(path: TreePath, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            path,
            expected,
            found,
        }
    }
}

/// Errors that abort patching of a single compute unit
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitPatchError {
    /// Unit has no container list to patch
    #[error("task definition has no ContainerDefinitions")]
    NoContainerDefinitions,

    /// A container definition has an unusable shape
    #[error("container definition {index} is invalid: {source}")]
    InvalidContainer {
        index: usize,
        #[source]
        source: DocumentError,
    },

    /// A workload container already uses the name of a sidecar to inject
    #[error("container {container} is not an injected sidecar but uses a sidecar name")]
    SidecarNameConflict { container: String },

    /// The linked role has an unusable shape
    #[error("execution role {role} is invalid: {source}")]
    InvalidRole {
        role: String,
        #[source]
        source: DocumentError,
    },

    /// Other tree access failure
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Fatal errors: nothing is patched and no output is produced
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Input is not a JSON document
    #[error("failed to parse template: {0}")]
    Parse(#[source] serde_json::Error),

    /// Input is JSON but not shaped like a template
    #[error("malformed template: {0}")]
    MalformedTemplate(#[from] DocumentError),

    /// Output could not be serialized
    #[error("failed to serialize template: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Result type alias for whole-run operations
pub type PatchResult<T> = Result<T, PatchError>;
