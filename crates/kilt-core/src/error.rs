//! Error types for recipe and configuration loading
//!
//! Every load failure is fatal: nothing is patched when the build spec or
//! configuration cannot be constructed.

use crate::build::MissingFields;
use std::path::PathBuf;

/// Errors while loading a build recipe or a configuration file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// IO error during file read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The text is not valid for its format
    #[error("{format} syntax error: {message}")]
    Syntax {
        format: &'static str,
        message: String,
    },

    /// File extension does not map to a known format
    #[error("unsupported recipe format: '{0}'")]
    UnsupportedFormat(String),

    /// A mount entry lacks required fields
    #[error("error at mounts[{index}]: image, volumes and entry_point are all required (missing: {missing})")]
    InvalidMount { index: usize, missing: MissingFields },

    /// A policy entry lacks required fields
    #[error("error at policies[{index}]: version, effect, action and resource are all required (missing: {missing})")]
    InvalidPolicy { index: usize, missing: MissingFields },

    /// Configuration value rejected
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl LoadError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create syntax error for a format
    pub fn syntax(format: &'static str, message: impl ToString) -> Self {
        Self::Syntax {
            format,
            message: message.to_string(),
        }
    }

    /// Array position of the offending entry, for indexed errors
    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::InvalidMount { index, .. } | Self::InvalidPolicy { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type alias for load operations
pub type LoadResult<T> = Result<T, LoadError>;
