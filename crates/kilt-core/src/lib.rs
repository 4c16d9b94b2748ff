//! Kilt Core
//!
//! Platform-neutral pieces of template instrumentation:
//!
//! - [`BuildSpec`]: what gets injected (wrapping entrypoint, env, sidecars, policy grants)
//! - [`loader`]: recipe files into validated build specs
//! - [`Configuration`]: inclusion mode and sidecar parameters
//! - [`inclusion`]: tag-driven decision of which units and containers are instrumented
//!
//! # Example
//!
//! ```rust,ignore
//! use kilt_core::{inclusion, loader, Configuration};
//!
//! let spec = loader::load_build_spec_file("recipe.yaml")?;
//! let config = Configuration::new().with_opt_in(true);
//!
//! if inclusion::is_included(&tags, config.opt_in) {
//!     let hints = inclusion::hints(&tags);
//!     // hand spec + hints to a platform patcher
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod build;
pub mod config;
pub mod error;
pub mod inclusion;
pub mod loader;

// Re-exports for convenience
pub use build::{BuildSpec, MissingFields, MountResource, PolicyStatement};
pub use config::{Configuration, EntrypointStrategy};
pub use error::{LoadError, LoadResult};
pub use inclusion::{InstrumentationHints, TagSource, Tags};
pub use loader::{load_build_spec, load_build_spec_file, RecipeFormat};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
