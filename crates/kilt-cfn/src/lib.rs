//! Kilt CloudFormation patcher
//!
//! Instruments Fargate task definitions in a CloudFormation template:
//!
//! - [`classify`]: find compute units and IAM roles
//! - [`tags`]: flatten resource tags for the inclusion policy
//! - [`patch`]: wrap containers, inject sidecars, grant policies
//! - [`patcher`]: drive a whole template through the above
//!
//! # Example
//!
//! ```rust,ignore
//! use kilt_cfn::patcher;
//! use kilt_core::{loader, Configuration};
//!
//! let spec = loader::load_build_spec_file("recipe.yaml")?;
//! let output = patcher::patch(&template, &Configuration::new(), &spec)?;
//! if !output.is_success() {
//!     for failure in &output.report.failed {
//!         eprintln!("{}: {}", failure.unit, failure.error);
//!     }
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod classify;
pub mod document;
pub mod error;
pub mod patch;
pub mod patcher;
pub mod tags;

// Re-exports for convenience
pub use classify::{classify, Classification, ResourceHandle};
pub use document::{Tree, TreePath};
pub use error::{DocumentError, PatchError, PatchResult, UnitPatchError};
pub use patch::{PatchWarning, TaskDefinitionPatcher, UnitOutcome, UnitSummary};
pub use patcher::{patch, patch_value, PatchOutput, PatchReport, SkipReason, UnitFailure};
pub use tags::CfnTags;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
