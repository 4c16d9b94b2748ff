//! Entrypoint wrapping
//!
//! The wrapped container runs `spec.entry_point` as its entrypoint; the
//! original entrypoint and command follow `spec.command` so the wrapper can
//! exec the original process.
//!
//! ```text
//! append:  EntryPoint = spec.entry_point
//!          Command    = spec.command ++ original.EntryPoint ++ original.Command
//! blob:    EntryPoint = spec.entry_point
//!          Command    = spec.command ++ ['{"EntryPoint":[..],"Command":[..]}']
//! ```

use kilt_core::{BuildSpec, EntrypointStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{string_array, string_list, TreePath};
use crate::error::DocumentError;

/// What wrapping did to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapOutcome {
    /// Entrypoint rewritten
    Wrapped {
        /// Container declared its own entrypoint or command
        original_known: bool,
    },
    /// Container already wrapped with this spec
    AlreadyWrapped,
    /// Build spec has no entrypoint to wrap with
    NotWrapping,
}

/// Entrypoint and command a container ran before wrapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalProcess {
    /// Original `EntryPoint`
    #[serde(rename = "EntryPoint", default)]
    pub entry_point: Vec<String>,
    /// Original `Command`
    #[serde(rename = "Command", default)]
    pub command: Vec<String>,
}

impl OriginalProcess {
    /// Full argument vector of the original process
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        self.entry_point
            .iter()
            .chain(&self.command)
            .cloned()
            .collect()
    }

    fn encode(&self) -> String {
        serde_json::json!({
            "EntryPoint": self.entry_point,
            "Command": self.command,
        })
        .to_string()
    }
}

/// Current `EntryPoint` and `Command` of a container; absent lists are empty.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if either is not a list of strings
pub fn current_process(container: &Map<String, Value>) -> Result<OriginalProcess, DocumentError> {
    let entry_point = string_list(container.get("EntryPoint"), &TreePath::new(&["EntryPoint"]))?;
    let command = string_list(container.get("Command"), &TreePath::new(&["Command"]))?;
    Ok(OriginalProcess {
        entry_point: entry_point.unwrap_or_default(),
        command: command.unwrap_or_default(),
    })
}

/// Recover the original process of a container wrapped with `spec`.
///
/// Returns `None` if the container is not wrapped with `spec` under
/// `strategy`. With [`EntrypointStrategy::Append`] only the argument vector
/// survives, so it comes back as `entry_point` with an empty `command`.
#[must_use]
pub fn original_process(
    container: &Map<String, Value>,
    spec: &BuildSpec,
    strategy: EntrypointStrategy,
) -> Option<OriginalProcess> {
    let current = current_process(container).ok()?;
    if !spec.wraps_entry_point() || current.entry_point != spec.entry_point {
        return None;
    }
    let tail = current.command.strip_prefix(spec.command.as_slice())?;

    match strategy {
        EntrypointStrategy::Append => Some(OriginalProcess {
            entry_point: tail.to_vec(),
            command: Vec::new(),
        }),
        EntrypointStrategy::Blob => match tail {
            [blob] => serde_json::from_str(blob).ok(),
            _ => None,
        },
    }
}

/// Rewrite a container's entrypoint and command around `spec.entry_point`.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if `EntryPoint` or `Command` is not a list
/// of strings
pub fn wrap(
    container: &mut Map<String, Value>,
    spec: &BuildSpec,
    strategy: EntrypointStrategy,
) -> Result<WrapOutcome, DocumentError> {
    let original = current_process(container)?;

    if !spec.wraps_entry_point() {
        return Ok(WrapOutcome::NotWrapping);
    }
    if original_process(container, spec, strategy).is_some() {
        return Ok(WrapOutcome::AlreadyWrapped);
    }

    let mut command = spec.command.clone();
    match strategy {
        EntrypointStrategy::Append => command.extend(original.argv()),
        EntrypointStrategy::Blob => command.push(original.encode()),
    }

    container.insert("EntryPoint".to_string(), string_array(&spec.entry_point));
    container.insert("Command".to_string(), string_array(&command));

    Ok(WrapOutcome::Wrapped {
        original_known: !original.argv().is_empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn container(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("fixture must be an object"),
        }
    }

    fn spec() -> BuildSpec {
        BuildSpec::new()
            .with_entry_point(["/kilt/wrap"])
            .with_command(["--mode", "trace"])
    }

    #[test]
    fn append_wraps_entry_point_and_command() {
        let mut c = container(json!({"Name": "api", "EntryPoint": ["/bin/api"], "Command": ["serve"]}));
        let outcome = wrap(&mut c, &spec(), EntrypointStrategy::Append).unwrap();

        assert_eq!(outcome, WrapOutcome::Wrapped { original_known: true });
        assert_eq!(c["EntryPoint"], json!(["/kilt/wrap"]));
        assert_eq!(c["Command"], json!(["--mode", "trace", "/bin/api", "serve"]));
    }

    #[test]
    fn blob_keeps_entry_point_command_split() {
        let mut c = container(json!({"EntryPoint": ["/bin/api"], "Command": ["serve"]}));
        wrap(&mut c, &spec(), EntrypointStrategy::Blob).unwrap();

        let original = original_process(&c, &spec(), EntrypointStrategy::Blob).unwrap();
        assert_eq!(original.entry_point, vec!["/bin/api"]);
        assert_eq!(original.command, vec!["serve"]);
    }

    #[test]
    fn rewrap_is_a_no_op() {
        for strategy in [EntrypointStrategy::Append, EntrypointStrategy::Blob] {
            let mut c = container(json!({"EntryPoint": ["/bin/api"]}));
            wrap(&mut c, &spec(), strategy).unwrap();
            let once = c.clone();

            assert_eq!(wrap(&mut c, &spec(), strategy).unwrap(), WrapOutcome::AlreadyWrapped);
            assert_eq!(c, once);
        }
    }

    #[test]
    fn empty_wrapper_entry_point_leaves_container() {
        let mut c = container(json!({"EntryPoint": ["/bin/api"]}));
        let before = c.clone();
        let outcome = wrap(&mut c, &BuildSpec::new(), EntrypointStrategy::Append).unwrap();
        assert_eq!(outcome, WrapOutcome::NotWrapping);
        assert_eq!(c, before);
    }

    #[test]
    fn unknown_original_is_reported() {
        let mut c = container(json!({"Name": "api", "Image": "api:1"}));
        let outcome = wrap(&mut c, &spec(), EntrypointStrategy::Append).unwrap();
        assert_eq!(outcome, WrapOutcome::Wrapped { original_known: false });
        assert_eq!(c["Command"], json!(["--mode", "trace"]));
    }

    #[test]
    fn non_list_entry_point_is_rejected() {
        let mut c = container(json!({"EntryPoint": {"Fn::Split": [" ", "a b"]}}));
        assert!(wrap(&mut c, &spec(), EntrypointStrategy::Append).is_err());
    }
}
