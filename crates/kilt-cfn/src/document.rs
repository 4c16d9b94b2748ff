//! Generic document tree access
//!
//! Templates stay untyped [`serde_json::Value`] trees (with key order
//! preserved). Every lookup here is an explicit existence + type check that
//! yields `None` or a [`DocumentError`] instead of panicking.

use std::fmt::{self, Display, Formatter};

use serde_json::{Map, Value};

use crate::error::DocumentError;

/// Path within a document tree
///
/// # Examples
/// - `["Resources", "App", "Properties"]` → `Resources.App.Properties`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<String>);

impl TreePath {
    /// Empty path (root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Create path from segments
    #[must_use]
    pub fn new(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| (*s).to_string()).collect())
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl Display for TreePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

/// Name of a value's variant, for diagnostics
#[must_use]
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Path-based access over a document tree
pub trait Tree {
    /// Value at `path`, if every step exists and is an object
    fn lookup(&self, path: &[&str]) -> Option<&Value>;

    /// Mutable value at `path`
    fn lookup_mut(&mut self, path: &[&str]) -> Option<&mut Value>;

    /// Whether `path` exists
    fn exists(&self, path: &[&str]) -> bool {
        self.lookup(path).is_some()
    }

    /// String at `path`; `None` when missing or not a string
    fn str_at(&self, path: &[&str]) -> Option<&str> {
        self.lookup(path).and_then(Value::as_str)
    }

    /// Array at `path`; `None` when missing or not an array
    fn array_at(&self, path: &[&str]) -> Option<&Vec<Value>> {
        self.lookup(path).and_then(Value::as_array)
    }

    /// Object at `path`, creating missing intermediate objects.
    ///
    /// # Errors
    /// [`DocumentError::TypeMismatch`] if an existing step is not an object
    fn ensure_object(&mut self, path: &[&str]) -> Result<&mut Map<String, Value>, DocumentError>;

    /// Array at `path`, creating it (and missing parents) when absent.
    ///
    /// # Errors
    /// [`DocumentError::TypeMismatch`] if the existing value or a parent has
    /// the wrong type
    fn ensure_array(&mut self, path: &[&str]) -> Result<&mut Vec<Value>, DocumentError>;
}

impl Tree for Value {
    fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    fn lookup_mut(&mut self, path: &[&str]) -> Option<&mut Value> {
        let mut current = self;
        for segment in path {
            current = current.as_object_mut()?.get_mut(*segment)?;
        }
        Some(current)
    }

    fn ensure_object(&mut self, path: &[&str]) -> Result<&mut Map<String, Value>, DocumentError> {
        let mut current = self;
        let mut walked = TreePath::root();
        for segment in path {
            let found = kind(current);
            let map = current
                .as_object_mut()
                .ok_or_else(|| DocumentError::type_mismatch(walked.clone(), "object", found))?;
            walked = walked.child(*segment);
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let found = kind(current);
        current
            .as_object_mut()
            .ok_or_else(|| DocumentError::type_mismatch(walked, "object", found))
    }

    fn ensure_array(&mut self, path: &[&str]) -> Result<&mut Vec<Value>, DocumentError> {
        let Some((last, parents)) = path.split_last() else {
            let found = kind(self);
            return self
                .as_array_mut()
                .ok_or_else(|| DocumentError::type_mismatch(TreePath::root(), "array", found));
        };

        let parent = self.ensure_object(parents)?;
        let slot = parent
            .entry((*last).to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        let found = kind(slot);
        slot.as_array_mut()
            .ok_or_else(|| DocumentError::type_mismatch(TreePath::new(path), "array", found))
    }
}

/// Read a list of strings.
///
/// `Ok(None)` when absent (or null), an error when present with another shape.
///
/// # Errors
/// [`DocumentError::TypeMismatch`] if the value is not an array of strings
pub fn string_list(value: Option<&Value>, path: &TreePath) -> Result<Option<Vec<String>>, DocumentError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        Value::Null => Ok(None),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    DocumentError::type_mismatch(path.child(i.to_string()), "string", kind(item))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        other => Err(DocumentError::type_mismatch(path.clone(), "array", kind(other))),
    }
}

/// Turn a list of strings into an array value
#[must_use]
pub fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_and_exists() {
        let doc = json!({"Resources": {"App": {"Type": "AWS::ECS::TaskDefinition"}}});

        assert_eq!(
            doc.str_at(&["Resources", "App", "Type"]),
            Some("AWS::ECS::TaskDefinition")
        );
        assert!(doc.exists(&["Resources", "App"]));
        assert!(!doc.exists(&["Resources", "Missing"]));
        assert!(!doc.exists(&["Resources", "App", "Type", "Deeper"]));
        assert_eq!(doc.str_at(&["Resources"]), None);
    }

    #[test]
    fn ensure_array_creates_missing() {
        let mut doc = json!({"Properties": {}});
        doc.ensure_array(&["Properties", "Policies"])
            .unwrap()
            .push(json!("x"));
        assert_eq!(doc, json!({"Properties": {"Policies": ["x"]}}));
    }

    #[test]
    fn ensure_array_rejects_wrong_type() {
        let mut doc = json!({"Properties": {"Policies": "nope"}});
        let err = doc.ensure_array(&["Properties", "Policies"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "type mismatch at Properties.Policies: expected array, found string"
        );
    }

    #[test]
    fn ensure_object_rejects_scalar_parent() {
        let mut doc = json!({"Properties": 3});
        let err = doc.ensure_object(&["Properties", "Inner"]).unwrap_err();
        assert!(matches!(err, DocumentError::TypeMismatch { .. }));
    }

    #[test]
    fn string_list_shapes() {
        let path = TreePath::new(&["EntryPoint"]);
        assert_eq!(string_list(None, &path).unwrap(), None);
        assert_eq!(string_list(Some(&json!(null)), &path).unwrap(), None);
        assert_eq!(
            string_list(Some(&json!(["a", "b"])), &path).unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        let err = string_list(Some(&json!(["a", 1])), &path).unwrap_err();
        assert!(err.to_string().contains("EntryPoint.1"));
        assert!(string_list(Some(&json!("a")), &path).is_err());
    }

    #[test]
    fn tree_path_display() {
        assert_eq!(TreePath::root().to_string(), "<root>");
        assert_eq!(TreePath::new(&["a", "b"]).segments(), &["a", "b"]);
        assert_eq!(
            TreePath::new(&["Resources"]).child("App").to_string(),
            "Resources.App"
        );
    }
}
