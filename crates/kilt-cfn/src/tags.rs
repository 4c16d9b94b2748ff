//! CloudFormation tag extraction
//!
//! `Properties.Tags` is normally a list of `{Key, Value}` pairs; some resource
//! types use a plain key/value object instead. Both flatten to [`Tags`].

use kilt_core::{TagSource, Tags};
use serde_json::Value;

use crate::document::Tree;

/// Tags of one CloudFormation resource
#[derive(Debug, Clone, Copy)]
pub struct CfnTags<'a>(&'a Value);

impl<'a> CfnTags<'a> {
    /// Wrap a resource subtree
    #[inline]
    #[must_use]
    pub fn new(resource: &'a Value) -> Self {
        Self(resource)
    }
}

impl TagSource for CfnTags<'_> {
    fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        match self.0.lookup(&["Properties", "Tags"]) {
            Some(Value::Array(pairs)) => {
                for pair in pairs {
                    if let Some(key) = pair.str_at(&["Key"]) {
                        let value = pair.lookup(&["Value"]).map(scalar).unwrap_or_default();
                        tags.insert(key.to_string(), value);
                    }
                }
            }
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    tags.insert(key.clone(), scalar(value));
                }
            }
            _ => {}
        }
        tags
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
