//! Tag-based inclusion policy
//!
//! Decides whether a compute unit is instrumented at all, and which of its
//! containers are. The decision only looks at a flattened tag map, so any
//! platform can reuse it by implementing [`TagSource`].
//!
//! | mode    | unit is instrumented iff                       |
//! |---------|------------------------------------------------|
//! | opt-in  | `kilt-include` or `kilt-include-containers`    |
//! | opt-out | not `kilt-ignore`                              |

use std::collections::BTreeMap;

/// Include the whole unit
pub const KILT_INCLUDE_TAG: &str = "kilt-include";
/// Exclude the whole unit
pub const KILT_IGNORE_TAG: &str = "kilt-ignore";
/// Comma-separated container names to leave alone
pub const KILT_IGNORE_CONTAINERS_TAG: &str = "kilt-ignore-containers";
/// Comma-separated container names to instrument
pub const KILT_INCLUDE_CONTAINERS_TAG: &str = "kilt-include-containers";

/// Flattened resource tags
pub type Tags = BTreeMap<String, String>;

/// A platform-native tag representation that can be flattened to [`Tags`].
///
/// Duplicate keys resolve to the last value.
pub trait TagSource {
    /// Flatten into a key/value map
    fn tags(&self) -> Tags;
}

impl TagSource for Tags {
    fn tags(&self) -> Tags {
        self.clone()
    }
}

/// Build a tag map from key/value pairs, last value wins
pub fn tags_from_pairs<I, K, V>(pairs: I) -> Tags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Whether a unit carrying `tags` is instrumented under the given mode
#[must_use]
pub fn is_included(tags: &Tags, opt_in: bool) -> bool {
    if opt_in {
        tags.contains_key(KILT_INCLUDE_TAG) || tags.contains_key(KILT_INCLUDE_CONTAINERS_TAG)
    } else {
        !tags.contains_key(KILT_IGNORE_TAG)
    }
}

/// Per-container filtering derived from a unit's tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationHints {
    /// Containers never instrumented
    pub ignore_containers_named: Vec<String>,
    /// Containers explicitly instrumented
    pub include_containers_named: Vec<String>,
    /// Unit carries `kilt-include`
    pub has_global_include: bool,
}

impl InstrumentationHints {
    /// Extract hints from tags, independent of the inclusion mode
    #[must_use]
    pub fn from_tags(tags: &Tags) -> Self {
        Self {
            ignore_containers_named: container_list(tags, KILT_IGNORE_CONTAINERS_TAG),
            include_containers_named: container_list(tags, KILT_INCLUDE_CONTAINERS_TAG),
            has_global_include: tags.contains_key(KILT_INCLUDE_TAG),
        }
    }

    /// Whether the named container of an included unit gets instrumented.
    ///
    /// Ignored names always lose. A global include admits every other
    /// container; otherwise a non-empty include list admits only its names,
    /// and an empty one admits everything in opt-out mode only.
    #[must_use]
    pub fn is_container_eligible(&self, name: &str, opt_in: bool) -> bool {
        if self.ignore_containers_named.iter().any(|n| n == name) {
            return false;
        }
        if self.has_global_include {
            return true;
        }
        if !self.include_containers_named.is_empty() {
            return self.include_containers_named.iter().any(|n| n == name);
        }
        !opt_in
    }
}

/// Hints for a unit's tags
#[inline]
#[must_use]
pub fn hints(tags: &Tags) -> InstrumentationHints {
    InstrumentationHints::from_tags(tags)
}

fn container_list(tags: &Tags, tag: &str) -> Vec<String> {
    tags.get(tag)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        tags_from_pairs(pairs.iter().copied())
    }

    #[test]
    fn opt_out_includes_untagged() {
        assert!(is_included(&Tags::new(), false));
        assert!(is_included(&tags(&[("team", "a")]), false));
    }

    #[test]
    fn opt_out_respects_ignore() {
        assert!(!is_included(&tags(&[(KILT_IGNORE_TAG, "")]), false));
    }

    #[test]
    fn opt_in_requires_signal() {
        assert!(!is_included(&Tags::new(), true));
        assert!(!is_included(&tags(&[(KILT_IGNORE_CONTAINERS_TAG, "a")]), true));
        assert!(is_included(&tags(&[(KILT_INCLUDE_TAG, "true")]), true));
        assert!(is_included(&tags(&[(KILT_INCLUDE_CONTAINERS_TAG, "api")]), true));
    }

    #[test]
    fn hints_split_and_trim_lists() {
        let t = tags(&[
            (KILT_IGNORE_CONTAINERS_TAG, "envoy, datadog ,"),
            (KILT_INCLUDE_CONTAINERS_TAG, "api"),
        ]);
        let h = hints(&t);
        assert_eq!(h.ignore_containers_named, vec!["envoy", "datadog"]);
        assert_eq!(h.include_containers_named, vec!["api"]);
        assert!(!h.has_global_include);
    }

    #[test]
    fn hints_absent_tags_are_empty() {
        let h = hints(&Tags::new());
        assert!(h.ignore_containers_named.is_empty());
        assert!(h.include_containers_named.is_empty());
    }

    #[test]
    fn container_eligibility() {
        let h = hints(&tags(&[(KILT_IGNORE_CONTAINERS_TAG, "envoy")]));
        assert!(h.is_container_eligible("api", false));
        assert!(!h.is_container_eligible("envoy", false));
        assert!(!h.is_container_eligible("api", true));

        let h = hints(&tags(&[(KILT_INCLUDE_CONTAINERS_TAG, "api")]));
        assert!(h.is_container_eligible("api", true));
        assert!(!h.is_container_eligible("worker", true));
        assert!(!h.is_container_eligible("worker", false));

        let h = hints(&tags(&[
            (KILT_INCLUDE_TAG, ""),
            (KILT_IGNORE_CONTAINERS_TAG, "envoy"),
        ]));
        assert!(h.is_container_eligible("worker", true));
        assert!(!h.is_container_eligible("envoy", true));
    }

    #[test]
    fn duplicate_pairs_last_wins() {
        let t = tags_from_pairs([("k", "1"), ("k", "2")]);
        assert_eq!(t.get("k").map(String::as_str), Some("2"));
    }
}
