//! Exact-name exclusion of backup targets.

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Names of base-directory children that are never backed up.
///
/// Matching is by exact string equality only. No globbing, no prefix match,
/// no case folding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, From, Deref)]
#[serde(transparent)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().collect()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        is_excluded(name, self)
    }
}

impl<S: Into<String>> FromIterator<S> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

pub fn is_excluded(name: &str, exclusions: &ExclusionSet) -> bool {
    exclusions.names.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_is_excluded() {
        let set = ExclusionSet::new(["app2", "cache"]);
        assert!(set.is_excluded("app2"));
        assert!(set.is_excluded("cache"));
        assert!(!set.is_excluded("app1"));
    }

    #[test]
    fn test_no_partial_matches() {
        let set = ExclusionSet::new(["app"]);
        assert!(!set.is_excluded("app1"));
        assert!(!set.is_excluded("ap"));
        assert!(!set.is_excluded("my-app"));
        assert!(!set.is_excluded(" app"));
    }

    #[test]
    fn test_no_case_folding() {
        let set = ExclusionSet::new(["Cache"]);
        assert!(!set.is_excluded("cache"));
        assert!(set.is_excluded("Cache"));
    }

    #[test]
    fn test_no_glob_semantics() {
        let set = ExclusionSet::new(["*"]);
        assert!(!set.is_excluded("app1"));
        assert!(set.is_excluded("*"));
    }

    #[test]
    fn test_empty_set_excludes_nothing() {
        let set = ExclusionSet::default();
        assert!(!set.is_excluded(""));
        assert!(!set.is_excluded("app1"));
    }

    #[test]
    fn test_deserialize_from_list() {
        let set: ExclusionSet = serde_json::from_str(r#"["app2", "tmp", "app2"]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert!(is_excluded("tmp", &set));
    }
}
