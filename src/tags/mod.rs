//! Tag-string handling.
//!
//! A topic's tags are fully derived from its free-text tag string. This module
//! turns a tag string into its unique tag names and computes which names an
//! edit adds or removes, so the edge table only changes by the delta.

use std::collections::HashSet;

/// Separator between tag names in a tag string.
pub const TAG_SEPARATOR: char = ',';

/// Split a tag string into unique, trimmed, non-empty tag names.
///
/// The first occurrence of a name wins and input order is preserved:
/// `"a, b, a"` yields `["a", "b"]`. Names are case-sensitive.
pub fn find_unique_tags(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Tag names to detach from and attach to a topic after a tag string edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDelta {
    /// Names in the old set but not the new one, in old order.
    pub removable: Vec<String>,
    /// Names in the new set but not the old one, in new order.
    pub addable: Vec<String>,
}

impl TagDelta {
    /// Compute the two set differences between an old and a new tag set.
    pub fn between(old: &[String], new: &[String]) -> Self {
        let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
        let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();

        Self {
            removable: old
                .iter()
                .filter(|name| !new_set.contains(name.as_str()))
                .cloned()
                .collect(),
            addable: new
                .iter()
                .filter(|name| !old_set.contains(name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Compute the delta between two raw tag strings.
    pub fn from_tag_strings(old: Option<&str>, new: Option<&str>) -> Self {
        let old = old.map(find_unique_tags).unwrap_or_default();
        let new = new.map(find_unique_tags).unwrap_or_default();
        Self::between(&old, &new)
    }

    pub fn is_empty(&self) -> bool {
        self.removable.is_empty() && self.addable.is_empty()
    }
}
