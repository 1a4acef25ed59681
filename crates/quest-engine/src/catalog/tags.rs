//! Summaries of catalog metadata values
//!
//! Nested metadata is flattened into `a:b` keys. For every key the observed
//! values are counted by their display form.

use quest_core::models::{CatalogEntry, Metadata};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Tag key -> display value -> number of entries
pub type TagCounts = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagResult {
    Values(BTreeMap<String, Vec<String>>),
    Counts(TagCounts),
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten nested objects into `parent:child` keys
pub fn flatten_metadata(metadata: &Metadata) -> Vec<(String, &Value)> {
    fn walk<'a>(prefix: Option<&str>, metadata: &'a Metadata, out: &mut Vec<(String, &'a Value)>) {
        for (key, value) in metadata {
            let key = match prefix {
                Some(prefix) => format!("{}:{}", prefix, key),
                None => key.clone(),
            };
            match value {
                Value::Object(nested) => walk(Some(&key), nested, out),
                _ => out.push((key, value)),
            }
        }
    }

    let mut out = Vec::new();
    walk(None, metadata, &mut out);
    out
}

pub fn count_tags(entries: &[CatalogEntry]) -> TagCounts {
    let mut counts = TagCounts::new();
    for entry in entries {
        for (key, value) in flatten_metadata(&entry.metadata) {
            if value.is_null() {
                continue;
            }
            *counts
                .entry(key)
                .or_default()
                .entry(display_value(value))
                .or_default() += 1;
        }
    }
    counts
}

pub fn merge_counts(into: &mut TagCounts, from: TagCounts) {
    for (key, values) in from {
        let target = into.entry(key).or_default();
        for (value, count) in values {
            *target.entry(value).or_default() += count;
        }
    }
}

/// Restrict to `keys` (a key also selects its nested keys) and shape the output
pub fn select_tags(counts: TagCounts, keys: Option<&[String]>, as_count: bool) -> TagResult {
    let selected = counts.into_iter().filter(|(tag, _)| match keys {
        Some(keys) => keys
            .iter()
            .any(|k| tag == k || tag.starts_with(&format!("{}:", k))),
        None => true,
    });

    if as_count {
        TagResult::Counts(selected.collect())
    } else {
        TagResult::Values(
            selected
                .map(|(tag, values)| (tag, values.into_keys().collect()))
                .collect(),
        )
    }
}
