//! Configuration diffing.
//!
//! Compares two raw trees over their `::`-flattened leaves. Mappings are
//! recursed into; sequences and scalars are compared as leaf values.
//! Renderers: grouped tree, unified (+/- lines), and JSON.

use indexmap::IndexMap;

use crate::node::Node;
use crate::path::ID_SEPARATOR;

/// Differences between two configurations.
#[derive(Debug, Clone, Default)]
pub struct ConfigDiff {
    /// Keys present only in the second config.
    pub added: IndexMap<String, Node>,
    /// Keys present only in the first config.
    pub removed: IndexMap<String, Node>,
    /// Keys with different values, as (old, new).
    pub changed: IndexMap<String, (Node, Node)>,
    /// Keys with identical values.
    pub unchanged: IndexMap<String, Node>,
}

impl ConfigDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }

    /// Summary like `3 changed, 2 added, 1 removed`, or `no changes`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.changed.is_empty() {
            parts.push(format!("{} changed", self.changed.len()));
        }
        if !self.added.is_empty() {
            parts.push(format!("{} added", self.added.len()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("{} removed", self.removed.len()));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Compare two config trees.
///
/// `ignore_keys` drops flattened keys whose final segment matches an entry.
pub fn diff_configs(a: &Node, b: &Node, ignore_keys: &[String]) -> ConfigDiff {
    let flat_a = flatten(a);
    let flat_b = flatten(b);
    let ignored = |key: &str| {
        ignore_keys.iter().any(|ignored| {
            key == ignored || key.rsplit(ID_SEPARATOR).next() == Some(ignored.as_str())
        })
    };

    let mut diff = ConfigDiff::default();
    for (key, old) in &flat_a {
        if ignored(key) {
            continue;
        }
        match flat_b.get(key) {
            None => {
                diff.removed.insert(key.clone(), old.clone());
            }
            Some(new) if new == old => {
                diff.unchanged.insert(key.clone(), old.clone());
            }
            Some(new) => {
                diff.changed.insert(key.clone(), (old.clone(), new.clone()));
            }
        }
    }
    for (key, new) in &flat_b {
        if !ignored(key) && !flat_a.contains_key(key) {
            diff.added.insert(key.clone(), new.clone());
        }
    }
    diff
}

/// Flatten nested mappings into `::`-joined leaf entries.
fn flatten(node: &Node) -> IndexMap<String, Node> {
    let mut out = IndexMap::new();
    flatten_into(node, "", &mut out);
    out
}

fn flatten_into(node: &Node, prefix: &str, out: &mut IndexMap<String, Node>) {
    match node {
        Node::Map(entries) => {
            for (key, value) in entries {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{ID_SEPARATOR}{key}")
                };
                match value {
                    Node::Map(_) => flatten_into(value, &path, out),
                    leaf => {
                        out.insert(path, leaf.clone());
                    }
                }
            }
        }
        other => {
            if !prefix.is_empty() || !other.is_map() {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }
}

/// Grouped, indented rendering.
pub fn format_tree(diff: &ConfigDiff) -> String {
    let mut out = String::new();
    if !diff.changed.is_empty() {
        out.push_str("changed:\n");
        for (key, (old, new)) in &diff.changed {
            out.push_str(&format!("  {key}: {old} -> {new}\n"));
        }
    }
    if !diff.added.is_empty() {
        out.push_str("added:\n");
        for (key, value) in &diff.added {
            out.push_str(&format!("  {key}: {value}\n"));
        }
    }
    if !diff.removed.is_empty() {
        out.push_str("removed:\n");
        for (key, value) in &diff.removed {
            out.push_str(&format!("  {key}: {value}\n"));
        }
    }
    if out.is_empty() {
        out.push_str("no changes\n");
    }
    out
}

/// Unified-style rendering with `-`/`+` lines.
pub fn format_unified(diff: &ConfigDiff) -> String {
    let mut out = String::new();
    for (key, (old, new)) in &diff.changed {
        out.push_str(&format!("- {key}: {old}\n+ {key}: {new}\n"));
    }
    for (key, value) in &diff.removed {
        out.push_str(&format!("- {key}: {value}\n"));
    }
    for (key, value) in &diff.added {
        out.push_str(&format!("+ {key}: {value}\n"));
    }
    if out.is_empty() {
        out.push_str("no changes\n");
    }
    out
}

/// JSON rendering for machine consumption.
pub fn format_json(diff: &ConfigDiff) -> String {
    let changed: serde_json::Map<String, serde_json::Value> = diff
        .changed
        .iter()
        .map(|(key, (old, new))| {
            (
                key.clone(),
                serde_json::json!({ "old": old.to_json(), "new": new.to_json() }),
            )
        })
        .collect();
    let added: serde_json::Map<String, serde_json::Value> = diff
        .added
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();
    let removed: serde_json::Map<String, serde_json::Value> = diff
        .removed
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect();

    let body = serde_json::json!({
        "changed": changed,
        "added": added,
        "removed": removed,
        "summary": diff.summary(),
    });
    serde_json::to_string_pretty(&body).expect("diff serializes")
}
