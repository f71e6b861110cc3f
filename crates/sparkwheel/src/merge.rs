//! Layered configuration merging.
//!
//! Combines an ordered list of raw trees into one tree. The default policy
//! is **compose**: overlapping mappings merge recursively and overlapping
//! sequences concatenate. Two key-prefix operators alter this:
//!
//! - `=key` — replace: the base value is discarded and the override value
//!   taken whole. Requires the key to exist in the base.
//! - `~key` — delete: `~key: null` removes the key (idempotent);
//!   `~key: [i1, i2]` removes sequence indices (negative counts from the
//!   end, applied high to low); `~key: [name1, name2]` removes mapping
//!   children.
//!
//! The merger is pure: it never resolves references, evaluates expressions,
//! or inspects directive fields.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::error::{suggest, Error, Result};
use crate::node::Node;
use crate::path::Id;

/// Key prefix for the replace operator.
pub const REPLACE_PREFIX: char = '=';

/// Key prefix for the delete operator.
pub const DELETE_PREFIX: char = '~';

/// Merge an ordered list of raw trees into a single tree.
///
/// The first layer seeds the result; later layers compose onto it. Operator
/// prefixes in the first layer are interpreted against an empty base, so a
/// stray `=key` there fails just like it would against a missing key.
pub fn merge_layers<I>(layers: I) -> Result<Node>
where
    I: IntoIterator<Item = Node>,
{
    let mut result = Node::empty_map();
    for layer in layers {
        merge_into(&mut result, layer)?;
    }
    Ok(result)
}

/// Merge a single override tree onto `base` in place.
pub fn merge_into(base: &mut Node, overlay: Node) -> Result<()> {
    merge_at(base, overlay, &Id::root())
}

fn merge_at(base: &mut Node, overlay: Node, path: &Id) -> Result<()> {
    match (&mut *base, overlay) {
        (Node::Map(base_map), Node::Map(overlay_map)) => {
            merge_map_entries(base_map, overlay_map, path)
        }
        (Node::Seq(base_seq), Node::Seq(overlay_seq)) => {
            for item in overlay_seq {
                base_seq.push(interpret_fresh(item, path)?);
            }
            Ok(())
        }
        // Appending requires both sides to be sequences.
        (Node::Seq(_), other) => Err(merge_type_error(path, "sequence", other.type_name())),
        (existing, Node::Seq(_)) => {
            Err(merge_type_error(path, existing.type_name(), "sequence"))
        }
        (existing, overlay) => {
            *existing = interpret_fresh(overlay, path)?;
            Ok(())
        }
    }
}

fn merge_type_error(path: &Id, base_kind: &str, overlay_kind: &str) -> Error {
    Error::merge(
        format!("cannot compose {overlay_kind} onto {base_kind} at `{path}`"),
        Some(format!(
            "use `={}` to replace the {base_kind} wholesale",
            last_key(path)
        )),
    )
}

fn last_key(path: &Id) -> String {
    path.last().map(|s| s.to_string()).unwrap_or_default()
}

fn merge_map_entries(
    base: &mut IndexMap<String, Node>,
    overlay: IndexMap<String, Node>,
    path: &Id,
) -> Result<()> {
    for (raw_key, value) in overlay {
        if let Some(key) = raw_key.strip_prefix(REPLACE_PREFIX) {
            let child_path = path.child_key(key);
            if !base.contains_key(key) {
                return Err(Error::merge(
                    format!("cannot replace non-existent key `{child_path}`"),
                    Some(format!(
                        "`=` replaces an existing key; change `={key}:` to `{key}:` to create it"
                    )),
                ));
            }
            base.insert(key.to_string(), interpret_fresh(value, &child_path)?);
        } else if let Some(key) = raw_key.strip_prefix(DELETE_PREFIX) {
            apply_delete(base, key, value, path)?;
        } else {
            let child_path = path.child_key(&raw_key);
            match base.get_mut(&raw_key) {
                Some(existing) => merge_at(existing, value, &child_path)?,
                None => {
                    let fresh = interpret_fresh(value, &child_path)?;
                    base.insert(raw_key, fresh);
                }
            }
        }
    }
    Ok(())
}

/// Interpret a value that has no base counterpart.
///
/// Operator keys nested inside are applied against an empty base, so
/// `~key: null` vanishes and `=key` fails exactly as it would at merge
/// level.
fn interpret_fresh(value: Node, path: &Id) -> Result<Node> {
    match value {
        Node::Map(entries) => {
            let mut fresh = IndexMap::new();
            merge_map_entries(&mut fresh, entries, path)?;
            Ok(Node::Map(fresh))
        }
        Node::Seq(items) => {
            let mut fresh = Vec::with_capacity(items.len());
            for item in items {
                fresh.push(interpret_fresh(item, path)?);
            }
            Ok(Node::Seq(fresh))
        }
        scalar => Ok(scalar),
    }
}

/// Apply a `~key` delete entry to `base`.
fn apply_delete(
    base: &mut IndexMap<String, Node>,
    key: &str,
    selector: Node,
    path: &Id,
) -> Result<()> {
    let child_path = path.child_key(key);

    if is_null_form(&selector) {
        // Idempotent: deleting an absent key is not an error.
        base.shift_remove(key);
        return Ok(());
    }

    let items = match selector {
        Node::Seq(items) => items,
        other => {
            return Err(Error::merge(
                format!(
                    "invalid delete value for `~{key}`: expected null or a list, got {}",
                    other.type_name()
                ),
                Some("use `~key: null` to remove a key, or a list of indices/child keys".into()),
            ));
        }
    };

    let Some(target) = base.get_mut(key) else {
        return Err(Error::merge(
            format!("cannot delete children of non-existent key `{child_path}`"),
            Some(format!("remove `~{key}` or check the key name")),
        ));
    };

    match target {
        Node::Seq(seq) => delete_indices(seq, &items, key, &child_path),
        Node::Map(map) => delete_children(map, &items, &child_path),
        other => Err(Error::merge(
            format!(
                "cannot delete children of `{child_path}`: value is {}, not a sequence or mapping",
                other.type_name()
            ),
            None,
        )),
    }
}

fn is_null_form(selector: &Node) -> bool {
    match selector {
        Node::Null => true,
        Node::String(s) => s.is_empty(),
        Node::Seq(items) => items.is_empty(),
        Node::Map(entries) => entries.is_empty(),
        _ => false,
    }
}

/// Remove the listed indices from a sequence.
///
/// Negative indices count from the end; duplicates collapse; removal runs
/// high to low so earlier indices stay valid.
fn delete_indices(seq: &mut Vec<Node>, items: &[Node], key: &str, path: &Id) -> Result<()> {
    let len = seq.len() as i64;
    let mut resolved: BTreeSet<usize> = BTreeSet::new();
    for item in items {
        let raw = item.as_int().ok_or_else(|| {
            Error::merge(
                format!(
                    "invalid delete index for `~{key}`: expected integer, got {}",
                    item.type_name()
                ),
                None,
            )
        })?;
        let index = if raw < 0 { len + raw } else { raw };
        if index < 0 || index >= len {
            return Err(Error::merge(
                format!("delete index {raw} out of range for `{path}` (length {len})"),
                None,
            ));
        }
        resolved.insert(index as usize);
    }
    for index in resolved.into_iter().rev() {
        seq.remove(index);
    }
    Ok(())
}

/// Remove the listed child keys from a mapping.
fn delete_children(map: &mut IndexMap<String, Node>, items: &[Node], path: &Id) -> Result<()> {
    for item in items {
        let name = match item {
            Node::String(s) => s.clone(),
            Node::Int(i) => i.to_string(),
            other => {
                return Err(Error::merge(
                    format!(
                        "invalid delete entry for `{path}`: expected child key, got {}",
                        other.type_name()
                    ),
                    None,
                ));
            }
        };
        if map.shift_remove(&name).is_none() {
            return Err(Error::merge(
                format!("cannot delete non-existent child `{name}` of `{path}`"),
                Some(match suggest(&name, map.keys().map(String::as_str)).first() {
                    Some(close) => format!("did you mean `{close}`?"),
                    None => format!("remove `{name}` from the delete list"),
                }),
            ));
        }
    }
    Ok(())
}
