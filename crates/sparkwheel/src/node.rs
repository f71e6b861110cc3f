//! Raw configuration tree values.
//!
//! A [`Node`] is the unit the merger and graph operate on: scalars,
//! sequences, and mappings as produced by the YAML loader. Mappings keep
//! insertion order (significant only for human inspection).

use std::fmt;

use indexmap::IndexMap;

use crate::error::{suggest, Error, Result};
use crate::path::{Id, Segment};

/// A tree value: scalar, sequence, or mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Node>),
    Map(IndexMap<String, Node>),
}

impl Node {
    /// Empty mapping, the default shape of a config root.
    pub fn empty_map() -> Node {
        Node::Map(IndexMap::new())
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map(_))
    }

    pub fn is_seq(&self) -> bool {
        matches!(self, Node::Seq(_))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Node::Map(_) | Node::Seq(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Node::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable name of the value kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Int(_) => "integer",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::Seq(_) => "sequence",
            Node::Map(_) => "mapping",
        }
    }

    /// Follow `id` segment by segment.
    ///
    /// String segments require a mapping, integer segments require a
    /// sequence; a numeric-looking segment against a mapping is treated as a
    /// string key (mappings can have numeric-string keys). Missing or
    /// out-of-range segments fail with a not-found error carrying
    /// similarity-ranked suggestions.
    pub fn descend(&self, id: &Id) -> Result<&Node> {
        let mut current = self;
        for (depth, segment) in id.segments().iter().enumerate() {
            current = match (current, segment) {
                (Node::Map(map), seg) => {
                    let key = seg.as_key();
                    map.get(&key).ok_or_else(|| Error::KeyNotFound {
                        id: id.to_string(),
                        suggestions: suggest(&key, map.keys().map(String::as_str)),
                        location: None,
                    })?
                }
                (Node::Seq(seq), Segment::Index(i)) => {
                    seq.get(*i).ok_or_else(|| Error::KeyNotFound {
                        id: id.to_string(),
                        suggestions: Vec::new(),
                        location: None,
                    })?
                }
                (other, seg) => {
                    let prefix: Vec<String> = id.segments()[..depth]
                        .iter()
                        .map(|s| s.to_string())
                        .collect();
                    return Err(Error::parse(format!(
                        "cannot descend into {} at `{}` with segment `{seg}`",
                        other.type_name(),
                        prefix.join("::"),
                    )));
                }
            };
        }
        Ok(current)
    }

    /// Visit every interior and leaf node in depth-first order, root first.
    pub fn traverse<F: FnMut(&Id, &Node)>(&self, visitor: &mut F) {
        self.traverse_at(&Id::root(), visitor);
    }

    fn traverse_at<F: FnMut(&Id, &Node)>(&self, id: &Id, visitor: &mut F) {
        visitor(id, self);
        match self {
            Node::Map(map) => {
                for (key, value) in map {
                    value.traverse_at(&id.child_key(key), visitor);
                }
            }
            Node::Seq(seq) => {
                for (index, value) in seq.iter().enumerate() {
                    value.traverse_at(&id.child_index(index), visitor);
                }
            }
            _ => {}
        }
    }

    /// Convert to a JSON value. Lossless for every node kind.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Node::Null => serde_json::Value::Null,
            Node::Bool(b) => serde_json::Value::Bool(*b),
            Node::Int(i) => serde_json::Value::Number((*i).into()),
            Node::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Node::String(s) => serde_json::Value::String(s.clone()),
            Node::Seq(seq) => serde_json::Value::Array(seq.iter().map(Node::to_json).collect()),
            Node::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Build a node from a JSON value.
    pub fn from_json(value: &serde_json::Value) -> Node {
        match value {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Int(i)
                } else {
                    Node::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Node::String(s.clone()),
            serde_json::Value::Array(items) => {
                Node::Seq(items.iter().map(Node::from_json).collect())
            }
            serde_json::Value::Object(entries) => Node::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Node {
    /// Compact flow-style rendering, for diagnostics and diff output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => f.write_str("null"),
            Node::Bool(b) => write!(f, "{b}"),
            Node::Int(i) => write!(f, "{i}"),
            Node::Float(v) => write!(f, "{v}"),
            Node::String(s) => write!(f, "{s}"),
            Node::Seq(seq) => {
                f.write_str("[")?;
                for (i, item) in seq.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Node::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Node {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Node {
        Node::String(s)
    }
}

impl From<i64> for Node {
    fn from(i: i64) -> Node {
        Node::Int(i)
    }
}

impl From<f64> for Node {
    fn from(f: f64) -> Node {
        Node::Float(f)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Node {
        Node::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: Vec<(&str, Node)>) -> Node {
        Node::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_descend_nested_map() {
        let tree = map(vec![("model", map(vec![("lr", Node::Float(0.001))]))]);
        let id = Id::parse("model::lr").unwrap();
        assert_eq!(tree.descend(&id).unwrap(), &Node::Float(0.001));
    }

    #[test]
    fn test_descend_sequence_index() {
        let tree = map(vec![("xs", Node::Seq(vec![Node::Int(1), Node::Int(2)]))]);
        let id = Id::parse("xs::1").unwrap();
        assert_eq!(tree.descend(&id).unwrap(), &Node::Int(2));
    }

    #[test]
    fn test_descend_numeric_key_against_map() {
        // A numeric-looking segment against a mapping is a string key.
        let tree = map(vec![("m", map(vec![("0", Node::Int(42))]))]);
        let id = Id::parse("m::0").unwrap();
        assert_eq!(tree.descend(&id).unwrap(), &Node::Int(42));
    }

    #[test]
    fn test_descend_missing_key_suggests() {
        let tree = map(vec![("model", map(vec![("lr", Node::Int(1))]))]);
        let id = Id::parse("model::lrr").unwrap();
        match tree.descend(&id) {
            Err(Error::KeyNotFound { suggestions, .. }) => {
                assert_eq!(suggestions, vec!["lr".to_string()]);
            }
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_descend_out_of_range_index() {
        let tree = map(vec![("xs", Node::Seq(vec![Node::Int(1)]))]);
        assert!(tree.descend(&Id::parse("xs::5").unwrap()).is_err());
    }

    #[test]
    fn test_descend_into_scalar_fails() {
        let tree = map(vec![("a", Node::Int(1))]);
        assert!(tree.descend(&Id::parse("a::b").unwrap()).is_err());
    }

    #[test]
    fn test_traverse_visits_interior_and_leaves() {
        let tree = map(vec![(
            "a",
            map(vec![("b", Node::Seq(vec![Node::Int(1), Node::Int(2)]))]),
        )]);
        let mut visited = Vec::new();
        tree.traverse(&mut |id, _| visited.push(id.to_string()));
        assert_eq!(
            visited,
            vec!["", "a", "a::b", "a::b::0", "a::b::1"]
        );
    }

    #[test]
    fn test_json_round_trip() {
        let tree = map(vec![
            ("n", Node::Int(5)),
            ("xs", Node::Seq(vec![Node::Bool(true), Node::Null])),
        ]);
        assert_eq!(Node::from_json(&tree.to_json()), tree);
    }

    #[test]
    fn test_display_flow_style() {
        let tree = map(vec![("a", Node::Int(1)), ("b", Node::Seq(vec![Node::Int(2)]))]);
        assert_eq!(tree.to_string(), "{a: 1, b: [2]}");
    }
}
