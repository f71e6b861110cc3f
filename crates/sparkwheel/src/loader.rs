//! YAML loading with per-item source location tracking.
//!
//! The loader consumes the `yaml-rust2` event stream so that every node
//! keeps the line/column it came from; locations land in a [`SourceMap`]
//! keyed by canonical id rather than polluting the config tree itself.
//! Duplicate mapping keys are rejected under strict-keys, otherwise the
//! later entry wins with a warning.

use std::path::Path;

use indexmap::IndexMap;
use tracing::warn;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::error::{Error, Result, SourceLocation};
use crate::node::Node;
use crate::path::Id;

/// Source locations for loaded config items, keyed by canonical id.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    entries: IndexMap<String, SourceLocation>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&SourceLocation> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: String, location: SourceLocation) {
        self.entries.insert(id, location);
    }

    /// Merge another registry; later entries win, matching merge order.
    pub fn merge(&mut self, other: SourceMap) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads YAML files into [`Node`] trees.
#[derive(Debug, Clone)]
pub struct Loader {
    strict_keys: bool,
}

impl Loader {
    pub fn new(strict_keys: bool) -> Self {
        Loader { strict_keys }
    }

    /// Load a single YAML file. The extension must be `.yaml` or `.yml`.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(Node, SourceMap)> {
        let path = path.as_ref();
        let name = path.to_string_lossy().to_string();
        let extension_ok = path
            .extension()
            .map(|e| {
                let e = e.to_string_lossy().to_lowercase();
                e == "yaml" || e == "yml"
            })
            .unwrap_or(false);
        if !extension_ok {
            return Err(Error::parse(format!(
                "unknown file input `{name}`: must be a YAML file (.yaml or .yml)"
            )));
        }
        let content = std::fs::read_to_string(path)?;
        self.load_str(&content, &name)
    }

    /// Parse YAML text. `origin` names the source in locations and errors.
    ///
    /// Parses a single document; an empty document yields an empty mapping.
    pub fn load_str(&self, content: &str, origin: &str) -> Result<(Node, SourceMap)> {
        let mut parser = Parser::new_from_str(content);
        let mut builder = TreeBuilder::new();
        parser.load(&mut builder, false).map_err(|e| Error::Parse {
            // ScanError's display already carries line/column.
            message: format!("{e} in {origin}"),
            location: None,
        })?;

        let marked = match builder.finish()? {
            Some(marked) => marked,
            None => return Ok((Node::empty_map(), SourceMap::new())),
        };

        let mut sources = SourceMap::new();
        let node = self.flatten(marked, &Id::root(), origin, &mut sources)?;
        // A document that is just a null scalar reads as an empty config.
        let node = if node == Node::Null { Node::empty_map() } else { node };
        Ok((node, sources))
    }

    /// Convert a marked tree into a plain [`Node`], registering locations.
    fn flatten(
        &self,
        marked: Marked,
        id: &Id,
        origin: &str,
        sources: &mut SourceMap,
    ) -> Result<Node> {
        let id_text = id.to_string();
        sources.insert(
            id_text.clone(),
            SourceLocation {
                path: origin.to_string(),
                line: marked.line,
                column: marked.column,
                id: id_text,
            },
        );

        match marked.value {
            MarkedValue::Scalar(node) => Ok(node),
            MarkedValue::Seq(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    out.push(self.flatten(item, &id.child_index(index), origin, sources)?);
                }
                Ok(Node::Seq(out))
            }
            MarkedValue::Map(entries) => {
                let mut out: IndexMap<String, Node> = IndexMap::with_capacity(entries.len());
                for (key, key_line, value) in entries {
                    if out.contains_key(&key) {
                        if self.strict_keys {
                            return Err(Error::Parse {
                                message: format!("duplicate mapping key `{key}`"),
                                location: Some(SourceLocation {
                                    path: origin.to_string(),
                                    line: key_line,
                                    column: 1,
                                    id: id.to_string(),
                                }),
                            });
                        }
                        warn!(key = %key, file = %origin, line = key_line, "duplicate mapping key, later value wins");
                    }
                    let child = self.flatten(value, &id.child_key(&key), origin, sources)?;
                    out.insert(key, child);
                }
                Ok(Node::Map(out))
            }
        }
    }
}

impl Default for Loader {
    fn default() -> Self {
        Loader::new(false)
    }
}

/// A parsed node with the marker it started at.
struct Marked {
    value: MarkedValue,
    line: usize,
    column: usize,
}

enum MarkedValue {
    Scalar(Node),
    Seq(Vec<Marked>),
    /// Entries as (key, key line, value); duplicates kept until flatten.
    Map(Vec<(String, usize, Marked)>),
}

/// Nodes under construction while the event stream unwinds.
enum BuildNode {
    Sequence {
        marker: Marker,
        anchor: usize,
        items: Vec<Marked>,
    },
    Mapping {
        marker: Marker,
        anchor: usize,
        entries: Vec<(String, usize, Marked)>,
        pending_key: Option<(String, usize)>,
    },
}

/// Event receiver that builds a [`Marked`] tree.
struct TreeBuilder {
    stack: Vec<BuildNode>,
    root: Option<Marked>,
    anchors: IndexMap<usize, Node>,
    error: Option<Error>,
}

impl TreeBuilder {
    fn new() -> Self {
        TreeBuilder {
            stack: Vec::new(),
            root: None,
            anchors: IndexMap::new(),
            error: None,
        }
    }

    fn finish(self) -> Result<Option<Marked>> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(self.root)
    }

    fn push_complete(&mut self, marked: Marked) {
        match self.stack.last_mut() {
            None => {
                // First document wins; later documents are ignored because
                // load() is invoked in single-document mode.
                if self.root.is_none() {
                    self.root = Some(marked);
                }
            }
            Some(BuildNode::Sequence { items, .. }) => items.push(marked),
            Some(BuildNode::Mapping {
                entries,
                pending_key,
                ..
            }) => match pending_key.take() {
                Some((key, key_line)) => entries.push((key, key_line, marked)),
                None => {
                    // This completed node is a key; mapping keys are kept as
                    // their textual form.
                    let key = match &marked.value {
                        MarkedValue::Scalar(node) => scalar_key_text(node),
                        _ => None,
                    };
                    match key {
                        Some(key) => *pending_key = Some((key, marked.line)),
                        None => {
                            self.error.get_or_insert(Error::parse(
                                "mapping keys must be scalars",
                            ));
                        }
                    }
                }
            },
        }
    }

    fn register_anchor(&mut self, anchor: usize, marked: &Marked) {
        if anchor > 0 {
            self.anchors.insert(anchor, to_plain(marked));
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        match ev {
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}

            Event::Scalar(value, style, anchor, tag) => {
                let tag_suffix = tag.as_ref().map(|t| t.suffix.clone());
                let node = scalar_node(&value, style, tag_suffix.as_deref());
                let marked = Marked {
                    value: MarkedValue::Scalar(node),
                    line: marker.line(),
                    column: marker.col() + 1,
                };
                self.register_anchor(anchor, &marked);
                self.push_complete(marked);
            }

            Event::SequenceStart(anchor, _tag) => {
                self.stack.push(BuildNode::Sequence {
                    marker,
                    anchor,
                    items: Vec::new(),
                });
            }

            Event::SequenceEnd => {
                if let Some(BuildNode::Sequence {
                    marker,
                    anchor,
                    items,
                }) = self.stack.pop()
                {
                    let marked = Marked {
                        value: MarkedValue::Seq(items),
                        line: marker.line(),
                        column: marker.col() + 1,
                    };
                    self.register_anchor(anchor, &marked);
                    self.push_complete(marked);
                }
            }

            Event::MappingStart(anchor, _tag) => {
                self.stack.push(BuildNode::Mapping {
                    marker,
                    anchor,
                    entries: Vec::new(),
                    pending_key: None,
                });
            }

            Event::MappingEnd => {
                if let Some(BuildNode::Mapping {
                    marker,
                    anchor,
                    entries,
                    ..
                }) = self.stack.pop()
                {
                    let marked = Marked {
                        value: MarkedValue::Map(entries),
                        line: marker.line(),
                        column: marker.col() + 1,
                    };
                    self.register_anchor(anchor, &marked);
                    self.push_complete(marked);
                }
            }

            Event::Alias(anchor) => {
                let node = self.anchors.get(&anchor).cloned();
                match node {
                    Some(node) => {
                        let marked = Marked {
                            value: from_plain(node),
                            line: marker.line(),
                            column: marker.col() + 1,
                        };
                        self.push_complete(marked);
                    }
                    None => {
                        self.error.get_or_insert(Error::parse(format!(
                            "unresolved YAML alias (anchor {anchor})"
                        )));
                    }
                }
            }
        }
    }
}

/// Convert a scalar event into a typed node.
///
/// Plain scalars get YAML 1.1 type inference; quoted, literal, and folded
/// scalars stay strings. An explicit `!!str` tag also forces a string.
fn scalar_node(value: &str, style: TScalarStyle, tag_suffix: Option<&str>) -> Node {
    if style != TScalarStyle::Plain {
        return Node::String(value.to_string());
    }
    if tag_suffix == Some("str") {
        return Node::String(value.to_string());
    }

    if let Ok(i) = value.parse::<i64>() {
        return Node::Int(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return Node::Float(f);
    }
    match value {
        "true" | "True" | "TRUE" | "yes" | "Yes" | "YES" | "on" | "On" | "ON" => Node::Bool(true),
        "false" | "False" | "FALSE" | "no" | "No" | "NO" | "off" | "Off" | "OFF" => {
            Node::Bool(false)
        }
        "null" | "Null" | "NULL" | "~" | "" => Node::Null,
        _ => Node::String(value.to_string()),
    }
}

/// Textual form of a scalar used as a mapping key.
fn scalar_key_text(node: &Node) -> Option<String> {
    match node {
        Node::String(s) => Some(s.clone()),
        Node::Int(i) => Some(i.to_string()),
        Node::Float(f) => Some(f.to_string()),
        Node::Bool(b) => Some(b.to_string()),
        Node::Null => Some("null".to_string()),
        _ => None,
    }
}

fn to_plain(marked: &Marked) -> Node {
    match &marked.value {
        MarkedValue::Scalar(node) => node.clone(),
        MarkedValue::Seq(items) => Node::Seq(items.iter().map(to_plain).collect()),
        MarkedValue::Map(entries) => Node::Map(
            entries
                .iter()
                .map(|(k, _, v)| (k.clone(), to_plain(v)))
                .collect(),
        ),
    }
}

fn from_plain(node: Node) -> MarkedValue {
    match node {
        Node::Seq(items) => MarkedValue::Seq(
            items
                .into_iter()
                .map(|n| Marked {
                    value: from_plain(n),
                    line: 0,
                    column: 0,
                })
                .collect(),
        ),
        Node::Map(entries) => MarkedValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| {
                    (
                        k,
                        0,
                        Marked {
                            value: from_plain(v),
                            line: 0,
                            column: 0,
                        },
                    )
                })
                .collect(),
        ),
        other => MarkedValue::Scalar(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(content: &str) -> (Node, SourceMap) {
        Loader::default().load_str(content, "test.yaml").unwrap()
    }

    #[test]
    fn test_load_scalars() {
        let (node, _) = load("a: 1\nb: 2.5\nc: true\nd: null\ne: hello\n");
        let map = node.as_map().unwrap();
        assert_eq!(map["a"], Node::Int(1));
        assert_eq!(map["b"], Node::Float(2.5));
        assert_eq!(map["c"], Node::Bool(true));
        assert_eq!(map["d"], Node::Null);
        assert_eq!(map["e"], Node::String("hello".into()));
    }

    #[test]
    fn test_quoted_scalars_stay_strings() {
        let (node, _) = load("a: \"123\"\nb: 'true'\n");
        let map = node.as_map().unwrap();
        assert_eq!(map["a"], Node::String("123".into()));
        assert_eq!(map["b"], Node::String("true".into()));
    }

    #[test]
    fn test_yaml_11_booleans() {
        let (node, _) = load("a: yes\nb: off\n");
        let map = node.as_map().unwrap();
        assert_eq!(map["a"], Node::Bool(true));
        assert_eq!(map["b"], Node::Bool(false));
    }

    #[test]
    fn test_nested_structures() {
        let (node, _) = load("model:\n  layers:\n    - 16\n    - 32\n");
        let id = Id::parse("model::layers::1").unwrap();
        assert_eq!(node.descend(&id).unwrap(), &Node::Int(32));
    }

    #[test]
    fn test_source_locations_tracked() {
        let (_, sources) = load("model:\n  lr: 0.001\n");
        let loc = sources.get("model::lr").unwrap();
        assert_eq!(loc.path, "test.yaml");
        assert_eq!(loc.line, 2);
    }

    #[test]
    fn test_empty_document_is_empty_map() {
        let (node, _) = load("");
        assert_eq!(node, Node::empty_map());
    }

    #[test]
    fn test_duplicate_key_last_wins_by_default() {
        let (node, _) = load("a: 1\na: 2\n");
        assert_eq!(node.as_map().unwrap()["a"], Node::Int(2));
    }

    #[test]
    fn test_duplicate_key_fails_when_strict() {
        let result = Loader::new(true).load_str("a: 1\na: 2\n", "test.yaml");
        match result {
            Err(Error::Parse { message, .. }) => assert!(message.contains("duplicate")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_mapping_keys_kept_as_strings() {
        let (node, _) = load("lookup:\n  0: zero\n  1: one\n");
        let id = Id::parse("lookup::0").unwrap();
        assert_eq!(node.descend(&id).unwrap(), &Node::String("zero".into()));
    }

    #[test]
    fn test_anchors_and_aliases() {
        let (node, _) = load("base: &b\n  x: 1\ncopy: *b\n");
        let id = Id::parse("copy::x").unwrap();
        assert_eq!(node.descend(&id).unwrap(), &Node::Int(1));
    }

    #[test]
    fn test_invalid_yaml_is_a_parse_error() {
        let result = Loader::default().load_str("a: [1, 2\n", "bad.yaml");
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_load_file_rejects_non_yaml_extension() {
        let result = Loader::default().load_file("config.json");
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_load_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "a: 1\n").unwrap();
        let (node, sources) = Loader::default().load_file(&path).unwrap();
        assert_eq!(node.as_map().unwrap()["a"], Node::Int(1));
        assert!(sources.get("a").is_some());
    }
}
