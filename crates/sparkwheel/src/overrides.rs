//! Command-line override strings.
//!
//! Each override has the form `[~|=]<identifier>=<literal>`; a bare
//! `~identifier` deletes. The literal is decoded as a structured value when
//! possible (numbers, booleans, null, lists, objects with relaxed key
//! quoting), else kept as a string. A list of overrides expands into a
//! single override tree with the operator prefix preserved on the leaf key,
//! ready for the merger.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::merge::{DELETE_PREFIX, REPLACE_PREFIX};
use crate::node::Node;
use crate::path::{Id, Segment};

/// Parse override strings into one override tree for the merger.
pub fn parse_overrides<S: AsRef<str>>(args: &[S]) -> Result<Node> {
    let mut tree = Node::empty_map();
    for arg in args {
        let (prefix, id, value) = parse_override(arg.as_ref())?;
        insert_override(&mut tree, prefix, &id, value)?;
    }
    Ok(tree)
}

/// Split one override string into operator prefix, identifier, and decoded
/// value.
fn parse_override(arg: &str) -> Result<(Option<char>, Id, Node)> {
    let (prefix, rest) = match arg.chars().next() {
        Some(c @ (DELETE_PREFIX | REPLACE_PREFIX)) => (Some(c), &arg[1..]),
        _ => (None, arg),
    };

    match rest.split_once('=') {
        Some((key, literal)) => {
            let id = Id::parse(key.trim())?;
            if id.is_root() {
                return Err(Error::parse(format!("malformed override `{arg}`: empty key")));
            }
            Ok((prefix, id, decode_literal(literal)))
        }
        None => {
            // `~key` alone deletes.
            if prefix == Some(DELETE_PREFIX) {
                let id = Id::parse(rest.trim())?;
                if id.is_root() {
                    return Err(Error::parse(format!("malformed override `{arg}`: empty key")));
                }
                Ok((prefix, id, Node::Null))
            } else {
                Err(Error::parse(format!(
                    "malformed override `{arg}`: expected `key=value`"
                )))
            }
        }
    }
}

/// Decode an override literal.
///
/// Tries JSON first (numbers, booleans, null, lists, objects), then JSON
/// with relaxed key quoting, else falls back to the raw string.
fn decode_literal(literal: &str) -> Node {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(literal) {
        return Node::from_json(&value);
    }
    if literal.starts_with('{') && literal.contains(':') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&quote_bare_words(literal)) {
            return Node::from_json(&value);
        }
    }
    Node::String(literal.to_string())
}

static BARE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").expect("valid key pattern"));

static BARE_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(:\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*[,}])").expect("valid value pattern"));

/// Quote bare keys and word values in JSON-like dict text, so the shell
/// form `{a:1,b:relu}` decodes as `{"a":1,"b":"relu"}`.
fn quote_bare_words(text: &str) -> String {
    let keyed = BARE_KEY_RE.replace_all(text, "$1\"$2\"$3");
    BARE_VALUE_RE
        .replace_all(&keyed, |caps: &regex::Captures<'_>| {
            let word = &caps[2];
            if matches!(word, "true" | "false" | "null") {
                caps[0].to_string()
            } else {
                format!("{}\"{}\"{}", &caps[1], word, &caps[3])
            }
        })
        .into_owned()
}

/// Expand an override into nested mappings, keeping the operator prefix on
/// the leaf key.
fn insert_override(tree: &mut Node, prefix: Option<char>, id: &Id, value: Node) -> Result<()> {
    let mut current = tree;
    let segments = id.segments();
    for segment in &segments[..segments.len() - 1] {
        let map = current.as_map_mut().ok_or_else(|| {
            Error::parse(format!("conflicting overrides at `{id}`"))
        })?;
        let entry = map
            .entry(segment.as_key())
            .or_insert_with(Node::empty_map);
        current = entry;
    }

    let leaf = leaf_key(&segments[segments.len() - 1], prefix);
    let map = current
        .as_map_mut()
        .ok_or_else(|| Error::parse(format!("conflicting overrides at `{id}`")))?;
    map.insert(leaf, value);
    Ok(())
}

fn leaf_key(segment: &Segment, prefix: Option<char>) -> String {
    match prefix {
        Some(op) => format!("{op}{segment}"),
        None => segment.as_key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Node {
        parse_overrides(args).unwrap()
    }

    fn map(entries: Vec<(&str, Node)>) -> Node {
        Node::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_scalar_literals() {
        let tree = parse(&["a=123", "b=3.5", "c=true", "d=null", "e=hello"]);
        assert_eq!(
            tree,
            map(vec![
                ("a", Node::Int(123)),
                ("b", Node::Float(3.5)),
                ("c", Node::Bool(true)),
                ("d", Node::Null),
                ("e", Node::String("hello".into())),
            ])
        );
    }

    #[test]
    fn test_nested_id_expands_to_tree() {
        let tree = parse(&["model::lr=0.001"]);
        assert_eq!(
            tree,
            map(vec![("model", map(vec![("lr", Node::Float(0.001))]))])
        );
    }

    #[test]
    fn test_list_literal() {
        let tree = parse(&["xs=[1,2,3]"]);
        assert_eq!(
            tree,
            map(vec![(
                "xs",
                Node::Seq(vec![Node::Int(1), Node::Int(2), Node::Int(3)]),
            )])
        );
    }

    #[test]
    fn test_object_literal_with_bare_keys() {
        let tree = parse(&["layers={third:{type:relu}}"]);
        assert_eq!(
            tree,
            map(vec![(
                "layers",
                map(vec![("third", map(vec![("type", Node::String("relu".into()))]))]),
            )])
        );
    }

    #[test]
    fn test_quoted_string_literal() {
        let tree = parse(&["name=\"Experiment 1\""]);
        assert_eq!(tree, map(vec![("name", Node::String("Experiment 1".into()))]));
    }

    #[test]
    fn test_unquoted_string_with_spaces() {
        let tree = parse(&["name=Experiment 1"]);
        assert_eq!(tree, map(vec![("name", Node::String("Experiment 1".into()))]));
    }

    #[test]
    fn test_delete_prefix_without_value() {
        let tree = parse(&["~old::param"]);
        assert_eq!(tree, map(vec![("old", map(vec![("~param", Node::Null)]))]));
    }

    #[test]
    fn test_replace_prefix_preserved_on_leaf() {
        let tree = parse(&["=model::opt={lr:0.1}"]);
        assert_eq!(
            tree,
            map(vec![(
                "model",
                map(vec![("=opt", map(vec![("lr", Node::Float(0.1))]))]),
            )])
        );
    }

    #[test]
    fn test_top_level_prefix() {
        let tree = parse(&["~debug"]);
        assert_eq!(tree, map(vec![("~debug", Node::Null)]));
    }

    #[test]
    fn test_value_containing_equals() {
        let tree = parse(&["expr=$@a == 1"]);
        assert_eq!(tree, map(vec![("expr", Node::String("$@a == 1".into()))]));
    }

    #[test]
    fn test_missing_value_rejected() {
        assert!(parse_overrides(&["justakey"]).is_err());
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(parse_overrides(&["=5"]).is_err());
    }

    #[test]
    fn test_multiple_overrides_compose() {
        let tree = parse(&["m::a=1", "m::b=2"]);
        assert_eq!(
            tree,
            map(vec![(
                "m",
                map(vec![("a", Node::Int(1)), ("b", Node::Int(2))]),
            )])
        );
    }
}
