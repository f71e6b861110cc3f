//! The config item graph.
//!
//! Built from the merged tree: every interior and leaf node becomes one
//! [`ConfigItem`] at its canonical identifier, so identifiers like
//! `model::layers::0::weights` resolve. Two pre-passes run before items
//! are created:
//!
//! 1. relative `@::`/`%::` prefixes in string scalars are rewritten to
//!    absolute ids, and
//! 2. `%` macros are expanded — a scalar `%id` is replaced by a deep copy
//!    of the raw subtree at `id`, `%file.yaml::id` loads the external file
//!    first. Expansion is iterative with a depth limit; a macro cycle
//!    fails the build with the offending chain.
//!
//! Macro-spliced subtrees are recorded so that resolution treats them as
//! raw data: a copied `_target_` mapping stays a mapping instead of being
//! instantiated a second time.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::loader::Loader;
use crate::node::Node;
use crate::path::{self, Id};
use crate::resolver::MACRO_SIGIL;

/// Macro expansion depth limit.
const MAX_MACRO_DEPTH: usize = 32;

/// Matches a `file.yaml::id` macro target, splitting file path from id.
static MACRO_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+\.(?:yaml|yml))(?:::(.*))?$").expect("valid macro path pattern")
});

/// The unit stored in the graph: an identifier and its raw node.
#[derive(Debug, Clone)]
pub struct ConfigItem {
    pub id: Id,
    pub raw: Node,
}

/// Mapping from canonical identifier to config item, closed under descent.
#[derive(Debug, Clone)]
pub struct Graph {
    items: IndexMap<String, ConfigItem>,
    spliced: Vec<Id>,
}

impl Graph {
    /// Build the graph from a merged tree.
    ///
    /// Runs the relative-id rewrite and macro expansion pre-passes, then
    /// flattens every node into an item.
    pub fn build(tree: Node, loader: &Loader) -> Result<Graph> {
        let rewritten = rewrite_tree(tree, &Id::root())?;
        let mut spliced = Vec::new();
        let mut stack = Vec::new();
        let expanded = expand_macros(
            rewritten.clone(),
            &Id::root(),
            &rewritten,
            loader,
            &mut stack,
            &mut spliced,
        )?;

        let mut items = IndexMap::new();
        expanded.traverse(&mut |id: &Id, node: &Node| {
            items.insert(
                id.to_string(),
                ConfigItem {
                    id: id.clone(),
                    raw: node.clone(),
                },
            );
        });

        Ok(Graph { items, spliced })
    }

    /// The raw merged (and expanded) tree.
    pub fn root(&self) -> &Node {
        &self.items[""].raw
    }

    pub fn item(&self, id: &Id) -> Option<&ConfigItem> {
        self.items.get(&id.to_string())
    }

    /// Raw node at `id`, if present.
    pub fn get(&self, id: &Id) -> Option<&Node> {
        self.item(id).map(|item| &item.raw)
    }

    pub fn has(&self, id: &Id) -> bool {
        self.items.contains_key(&id.to_string())
    }

    /// All canonical identifiers, in traversal order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn items(&self) -> impl Iterator<Item = &ConfigItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Identifiers grouped by top-level section, for listing.
    pub fn keys_by_section(&self) -> IndexMap<String, Vec<String>> {
        let mut sections: IndexMap<String, Vec<String>> = IndexMap::new();
        for key in self.items.keys() {
            if key.is_empty() {
                continue;
            }
            let section = match key.split_once(path::ID_SEPARATOR) {
                Some((section, _)) => section,
                None => key.as_str(),
            };
            sections.entry(section.to_string()).or_default().push(key.clone());
        }
        sections
    }

    /// Whether `id` lies at or below a macro-spliced subtree.
    pub fn is_spliced(&self, id: &Id) -> bool {
        self.spliced.iter().any(|root| id.starts_with(root))
    }
}

/// Pass 1: rewrite relative `@::`/`%::` prefixes in every string scalar.
fn rewrite_tree(node: Node, id: &Id) -> Result<Node> {
    match node {
        Node::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                let child = rewrite_tree(value, &id.child_key(&key))?;
                out.insert(key, child);
            }
            Ok(Node::Map(out))
        }
        Node::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                out.push(rewrite_tree(item, &id.child_index(index))?);
            }
            Ok(Node::Seq(out))
        }
        Node::String(text) => Ok(Node::String(path::rewrite_relative(&text, id)?)),
        other => Ok(other),
    }
}

/// Pass 2: expand `%` macros, marking spliced roots.
fn expand_macros(
    node: Node,
    id: &Id,
    root: &Node,
    loader: &Loader,
    stack: &mut Vec<String>,
    spliced: &mut Vec<Id>,
) -> Result<Node> {
    match node {
        Node::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                let child = expand_macros(value, &id.child_key(&key), root, loader, stack, spliced)?;
                out.insert(key, child);
            }
            Ok(Node::Map(out))
        }
        Node::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                out.push(expand_macros(
                    item,
                    &id.child_index(index),
                    root,
                    loader,
                    stack,
                    spliced,
                )?);
            }
            Ok(Node::Seq(out))
        }
        Node::String(text) if text.starts_with(MACRO_SIGIL) => {
            let copied = expand_one_macro(&text, root, loader, stack)?;
            spliced.push(id.clone());
            Ok(copied)
        }
        other => Ok(other),
    }
}

/// Expand a single `%target` token into a copy of the referenced raw node,
/// expanding nested macros inside the copy.
fn expand_one_macro(
    token: &str,
    root: &Node,
    loader: &Loader,
    stack: &mut Vec<String>,
) -> Result<Node> {
    if stack.iter().any(|entry| entry == token) {
        return Err(Error::parse(format!(
            "circular macro reference: {} -> {token}",
            stack.join(" -> "),
        )));
    }
    if stack.len() >= MAX_MACRO_DEPTH {
        return Err(Error::parse(format!(
            "macro expansion exceeded depth limit ({MAX_MACRO_DEPTH}) at `{token}`"
        )));
    }

    let target = &token[MACRO_SIGIL.len_utf8()..];
    let (file, id_text) = split_path_id(target);
    let target_id = Id::parse(id_text)?;

    let copied = match file {
        None => root.descend(&target_id)?.clone(),
        Some(file) => {
            let (external, _) = loader.load_file(file)?;
            external.descend(&target_id)?.clone()
        }
    };

    stack.push(token.to_string());
    let expanded = expand_nested(copied, root, loader, stack);
    stack.pop();
    expanded
}

/// Expand macros inside a spliced copy. Only `%` tokens are interpreted;
/// the rest of the copy stays raw.
fn expand_nested(
    node: Node,
    root: &Node,
    loader: &Loader,
    stack: &mut Vec<String>,
) -> Result<Node> {
    match node {
        Node::Map(entries) => {
            let mut out = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                out.insert(key, expand_nested(value, root, loader, stack)?);
            }
            Ok(Node::Map(out))
        }
        Node::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(expand_nested(item, root, loader, stack)?);
            }
            Ok(Node::Seq(out))
        }
        Node::String(text) if text.starts_with(MACRO_SIGIL) => {
            expand_one_macro(&text, root, loader, stack)
        }
        other => Ok(other),
    }
}

/// Split a macro target into an optional file path and an id.
///
/// The file part must end in `.yaml`/`.yml`; everything after the
/// following `::` is the id into that file.
fn split_path_id(target: &str) -> (Option<&str>, &str) {
    match MACRO_PATH_RE.captures(target) {
        Some(caps) => {
            let file = caps.get(1).map(|m| m.as_str());
            let id = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            (file, id)
        }
        None => (None, target),
    }
}
