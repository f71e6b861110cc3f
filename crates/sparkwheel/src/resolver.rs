//! Dependency-ordered lazy resolution.
//!
//! The resolver materializes the value of a requested identifier: it walks
//! items on demand, rewrites `@` references and `$` expressions, hands
//! directive mappings to the instantiator, detects cycles with a
//! per-resolve stack, and caches results. Within a single resolve,
//! dependencies complete strictly before their dependents; a failed
//! resolution leaves the item unresolved so nothing is poisoned.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::Settings;
use crate::error::{suggest, Error, Result};
use crate::graph::Graph;
use crate::instantiate::{self, Registry};
use crate::loader::SourceMap;
use crate::node::Node;
use crate::path::Id;
use crate::value::Value;
use crate::expr::Evaluator;

/// Marker sigil for resolved references.
pub const REF_SIGIL: char = '@';
/// Marker sigil for host expressions.
pub const EXPR_SIGIL: char = '$';
/// Marker sigil for raw macros (expanded at graph build).
pub const MACRO_SIGIL: char = '%';

/// Reference pattern: longest-valid-identifier match after `@`.
///
/// The id consumes word-character segments joined by `::`; anything after
/// (a `.method(...)` or `[index]`) stays as expression source applied to
/// the substituted value.
static REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z0-9_]+(?:::[A-Za-z0-9_]+)*").expect("valid ref pattern"));

static WHOLE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@[A-Za-z0-9_]+(?:::[A-Za-z0-9_]+)*$").expect("valid whole-ref pattern")
});

/// Identifiers referenced by `@` markers in `text`, in order, deduplicated.
pub fn scan_references(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in REF_RE.find_iter(text) {
        let id = m.as_str()[1..].to_string();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Syntactic dependency set of a raw node: every `@` reference in every
/// string scalar, plus `_requires_` entries of directive mappings.
///
/// The scan never evaluates anything.
pub fn dependencies(node: &Node) -> Vec<String> {
    let mut out = Vec::new();
    collect_dependencies(node, &mut out);
    out
}

fn collect_dependencies(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::String(s) => {
            for id in scan_references(s) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        Node::Seq(items) => {
            for item in items {
                collect_dependencies(item, out);
            }
        }
        Node::Map(entries) => {
            if let Some(requires) = entries.get(instantiate::REQUIRES_KEY) {
                let listed: Vec<&Node> = match requires {
                    Node::Seq(items) => items.iter().collect(),
                    single => vec![single],
                };
                for entry in listed {
                    if let Some(text) = entry.as_str() {
                        let id = text.strip_prefix(REF_SIGIL).unwrap_or(text).to_string();
                        if !out.contains(&id) {
                            out.push(id);
                        }
                    }
                }
            }
            for value in entries.values() {
                collect_dependencies(value, out);
            }
        }
        _ => {}
    }
}

/// State for one outermost resolve call.
///
/// The cache is the only state that survives between calls; the in-progress
/// stack is per-resolve so cycle traces stay precise.
pub(crate) struct ResolveCtx<'a> {
    pub graph: &'a Graph,
    pub registry: &'a Registry,
    pub evaluator: &'a dyn Evaluator,
    pub namespace: &'a IndexMap<String, Value>,
    pub settings: &'a Settings,
    pub sources: &'a SourceMap,
    pub cache: &'a mut IndexMap<String, Value>,
    pub stack: Vec<Id>,
    pub instantiate: bool,
}

/// Resolve one identifier, resolving its dependencies first.
pub(crate) fn resolve_id(ctx: &mut ResolveCtx<'_>, id: &Id) -> Result<Value> {
    let key = id.to_string();
    if let Some(value) = ctx.cache.get(&key) {
        return Ok(value.clone());
    }

    if let Some(position) = ctx.stack.iter().position(|entry| entry == id) {
        let mut participants: Vec<String> =
            ctx.stack[position..].iter().map(|p| p.to_string()).collect();
        participants.push(key);
        return Err(Error::Cycle { participants });
    }

    let graph = ctx.graph;
    let item = match graph.item(id) {
        Some(item) => item,
        None => {
            return Err(Error::KeyNotFound {
                suggestions: suggest(&key, graph.ids()),
                location: ctx.sources.get(&key).cloned(),
                id: key,
            });
        }
    };

    // Macro-spliced subtrees are raw copies: they resolve to themselves,
    // markers and directives included.
    if graph.is_spliced(id) {
        let value = Value::from_node(&item.raw);
        ctx.cache.insert(key, value.clone());
        return Ok(value);
    }

    ctx.stack.push(id.clone());
    let result = resolve_node(ctx, id, &item.raw);
    ctx.stack.pop();

    let value = result?;
    ctx.cache.insert(key, value.clone());
    Ok(value)
}

fn resolve_node(ctx: &mut ResolveCtx<'_>, id: &Id, node: &Node) -> Result<Value> {
    match node {
        Node::Map(map) => {
            if ctx.instantiate && instantiate::is_instantiation_site(map) {
                return instantiate::instantiate_site(ctx, id, map);
            }
            let mut out = IndexMap::with_capacity(map.len());
            for key in map.keys() {
                let value = resolve_id(ctx, &id.child_key(key))?;
                out.insert(key.clone(), value);
            }
            Ok(Value::Map(out))
        }
        Node::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for index in 0..items.len() {
                out.push(resolve_id(ctx, &id.child_index(index))?);
            }
            Ok(Value::Seq(out))
        }
        Node::String(text) => resolve_string(ctx, id, text),
        other => Ok(Value::from_node(other)),
    }
}

/// Resolve a string scalar: expression, whole-scalar reference, embedded
/// references, or plain text.
fn resolve_string(ctx: &mut ResolveCtx<'_>, id: &Id, text: &str) -> Result<Value> {
    if let Some(source) = text.strip_prefix(EXPR_SIGIL) {
        if ctx.settings.disable_expressions {
            return Ok(Value::String(text.to_string()));
        }
        return resolve_expression(ctx, id, source);
    }

    // A scalar that is exactly one reference keeps the target's native type.
    if WHOLE_REF_RE.is_match(text) {
        return resolve_reference(ctx, id, &text[1..]);
    }

    let refs = scan_references(text);
    if refs.is_empty() {
        return Ok(Value::String(text.to_string()));
    }

    // Embedded references substitute textually; the result is a string.
    let mut substituted: IndexMap<String, String> = IndexMap::new();
    for ref_id in refs {
        let value = resolve_reference(ctx, id, &ref_id)?;
        substituted.insert(ref_id, value.to_string());
    }
    let replaced = REF_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let matched = &caps[0][1..];
        substituted
            .get(matched)
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(Value::String(replaced.into_owned()))
}

/// Resolve the target of an `@` reference, honoring the missing-reference
/// policy.
fn resolve_reference(ctx: &mut ResolveCtx<'_>, at: &Id, ref_id: &str) -> Result<Value> {
    let target = Id::parse(ref_id)?;
    match resolve_id(ctx, &target) {
        Ok(value) => Ok(value),
        Err(Error::KeyNotFound { .. }) if ctx.settings.allow_missing_reference => {
            warn!(reference = %ref_id, at = %at, "reference not defined, substituting null");
            Ok(Value::Null)
        }
        Err(other) => Err(other),
    }
}

/// Evaluate a `$` expression, rewriting `@` references to bindings first.
fn resolve_expression(ctx: &mut ResolveCtx<'_>, id: &Id, source: &str) -> Result<Value> {
    let refs = scan_references(source);
    let mut bindings: IndexMap<String, Value> = IndexMap::new();
    let mut names: IndexMap<String, String> = IndexMap::new();
    for (index, ref_id) in refs.into_iter().enumerate() {
        let value = resolve_reference(ctx, id, &ref_id)?;
        let name = format!("__ref_{index}");
        bindings.insert(name.clone(), value);
        names.insert(ref_id, name);
    }

    let rewritten = REF_RE.replace_all(source, |caps: &regex::Captures<'_>| {
        let matched = &caps[0][1..];
        names
            .get(matched)
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });

    ctx.evaluator
        .eval(&rewritten, &bindings, ctx.namespace)
        .map_err(|e| Error::Expression {
            id: id.to_string(),
            message: e.message,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_references_simple() {
        assert_eq!(scan_references("@myref"), vec!["myref"]);
    }

    #[test]
    fn test_scan_references_nested() {
        assert_eq!(
            scan_references("@parent::child::0"),
            vec!["parent::child::0"]
        );
    }

    #[test]
    fn test_scan_references_in_expression() {
        assert_eq!(scan_references("$@value * 2"), vec!["value"]);
        assert_eq!(scan_references("$@a + @b"), vec!["a", "b"]);
    }

    #[test]
    fn test_scan_references_dedup_and_order() {
        assert_eq!(scan_references("$@a + @b + @a"), vec!["a", "b"]);
    }

    #[test]
    fn test_scan_references_none() {
        assert!(scan_references("plain string").is_empty());
    }

    #[test]
    fn test_scan_references_stop_at_non_identifier() {
        // The reference ends at the first character that cannot belong to
        // an identifier; the rest stays as expression source.
        assert_eq!(scan_references("$@cfg.lr * 2"), vec!["cfg"]);
        assert_eq!(scan_references("$@xs[0]"), vec!["xs"]);
    }

    #[test]
    fn test_dependencies_collects_requires() {
        let mut map = indexmap::IndexMap::new();
        map.insert("_target_".to_string(), Node::String("T".into()));
        map.insert(
            "_requires_".to_string(),
            Node::Seq(vec![
                Node::String("@setup".into()),
                Node::String("env::init".into()),
            ]),
        );
        map.insert("x".to_string(), Node::String("@n".into()));
        let deps = dependencies(&Node::Map(map));
        assert_eq!(deps, vec!["setup", "env::init", "n"]);
    }
}
