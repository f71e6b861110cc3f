//! Static configuration checking.
//!
//! Verifies a built graph without invoking any constructors: every `@`
//! reference must point at an existing item, the reference graph must be
//! acyclic, and directive mappings must be well-formed. Also counts
//! references, expressions, and components for reporting.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::suggest;
use crate::graph::Graph;
use crate::instantiate::{self, Registry};
use crate::node::Node;
use crate::resolver::{self, EXPR_SIGIL};

/// Result of a configuration check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub num_references: usize,
    pub num_expressions: usize,
    pub num_components: usize,
    /// All config ids found, in traversal order.
    pub ids: Vec<String>,
}

impl CheckReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        if self.is_valid() && self.warnings.is_empty() {
            return "Check passed!".to_string();
        }
        let mut parts = Vec::new();
        if !self.errors.is_empty() {
            parts.push(format!(
                "{} error{}",
                self.errors.len(),
                if self.errors.len() > 1 { "s" } else { "" }
            ));
        }
        if !self.warnings.is_empty() {
            parts.push(format!(
                "{} warning{}",
                self.warnings.len(),
                if self.warnings.len() > 1 { "s" } else { "" }
            ));
        }
        if self.is_valid() {
            format!("Check passed with {}", parts.join(", "))
        } else {
            format!("Check failed: {}", parts.join(", "))
        }
    }

    /// Promote warnings to errors.
    pub fn strict(mut self) -> CheckReport {
        self.errors.append(&mut self.warnings);
        self
    }
}

/// Check a built graph against a registry.
pub fn check_graph(graph: &Graph, registry: &Registry) -> CheckReport {
    let mut report = CheckReport::default();
    let known: HashSet<&str> = graph.ids().collect();

    for item in graph.items() {
        let id_text = item.id.to_string();
        if !id_text.is_empty() {
            report.ids.push(id_text.clone());
        }
        if graph.is_spliced(&item.id) {
            // Spliced subtrees are raw data; their markers are inert.
            continue;
        }

        match &item.raw {
            Node::String(text) => {
                if text.starts_with(EXPR_SIGIL) {
                    report.num_expressions += 1;
                }
                for reference in resolver::scan_references(text) {
                    report.num_references += 1;
                    if !known.contains(reference.as_str()) {
                        let close = suggest(&reference, known.iter().copied());
                        let mut message =
                            format!("unresolvable reference `@{reference}` at `{id_text}`");
                        if let Some(hint) = close.first() {
                            message.push_str(&format!(" (did you mean `{hint}`?)"));
                        }
                        report.errors.push(message);
                    }
                }
            }
            Node::Map(map) if instantiate::is_instantiation_site(map) => {
                report.num_components += 1;
                check_directive(map, &id_text, registry, &mut report);
            }
            _ => {}
        }
    }

    if let Some(cycle) = find_cycle(graph) {
        report
            .errors
            .push(format!("circular reference: {}", cycle.join(" -> ")));
    }

    report
}

/// Validate the directive keys of an instantiation site.
fn check_directive(
    map: &indexmap::IndexMap<String, Node>,
    id: &str,
    registry: &Registry,
    report: &mut CheckReport,
) {
    match map.get(instantiate::TARGET_KEY) {
        Some(Node::String(target)) => {
            let is_reference = target.starts_with(resolver::REF_SIGIL)
                || target.starts_with(EXPR_SIGIL);
            if !is_reference && !registry.is_empty() && !registry.contains(target) {
                let close = suggest(target, registry.names());
                let mut message =
                    format!("component `{target}` at `{id}` is not registered");
                if let Some(hint) = close.first() {
                    message.push_str(&format!(" (did you mean `{hint}`?)"));
                }
                report.warnings.push(message);
            }
        }
        Some(other) => report.errors.push(format!(
            "`{}` at `{id}` must be a string, got {}",
            instantiate::TARGET_KEY,
            other.type_name()
        )),
        None => {}
    }

    if let Some(args) = map.get(instantiate::ARGS_KEY) {
        if !args.is_seq() && !matches!(args, Node::String(s) if s.starts_with(resolver::REF_SIGIL) || s.starts_with(EXPR_SIGIL))
        {
            report.errors.push(format!(
                "`{}` at `{id}` must be a sequence, got {}",
                instantiate::ARGS_KEY,
                args.type_name()
            ));
        }
    }

    if let Some(Node::String(mode)) = map.get(instantiate::MODE_KEY) {
        if !matches!(mode.as_str(), "default" | "callable" | "debug") {
            report.errors.push(format!(
                "unknown `{}` value `{mode}` at `{id}`",
                instantiate::MODE_KEY
            ));
        }
    }
}

/// Look for a cycle in the reference graph (structural children plus `@`
/// dependencies). Returns the participants of the first cycle found.
fn find_cycle(graph: &Graph) -> Option<Vec<String>> {
    // Edges: item -> its syntactic dependencies. Structural parent->child
    // edges cannot form a cycle on their own, but a reference back into an
    // ancestor closes one, so both edge kinds are walked.
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for item in graph.items() {
        if graph.is_spliced(&item.id) {
            continue;
        }
        let id_text = item.id.to_string();
        let mut targets = Vec::new();
        match &item.raw {
            Node::Map(map) => {
                for key in map.keys() {
                    targets.push(item.id.child_key(key).to_string());
                }
            }
            Node::Seq(items) => {
                for index in 0..items.len() {
                    targets.push(item.id.child_index(index).to_string());
                }
            }
            Node::String(_) => {
                for dep in resolver::dependencies(&item.raw) {
                    targets.push(dep);
                }
            }
            _ => {}
        }
        edges.insert(id_text, targets);
    }

    let mut visiting = Vec::new();
    let mut done: HashSet<String> = HashSet::new();
    for start in edges.keys() {
        if let Some(cycle) = visit(start, &edges, &mut visiting, &mut done) {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    node: &str,
    edges: &HashMap<String, Vec<String>>,
    visiting: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Option<Vec<String>> {
    if done.contains(node) {
        return None;
    }
    if let Some(position) = visiting.iter().position(|entry| entry == node) {
        let mut cycle: Vec<String> = visiting[position..].to_vec();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    visiting.push(node.to_string());
    if let Some(targets) = edges.get(node) {
        for target in targets {
            if let Some(cycle) = visit(target, edges, visiting, done) {
                return Some(cycle);
            }
        }
    }
    visiting.pop();
    done.insert(node.to_string());
    None
}
