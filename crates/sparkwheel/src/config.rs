//! Top-level configuration API.
//!
//! [`Config`] owns the merged raw tree and everything resolution needs:
//! the item graph (built lazily), the resolved cache, the component
//! [`Registry`], the expression evaluator, and the [`Settings`] toggles.
//!
//! ```no_run
//! use sparkwheel::{Config, Value};
//!
//! let mut config = Config::load(["base.yaml", "override.yaml"])?;
//! config.apply_overrides(&["model::lr=0.01".to_string()])?;
//! let lr = config.resolve("model::lr")?;
//! # Ok::<(), sparkwheel::Error>(())
//! ```

use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::check::{self, CheckReport};
use crate::error::{Error, Result};
use crate::expr::{Evaluator, ExprEvaluator};
use crate::graph::Graph;
use crate::instantiate::Registry;
use crate::loader::{Loader, SourceMap};
use crate::merge::{self, DELETE_PREFIX, REPLACE_PREFIX};
use crate::node::Node;
use crate::overrides;
use crate::path::{Id, Segment};
use crate::resolver::{self, ResolveCtx};
use crate::schema::{self, Schema};
use crate::value::Value;

/// Engine toggles, all off by default.
///
/// Each is also recognized as a `SPARKWHEEL_*` environment variable by
/// [`Settings::from_env`].
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Downgrade missing `@` references to null plus a warning.
    pub allow_missing_reference: bool,
    /// Fail on duplicate mapping keys within one file.
    pub strict_keys: bool,
    /// Return `$` scalars as literal strings without evaluation.
    pub disable_expressions: bool,
    /// Verbose diagnostics.
    pub debug: bool,
}

impl Settings {
    /// Read toggles from `SPARKWHEEL_ALLOW_MISSING_REFERENCE`,
    /// `SPARKWHEEL_STRICT_KEYS`, `SPARKWHEEL_DISABLE_EXPRESSIONS`, and
    /// `SPARKWHEEL_DEBUG`.
    pub fn from_env() -> Settings {
        Settings {
            allow_missing_reference: env_flag("SPARKWHEEL_ALLOW_MISSING_REFERENCE"),
            strict_keys: env_flag("SPARKWHEEL_STRICT_KEYS"),
            disable_expressions: env_flag("SPARKWHEEL_DISABLE_EXPRESSIONS"),
            debug: env_flag("SPARKWHEEL_DEBUG"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// A loaded configuration: raw tree plus resolution machinery.
pub struct Config {
    tree: Node,
    settings: Settings,
    registry: Registry,
    namespace: IndexMap<String, Value>,
    evaluator: Box<dyn Evaluator>,
    sources: SourceMap,
    graph: Option<Graph>,
    cache: IndexMap<String, Value>,
}

impl Config {
    /// Empty configuration with default settings.
    pub fn new() -> Config {
        Config::from_node(Node::empty_map())
    }

    /// Wrap an already-built raw tree.
    pub fn from_node(tree: Node) -> Config {
        Config {
            tree,
            settings: Settings::default(),
            registry: Registry::new(),
            namespace: IndexMap::new(),
            evaluator: Box::new(ExprEvaluator),
            sources: SourceMap::new(),
            graph: None,
            cache: IndexMap::new(),
        }
    }

    /// Load one or more YAML files, merged in order.
    pub fn load<I, P>(paths: I) -> Result<Config>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Config::load_with(paths, Settings::default())
    }

    /// Load with explicit settings (strict-keys applies at parse time).
    pub fn load_with<I, P>(paths: I, settings: Settings) -> Result<Config>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let loader = Loader::new(settings.strict_keys);
        let mut layers = Vec::new();
        let mut sources = SourceMap::new();
        for path in paths {
            let (node, map) = loader.load_file(path)?;
            layers.push(node);
            sources.merge(map);
        }
        let tree = merge::merge_layers(layers)?;
        let mut config = Config::from_node(tree);
        config.settings = settings;
        config.sources = sources;
        Ok(config)
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: Settings) -> Config {
        self.settings = settings;
        self.invalidate();
        self
    }

    /// Replace the component registry.
    pub fn with_registry(mut self, registry: Registry) -> Config {
        self.registry = registry;
        self.invalidate();
        self
    }

    /// Bind namespace globals visible to expressions.
    pub fn with_namespace(mut self, namespace: IndexMap<String, Value>) -> Config {
        self.namespace = namespace;
        self.invalidate();
        self
    }

    /// Swap in a different expression evaluator.
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Config {
        self.evaluator = evaluator;
        self.invalidate();
        self
    }

    /// Register a component constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(crate::value::CallArgs) -> std::result::Result<Value, String>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, constructor);
        self.invalidate();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The merged raw tree.
    pub fn tree(&self) -> &Node {
        &self.tree
    }

    /// Raw (unresolved) value at `id`, or `None` when absent.
    pub fn get(&self, id: &str) -> Option<&Node> {
        let id = Id::parse(id).ok()?;
        self.tree.descend(&id).ok()
    }

    /// Whether `id` exists in the raw tree.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Set a raw value, creating intermediate mappings as needed.
    pub fn set(&mut self, id: &str, value: Node) -> Result<()> {
        let id = Id::parse(id)?;
        if id.is_root() {
            self.tree = value;
            self.invalidate();
            return Ok(());
        }

        if !self.tree.is_map() {
            self.tree = Node::empty_map();
        }
        let mut current = &mut self.tree;
        let segments = id.segments();
        for segment in &segments[..segments.len() - 1] {
            current = step_into(current, segment);
        }

        match (current, segments.last().expect("non-root id")) {
            (Node::Seq(seq), Segment::Index(i)) if *i < seq.len() => seq[*i] = value,
            (Node::Seq(seq), Segment::Index(i)) if *i == seq.len() => seq.push(value),
            (Node::Seq(_), segment) => {
                return Err(Error::parse(format!(
                    "cannot set `{id}`: index `{segment}` is out of range"
                )));
            }
            (node, segment) => {
                if !node.is_map() {
                    *node = Node::empty_map();
                }
                node.as_map_mut()
                    .expect("just ensured mapping")
                    .insert(segment.as_key(), value);
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Remove a raw value. Removing an absent id is not an error.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let id = Id::parse(id)?;
        if id.is_root() {
            self.tree = Node::empty_map();
            self.invalidate();
            return Ok(());
        }
        let parent = id.parent().expect("non-root id");
        let last = id.last().expect("non-root id");

        let mut current = &mut self.tree;
        for segment in parent.segments() {
            current = match (current, segment) {
                (Node::Map(map), seg) => match map.get_mut(&seg.as_key()) {
                    Some(child) => child,
                    None => return Ok(()),
                },
                (Node::Seq(seq), Segment::Index(i)) if *i < seq.len() => &mut seq[*i],
                _ => return Ok(()),
            };
        }
        match (current, last) {
            (Node::Map(map), seg) => {
                map.shift_remove(&seg.as_key());
            }
            (Node::Seq(seq), Segment::Index(i)) if *i < seq.len() => {
                seq.remove(*i);
            }
            _ => {}
        }
        self.invalidate();
        Ok(())
    }

    /// Merge another raw tree onto this configuration.
    pub fn merge_node(&mut self, overlay: Node) -> Result<()> {
        merge::merge_into(&mut self.tree, overlay)?;
        self.invalidate();
        Ok(())
    }

    /// Merge a YAML file onto this configuration.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let loader = Loader::new(self.settings.strict_keys);
        let (node, sources) = loader.load_file(path)?;
        self.sources.merge(sources);
        self.merge_node(node)
    }

    /// Batch id/value updates with operator prefixes on the ids:
    /// `=id` or a bare id sets, `~id` deletes.
    pub fn update(&mut self, pairs: IndexMap<String, Node>) -> Result<()> {
        for (key, value) in pairs {
            if let Some(id) = key.strip_prefix(DELETE_PREFIX) {
                self.delete(id)?;
            } else if let Some(id) = key.strip_prefix(REPLACE_PREFIX) {
                self.set(id, value)?;
            } else {
                self.set(&key, value)?;
            }
        }
        Ok(())
    }

    /// Apply CLI override strings (`[~|=]id=literal`).
    pub fn apply_overrides<S: AsRef<str>>(&mut self, args: &[S]) -> Result<()> {
        let tree = overrides::parse_overrides(args)?;
        self.merge_node(tree)
    }

    /// Resolve `id`: substitute references, evaluate expressions, and
    /// instantiate directive mappings. The empty id resolves the whole
    /// tree.
    pub fn resolve(&mut self, id: &str) -> Result<Value> {
        self.resolve_impl(id, true)
    }

    /// Resolve without instantiating: directive mappings come back as
    /// resolved mappings with their reserved keys intact.
    pub fn resolve_raw(&mut self, id: &str) -> Result<Value> {
        self.resolve_impl(id, false)
    }

    fn resolve_impl(&mut self, id: &str, instantiate: bool) -> Result<Value> {
        let target = Id::parse(id)?;
        self.ensure_graph()?;
        if self.settings.debug {
            debug!(id = %target, instantiate, "resolving");
        }

        let graph = self.graph.as_ref().expect("graph built above");
        // Raw-mode results are kept out of the persistent cache so a later
        // instantiating resolve does not see them.
        let mut raw_cache = IndexMap::new();
        let cache = if instantiate {
            &mut self.cache
        } else {
            &mut raw_cache
        };
        let mut ctx = ResolveCtx {
            graph,
            registry: &self.registry,
            evaluator: self.evaluator.as_ref(),
            namespace: &self.namespace,
            settings: &self.settings,
            sources: &self.sources,
            cache,
            stack: Vec::new(),
            instantiate,
        };
        resolver::resolve_id(&mut ctx, &target)
    }

    /// Statically check the configuration; `strict` promotes warnings.
    pub fn check(&mut self, strict: bool) -> Result<CheckReport> {
        self.ensure_graph()?;
        let graph = self.graph.as_ref().expect("graph built above");
        let report = check::check_graph(graph, &self.registry);
        Ok(if strict { report.strict() } else { report })
    }

    /// Validate the fully resolved tree against a schema.
    pub fn validate(&mut self, schema: &Schema) -> Result<()> {
        let resolved = self.resolve("")?;
        schema::validate(&resolved, schema)
    }

    /// All canonical identifiers in the graph.
    pub fn ids(&mut self) -> Result<Vec<String>> {
        self.ensure_graph()?;
        let graph = self.graph.as_ref().expect("graph built above");
        Ok(graph.ids().filter(|id| !id.is_empty()).map(String::from).collect())
    }

    /// Identifiers grouped by top-level section.
    pub fn keys_by_section(&mut self) -> Result<IndexMap<String, Vec<String>>> {
        self.ensure_graph()?;
        let graph = self.graph.as_ref().expect("graph built above");
        Ok(graph.keys_by_section())
    }

    /// Build the graph if the tree changed since the last resolution.
    fn ensure_graph(&mut self) -> Result<()> {
        if self.graph.is_none() {
            let loader = Loader::new(self.settings.strict_keys);
            self.graph = Some(Graph::build(self.tree.clone(), &loader)?);
        }
        Ok(())
    }

    /// Drop the graph and resolved cache after a mutation.
    fn invalidate(&mut self) {
        self.graph = None;
        self.cache.clear();
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

/// Step into `segment` of `current` for `set`, creating mappings along the
/// way. Non-container intermediates are replaced by mappings; sequence
/// segments within range are entered in place.
fn step_into<'a>(current: &'a mut Node, segment: &Segment) -> &'a mut Node {
    let enter_seq =
        matches!((&*current, segment), (Node::Seq(seq), Segment::Index(i)) if *i < seq.len());
    if enter_seq {
        match (current, segment) {
            (Node::Seq(seq), Segment::Index(i)) => return &mut seq[*i],
            _ => unreachable!("shape checked above"),
        }
    }
    if !current.is_map() {
        *current = Node::empty_map();
    }
    let map = current.as_map_mut().expect("just ensured mapping");
    map.entry(segment.as_key()).or_insert_with(Node::empty_map)
}
