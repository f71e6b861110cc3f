//! Declarative configuration engine.
//!
//! Sparkwheel turns YAML describing data values *and* the construction of
//! runtime objects into fully resolved values. Config items may depend on
//! each other through references, computed expressions, and composition of
//! multiple config layers.
//!
//! # Key features
//!
//! - **References**: `@model::lr` substitutes the resolved value of
//!   another item; a whole-scalar reference keeps its native type.
//! - **Expressions**: `$@n * 2 + 1` evaluates with references bound to
//!   their resolved values; the evaluator is pluggable.
//! - **Raw macros**: `%defaults.yaml::net` splices a raw subtree, from the
//!   current tree or an external file, before resolution.
//! - **Layered merge**: later layers compose onto earlier ones by default;
//!   `=key` replaces, `~key` deletes.
//! - **Instantiation**: mappings carrying `_target_` invoke a registered
//!   component constructor, with arguments resolved first.
//!
//! # Example
//!
//! ```
//! use sparkwheel::{Config, Value};
//!
//! let (tree, _) = sparkwheel::Loader::default()
//!     .load_str("n: 5\ndoubled: \"$@n * 2\"\n", "inline.yaml")?;
//! let mut config = Config::from_node(tree);
//!
//! assert_eq!(config.resolve("doubled")?, Value::Int(10));
//! # Ok::<(), sparkwheel::Error>(())
//! ```
//!
//! Identifiers join segments with `::` (`model::layers::0::weights`); the
//! legacy `#` separator is accepted on input. A leading `::` in a marker is
//! relative to the enclosing item: `@::sibling` names a sibling, each
//! additional `::` ascends one level.

mod check;
mod config;
mod diff;
mod error;
mod expr;
mod graph;
mod instantiate;
mod loader;
mod merge;
mod node;
mod overrides;
mod path;
mod resolver;
mod schema;
mod value;

pub use check::{check_graph, CheckReport};
pub use config::{Config, Settings};
pub use diff::{diff_configs, format_json, format_tree, format_unified, ConfigDiff};
pub use error::{Error, Result, SourceLocation};
pub use expr::{Evaluator, ExprError, ExprEvaluator};
pub use graph::{ConfigItem, Graph};
pub use instantiate::{
    Registry, ARGS_KEY, DISABLED_KEY, MODE_KEY, REQUIRES_KEY, TARGET_KEY,
};
pub use loader::{Loader, SourceMap};
pub use merge::{merge_into, merge_layers, DELETE_PREFIX, REPLACE_PREFIX};
pub use node::Node;
pub use overrides::parse_overrides;
pub use path::{Id, Segment, ID_SEPARATOR};
pub use resolver::{dependencies, scan_references, EXPR_SIGIL, MACRO_SIGIL, REF_SIGIL};
pub use schema::{validate, Schema};
pub use value::{CallArgs, Callable, ConstructorFn, Value};
