//! Component instantiation for `_target_` mappings.
//!
//! A mapping item is an *instantiation site* iff it carries a `_target_`
//! key. The instantiator resolves the directive keys, locates the
//! constructor in the [`Registry`] (the statically-linked substitute for
//! dotted-path imports), and invokes it. All non-reserved keys become
//! keyword arguments, each resolved as a child item first — so arguments
//! may themselves be references, expressions, or nested sites.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{suggest, Error, Result};
use crate::node::Node;
use crate::resolver::{self, ResolveCtx};
use crate::path::Id;
use crate::value::{CallArgs, Callable, ConstructorFn, Value};

/// Reserved directive key naming the component to invoke.
pub const TARGET_KEY: &str = "_target_";
/// Reserved directive key holding positional arguments.
pub const ARGS_KEY: &str = "_args_";
/// Reserved directive key short-circuiting the site to null.
pub const DISABLED_KEY: &str = "_disabled_";
/// Reserved directive key listing extra dependencies to resolve first.
pub const REQUIRES_KEY: &str = "_requires_";
/// Reserved directive key selecting the invocation mode.
pub const MODE_KEY: &str = "_mode_";

const RESERVED_KEYS: [&str; 5] = [TARGET_KEY, ARGS_KEY, DISABLED_KEY, REQUIRES_KEY, MODE_KEY];

/// Whether `key` is one of the reserved directive keys.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Whether a mapping is an instantiation site.
pub fn is_instantiation_site(map: &IndexMap<String, Node>) -> bool {
    map.contains_key(TARGET_KEY)
}

/// Invocation mode of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Call the target and return its result.
    #[default]
    Default,
    /// Return the target itself, or a partial binding the provided
    /// arguments.
    Callable,
    /// Call the target under a debug hook logging entry and exit.
    Debug,
}

impl Mode {
    fn from_value(value: &Value, id: &Id) -> Result<Mode> {
        let text = value.as_str().ok_or_else(|| Error::Instantiation {
            id: id.to_string(),
            message: format!("`{MODE_KEY}` must be a string, got {}", value.type_name()),
            suggestion: None,
        })?;
        match text {
            "default" => Ok(Mode::Default),
            "callable" => Ok(Mode::Callable),
            "debug" => Ok(Mode::Debug),
            other => Err(Error::Instantiation {
                id: id.to_string(),
                message: format!("unknown `{MODE_KEY}` value `{other}`"),
                suggestion: Some("valid modes are `default`, `callable`, and `debug`".into()),
            }),
        }
    }
}

/// Registry of component constructors, keyed by name.
///
/// Populated at startup by the embedding application; `_target_` strings
/// resolve through it.
#[derive(Clone, Default)]
pub struct Registry {
    constructors: IndexMap<String, Arc<ConstructorFn>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a constructor under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(CallArgs) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ConstructorFn>> {
        self.constructors.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run the instantiation protocol for the site at `id`.
///
/// 1. resolve `_disabled_`; truthy short-circuits to null
/// 2. resolve `_requires_` entries in order, discarding their values
/// 3. resolve `_target_` to a callable
/// 4. resolve `_args_` and the keyword arguments
/// 5. branch on `_mode_`
pub(crate) fn instantiate_site(
    ctx: &mut ResolveCtx<'_>,
    id: &Id,
    map: &IndexMap<String, Node>,
) -> Result<Value> {
    if map.contains_key(DISABLED_KEY) {
        let disabled = resolver::resolve_id(ctx, &id.child_key(DISABLED_KEY))?;
        if disabled.is_truthy() {
            return Ok(Value::Null);
        }
    }

    if let Some(requires) = map.get(REQUIRES_KEY) {
        resolve_requires(ctx, id, requires)?;
    }

    let target = resolver::resolve_id(ctx, &id.child_key(TARGET_KEY))?;
    let (name, constructor) = locate_target(ctx, id, &target)?;

    let args = match map.get(ARGS_KEY) {
        Some(_) => {
            let resolved = resolver::resolve_id(ctx, &id.child_key(ARGS_KEY))?;
            match resolved {
                Value::Seq(items) => items,
                other => {
                    return Err(Error::Instantiation {
                        id: id.to_string(),
                        message: format!(
                            "`{ARGS_KEY}` must be a sequence, got {}",
                            other.type_name()
                        ),
                        suggestion: None,
                    });
                }
            }
        }
        None => Vec::new(),
    };

    let mut kwargs = IndexMap::new();
    for key in map.keys() {
        if is_reserved_key(key) {
            continue;
        }
        let value = resolver::resolve_id(ctx, &id.child_key(key))?;
        kwargs.insert(key.clone(), value);
    }

    let mode = match map.get(MODE_KEY) {
        Some(_) => {
            let resolved = resolver::resolve_id(ctx, &id.child_key(MODE_KEY))?;
            Mode::from_value(&resolved, id)?
        }
        None => Mode::Default,
    };

    let call = CallArgs::new(args, kwargs);
    match mode {
        Mode::Default => invoke(id, &name, &constructor, call),
        Mode::Callable => {
            if call.is_empty() {
                Ok(Value::Callable(Arc::new(Callable::new(name, constructor))))
            } else {
                Ok(Value::Callable(Arc::new(Callable::bind(
                    name,
                    constructor,
                    call,
                ))))
            }
        }
        Mode::Debug => {
            debug!(site = %id, target = %name, "invoking component under debug hook");
            let result = invoke(id, &name, &constructor, call);
            match &result {
                Ok(value) => debug!(site = %id, target = %name, kind = value.type_name(), "component returned"),
                Err(err) => debug!(site = %id, target = %name, error = %err, "component failed"),
            }
            result
        }
    }
}

/// Resolve `_requires_` entries in order; values are discarded.
///
/// Entries may be plain identifiers or `@` markers; anything else resolves
/// as a child item for its side effects.
fn resolve_requires(ctx: &mut ResolveCtx<'_>, id: &Id, requires: &Node) -> Result<()> {
    let entries: Vec<&Node> = match requires {
        Node::Seq(items) => items.iter().collect(),
        single => vec![single],
    };
    for (index, entry) in entries.iter().enumerate() {
        match entry.as_str() {
            Some(text) => {
                let target = text.strip_prefix(resolver::REF_SIGIL).unwrap_or(text);
                let target_id = Id::parse(target)?;
                resolver::resolve_id(ctx, &target_id)?;
            }
            None => {
                let child = match requires {
                    Node::Seq(_) => id.child_key(REQUIRES_KEY).child_index(index),
                    _ => id.child_key(REQUIRES_KEY),
                };
                resolver::resolve_id(ctx, &child)?;
            }
        }
    }
    Ok(())
}

/// Turn a resolved `_target_` value into a named constructor.
fn locate_target(
    ctx: &ResolveCtx<'_>,
    id: &Id,
    target: &Value,
) -> Result<(String, Arc<ConstructorFn>)> {
    match target {
        Value::String(name) => match ctx.registry.get(name) {
            Some(constructor) => Ok((name.clone(), constructor)),
            None => {
                let close = suggest(name, ctx.registry.names());
                Err(Error::Instantiation {
                    id: id.to_string(),
                    message: format!("no component registered under `{name}`"),
                    suggestion: if close.is_empty() {
                        None
                    } else {
                        Some(format!("did you mean `{}`?", close.join("`, `")))
                    },
                })
            }
        },
        Value::Callable(callable) => {
            // A target that already resolved to a callable (e.g. via an
            // `@`-reference to a `_mode_: callable` site) is used directly.
            let callable = Arc::clone(callable);
            let name = callable.name().to_string();
            let func: Arc<ConstructorFn> =
                Arc::new(move |call: CallArgs| callable.call(call));
            Ok((name, func))
        }
        other => Err(Error::Instantiation {
            id: id.to_string(),
            message: format!(
                "`{TARGET_KEY}` must be a component name or callable, got {}",
                other.type_name()
            ),
            suggestion: None,
        }),
    }
}

fn invoke(
    id: &Id,
    name: &str,
    constructor: &Arc<ConstructorFn>,
    call: CallArgs,
) -> Result<Value> {
    constructor(call).map_err(|message| Error::Instantiation {
        id: id.to_string(),
        message: format!("`{name}` failed: {message}"),
        suggestion: None,
    })
}
