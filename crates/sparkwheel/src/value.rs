//! Resolved configuration values.
//!
//! A [`Value`] is what resolution produces: the scalar/container shapes of
//! [`Node`](crate::node::Node) plus two runtime-only kinds — [`Value::Object`]
//! for instantiated components and [`Value::Callable`] for constructors
//! returned by `_mode_: callable` sites.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::node::Node;

/// Positional and keyword arguments handed to a constructor.
#[derive(Clone, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: IndexMap<String, Value>) -> Self {
        CallArgs { args, kwargs }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }

    /// Keyword argument by name.
    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }

    /// Positional argument by index.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

impl fmt::Debug for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallArgs")
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

/// A registered component constructor.
///
/// Constructors receive resolved arguments and either produce a value or an
/// error message; the engine wraps failures into instantiation errors
/// annotated with the site's identifier.
pub type ConstructorFn = dyn Fn(CallArgs) -> std::result::Result<Value, String> + Send + Sync;

/// A constructor, possibly with bound arguments (a partial application).
#[derive(Clone)]
pub struct Callable {
    name: String,
    func: Arc<ConstructorFn>,
    bound: CallArgs,
}

impl Callable {
    /// Wrap a bare constructor.
    pub fn new(name: impl Into<String>, func: Arc<ConstructorFn>) -> Self {
        Callable {
            name: name.into(),
            func,
            bound: CallArgs::default(),
        }
    }

    /// Wrap a constructor with arguments bound up front.
    pub fn bind(name: impl Into<String>, func: Arc<ConstructorFn>, bound: CallArgs) -> Self {
        Callable {
            name: name.into(),
            func,
            bound,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke with `extra` arguments appended to (and keyword-overriding)
    /// any bound ones.
    pub fn call(&self, extra: CallArgs) -> std::result::Result<Value, String> {
        let mut args = self.bound.args.clone();
        args.extend(extra.args);
        let mut kwargs = self.bound.kwargs.clone();
        kwargs.extend(extra.kwargs);
        (self.func)(CallArgs { args, kwargs })
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<callable {}>", self.name)
    }
}

/// A fully resolved configuration value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// An instantiated component. Downcast with [`Value::downcast_ref`].
    Object(Arc<dyn Any + Send + Sync>),
    /// A constructor or partial application from `_mode_: callable`.
    Callable(Arc<Callable>),
}

impl Value {
    /// Convert a raw node verbatim, markers and all.
    pub fn from_node(node: &Node) -> Value {
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::Int(*i),
            Node::Float(f) => Value::Float(*f),
            Node::String(s) => Value::String(s.clone()),
            Node::Seq(items) => Value::Seq(items.iter().map(Value::from_node).collect()),
            Node::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_node(v)))
                    .collect(),
            ),
        }
    }

    /// Wrap an arbitrary component instance.
    pub fn object<T: Any + Send + Sync>(value: T) -> Value {
        Value::Object(Arc::new(value))
    }

    /// Borrow the wrapped component if it has type `T`.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
            Value::Object(_) => "object",
            Value::Callable(_) => "callable",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Arc<Callable>> {
        match self {
            Value::Callable(c) => Some(c),
            _ => None,
        }
    }

    /// Truthiness used by `_disabled_`.
    ///
    /// Strings follow the config convention: only a trimmed,
    /// case-insensitive "true" is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            Value::Seq(s) => !s.is_empty(),
            Value::Map(m) => !m.is_empty(),
            Value::Object(_) | Value::Callable(_) => true,
        }
    }

    /// Convert to JSON where possible; objects and callables render as
    /// placeholder strings.
    pub fn to_json_lossy(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Seq(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json_lossy).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_lossy()))
                    .collect(),
            ),
            Value::Object(_) => serde_json::Value::String("<object>".into()),
            Value::Callable(c) => serde_json::Value::String(format!("<callable {}>", c.name())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Value::Object(_) => f.write_str("Object(..)"),
            Value::Callable(c) => write!(f, "Callable({})", c.name()),
        }
    }
}

impl fmt::Display for Value {
    /// Display formatting, also used when a reference is spliced into the
    /// middle of a larger string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
            Value::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Object(_) => f.write_str("<object>"),
            Value::Callable(c) => write!(f, "<callable {}>", c.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_node_verbatim() {
        let node = Node::Map(
            vec![
                ("a".to_string(), Node::Int(1)),
                ("r".to_string(), Node::String("@a".into())),
            ]
            .into_iter()
            .collect(),
        );
        let value = Value::from_node(&node);
        let map = value.as_map().unwrap();
        assert_eq!(map["a"], Value::Int(1));
        // Markers are not interpreted.
        assert_eq!(map["r"], Value::String("@a".into()));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::String("true".into()).is_truthy());
        assert!(Value::String("  TRUE  ".into()).is_truthy());
        assert!(!Value::String("false".into()).is_truthy());
        assert!(!Value::String("yes".into()).is_truthy());
        assert!(Value::Int(1).is_truthy());
        assert!(!Value::Int(0).is_truthy());
    }

    #[test]
    fn test_object_downcast() {
        let value = Value::object(42usize);
        assert_eq!(value.downcast_ref::<usize>(), Some(&42));
        assert!(value.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_numeric_equality_across_kinds() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Float(2.5));
    }

    #[test]
    fn test_callable_partial_binding() {
        let func: Arc<ConstructorFn> = Arc::new(|call: CallArgs| {
            let a = call.kwarg("a").and_then(Value::as_int).unwrap_or(0);
            let b = call.kwarg("b").and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        let bound = CallArgs::new(
            Vec::new(),
            vec![("a".to_string(), Value::Int(10))].into_iter().collect(),
        );
        let partial = Callable::bind("add", func, bound);
        let extra = CallArgs::new(
            Vec::new(),
            vec![("b".to_string(), Value::Int(5))].into_iter().collect(),
        );
        assert_eq!(partial.call(extra).unwrap(), Value::Int(15));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Value::Seq(vec![Value::Int(1), Value::Int(2)]).to_string(), "[1, 2]");
        assert_eq!(Value::String("plain".into()).to_string(), "plain");
    }
}
