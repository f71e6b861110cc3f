//! Declarative schema validation over resolved values.
//!
//! A small external-collaborator surface: a [`Schema`] describes the
//! expected shape and [`validate`] checks a resolved [`Value`] against it,
//! reporting every path-qualified mismatch at once.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Expected shape of a resolved value.
#[derive(Debug, Clone)]
pub enum Schema {
    /// Anything, including objects and callables.
    Any,
    Bool,
    Int,
    /// Accepts floats and integers.
    Float,
    Str,
    /// Homogeneous sequence.
    Seq(Box<Schema>),
    /// Mapping with per-field schemas. Fields listed in `required` must be
    /// present; unknown fields are allowed.
    Map {
        fields: IndexMap<String, Schema>,
        required: Vec<String>,
    },
    /// Either null or the inner schema.
    Optional(Box<Schema>),
}

impl Schema {
    /// Convenience constructor for a mapping schema where every listed
    /// field is required.
    pub fn record(fields: Vec<(&str, Schema)>) -> Schema {
        let required = fields.iter().map(|(name, _)| name.to_string()).collect();
        Schema::Map {
            fields: fields
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
            required,
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            Schema::Any => "any value",
            Schema::Bool => "boolean",
            Schema::Int => "integer",
            Schema::Float => "float",
            Schema::Str => "string",
            Schema::Seq(_) => "sequence",
            Schema::Map { .. } => "mapping",
            Schema::Optional(_) => "optional value",
        }
    }
}

/// Validate `value` against `schema`, collecting every mismatch.
pub fn validate(value: &Value, schema: &Schema) -> Result<()> {
    let mut issues = Vec::new();
    check(value, schema, "", &mut issues);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { issues })
    }
}

fn check(value: &Value, schema: &Schema, path: &str, issues: &mut Vec<String>) {
    let at = if path.is_empty() { "<root>" } else { path };
    match schema {
        Schema::Any => {}
        Schema::Bool => {
            if !matches!(value, Value::Bool(_)) {
                issues.push(mismatch(at, schema, value));
            }
        }
        Schema::Int => {
            if !matches!(value, Value::Int(_)) {
                issues.push(mismatch(at, schema, value));
            }
        }
        Schema::Float => {
            if !matches!(value, Value::Float(_) | Value::Int(_)) {
                issues.push(mismatch(at, schema, value));
            }
        }
        Schema::Str => {
            if !matches!(value, Value::String(_)) {
                issues.push(mismatch(at, schema, value));
            }
        }
        Schema::Seq(item_schema) => match value {
            Value::Seq(items) => {
                for (index, item) in items.iter().enumerate() {
                    let child = join(path, &index.to_string());
                    check(item, item_schema, &child, issues);
                }
            }
            other => issues.push(mismatch(at, schema, other)),
        },
        Schema::Map { fields, required } => match value {
            Value::Map(entries) => {
                for name in required {
                    if !entries.contains_key(name) {
                        issues.push(format!("missing required field `{}`", join(path, name)));
                    }
                }
                for (name, field_schema) in fields {
                    if let Some(field_value) = entries.get(name) {
                        let child = join(path, name);
                        check(field_value, field_schema, &child, issues);
                    }
                }
            }
            other => issues.push(mismatch(at, schema, other)),
        },
        Schema::Optional(inner) => {
            if !matches!(value, Value::Null) {
                check(value, inner, path, issues);
            }
        }
    }
}

fn mismatch(path: &str, schema: &Schema, value: &Value) -> String {
    format!(
        "`{path}` must be {}, got {}",
        schema.expected(),
        value.type_name()
    )
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}::{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_valid_record() {
        let schema = Schema::record(vec![("name", Schema::Str), ("size", Schema::Int)]);
        let value = value_map(vec![
            ("name", Value::String("net".into())),
            ("size", Value::Int(8)),
        ]);
        assert!(validate(&value, &schema).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let schema = Schema::record(vec![("name", Schema::Str)]);
        let value = value_map(vec![]);
        let err = validate(&value, &schema).unwrap_err();
        assert!(err.to_string().contains("missing required field `name`"));
    }

    #[test]
    fn test_type_mismatch_reports_path() {
        let schema = Schema::record(vec![(
            "model",
            Schema::record(vec![("lr", Schema::Float)]),
        )]);
        let value = value_map(vec![(
            "model",
            value_map(vec![("lr", Value::String("fast".into()))]),
        )]);
        let err = validate(&value, &schema).unwrap_err();
        assert!(err.to_string().contains("`model::lr` must be float"));
    }

    #[test]
    fn test_float_accepts_int() {
        assert!(validate(&Value::Int(3), &Schema::Float).is_ok());
    }

    #[test]
    fn test_sequence_items_checked() {
        let schema = Schema::Seq(Box::new(Schema::Int));
        let value = Value::Seq(vec![Value::Int(1), Value::String("two".into())]);
        let err = validate(&value, &schema).unwrap_err();
        assert!(err.to_string().contains("`1` must be integer"));
    }

    #[test]
    fn test_optional_allows_null() {
        let schema = Schema::Optional(Box::new(Schema::Int));
        assert!(validate(&Value::Null, &schema).is_ok());
        assert!(validate(&Value::Int(1), &schema).is_ok());
        assert!(validate(&Value::String("x".into()), &schema).is_err());
    }

    #[test]
    fn test_multiple_issues_collected() {
        let schema = Schema::record(vec![("a", Schema::Int), ("b", Schema::Str)]);
        let value = value_map(vec![
            ("a", Value::String("no".into())),
            ("b", Value::Int(1)),
        ]);
        match validate(&value, &schema) {
            Err(Error::Validation { issues }) => assert_eq!(issues.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_fields_allowed() {
        let schema = Schema::record(vec![("a", Schema::Int)]);
        let value = value_map(vec![("a", Value::Int(1)), ("extra", Value::Bool(true))]);
        assert!(validate(&value, &schema).is_ok());
    }
}
