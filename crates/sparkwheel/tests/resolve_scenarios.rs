//! End-to-end resolution scenarios: references, expressions, macros,
//! cycles, and component instantiation.

use indexmap::IndexMap;
use sparkwheel::{CallArgs, Config, Error, Loader, Registry, Value};

fn config_from(yaml: &str) -> Config {
    let (tree, _) = Loader::default().load_str(yaml, "test.yaml").unwrap();
    Config::from_node(tree)
}

#[derive(Debug, PartialEq)]
struct Linear {
    in_features: i64,
    out_features: i64,
}

fn registry_with_linear() -> Registry {
    let mut registry = Registry::new();
    registry.register("Linear", |call: CallArgs| {
        let in_features = call
            .kwarg("in_features")
            .and_then(Value::as_int)
            .ok_or("missing in_features")?;
        let out_features = call
            .kwarg("out_features")
            .and_then(Value::as_int)
            .ok_or("missing out_features")?;
        Ok(Value::object(Linear {
            in_features,
            out_features,
        }))
    });
    registry
}

#[test]
fn simple_reference() {
    let mut config = config_from("a: 10\nb: \"@a\"\n");
    assert_eq!(config.resolve("b").unwrap(), Value::Int(10));
}

#[test]
fn whole_scalar_reference_preserves_type() {
    let mut config = config_from("xs: [1, 2]\ncopy: \"@xs\"\n");
    assert_eq!(
        config.resolve("copy").unwrap(),
        Value::Seq(vec![Value::Int(1), Value::Int(2)])
    );
}

#[test]
fn embedded_reference_coerces_to_string() {
    let mut config = config_from("name: run7\npath: \"results/@name/log.txt\"\n");
    assert_eq!(
        config.resolve("path").unwrap(),
        Value::String("results/run7/log.txt".into())
    );
}

#[test]
fn expression_with_reference() {
    let mut config = config_from("x: 3\ny: \"$@x * 2 + 1\"\n");
    assert_eq!(config.resolve("y").unwrap(), Value::Int(7));
}

#[test]
fn expression_with_two_references() {
    let mut config = config_from("a: 2\nb: 5\nsum: \"$@a + @b\"\n");
    assert_eq!(config.resolve("sum").unwrap(), Value::Int(7));
}

#[test]
fn expression_indexing_into_reference() {
    let mut config = config_from("xs: [10, 20, 30]\nfirst: \"$@xs[0]\"\n");
    assert_eq!(config.resolve("first").unwrap(), Value::Int(10));
}

#[test]
fn expression_attribute_on_reference() {
    // The reference captures the longest identifier; `.lr` applies to the
    // substituted value.
    let mut config = config_from("opt:\n  lr: 0.5\ndouble: \"$@opt.lr * 2\"\n");
    assert_eq!(config.resolve("double").unwrap(), Value::Float(1.0));
}

#[test]
fn reference_into_sequence_element() {
    let mut config = config_from("layers: [8, 16]\nwidth: \"@layers::1\"\n");
    assert_eq!(config.resolve("width").unwrap(), Value::Int(16));
}

#[test]
fn relative_reference_matches_absolute() {
    // @::sibling inside a::b resolves like @a::sibling from outside.
    let mut relative = config_from("a:\n  sibling: 4\n  b: \"@::sibling\"\n");
    let mut absolute = config_from("a:\n  sibling: 4\n  b: \"@a::sibling\"\n");
    assert_eq!(
        relative.resolve("a::b").unwrap(),
        absolute.resolve("a::b").unwrap()
    );
}

#[test]
fn relative_reference_ascends_one_level() {
    // Each extra `::` climbs one parent: from model::inner::ref, `@::::lr`
    // lands on model::lr.
    let mut config = config_from("model:\n  lr: 0.1\n  inner:\n    ref: \"@::::lr\"\n");
    assert_eq!(config.resolve("model::inner::ref").unwrap(), Value::Float(0.1));
}

#[test]
fn relative_reference_ascends_to_root() {
    let mut config = config_from("lr: 0.1\nmodel:\n  inner:\n    ref: \"@::::::lr\"\n");
    assert_eq!(config.resolve("model::inner::ref").unwrap(), Value::Float(0.1));
}

#[test]
fn cycle_fails_with_participants() {
    let mut config = config_from("a: \"@b\"\nb: \"@a\"\n");
    match config.resolve("a") {
        Err(Error::Cycle { participants }) => {
            assert!(participants.contains(&"a".to_string()));
            assert!(participants.contains(&"b".to_string()));
        }
        other => panic!("expected cycle error, got {other:?}"),
    }
}

#[test]
fn self_cycle_through_parent() {
    let mut config = config_from("m:\n  child: \"@m\"\n");
    assert!(matches!(config.resolve("m"), Err(Error::Cycle { .. })));
}

#[test]
fn missing_reference_includes_suggestion() {
    let mut config = config_from("alpha: 1\nr: \"@alpah\"\n");
    match config.resolve("r") {
        Err(Error::KeyNotFound { suggestions, .. }) => {
            assert_eq!(suggestions[0], "alpha");
        }
        other => panic!("expected key-not-found, got {other:?}"),
    }
}

#[test]
fn instantiation_with_nested_reference() {
    let mut config = config_from(concat!(
        "n: 5\n",
        "lin:\n",
        "  _target_: Linear\n",
        "  in_features: \"@n\"\n",
        "  out_features: 2\n",
    ))
    .with_registry(registry_with_linear());

    let value = config.resolve("lin").unwrap();
    assert_eq!(
        value.downcast_ref::<Linear>(),
        Some(&Linear {
            in_features: 5,
            out_features: 2
        })
    );
}

#[test]
fn callable_mode_returns_partial() {
    let mut config = config_from(concat!(
        "n: 5\n",
        "lin:\n",
        "  _target_: Linear\n",
        "  _mode_: callable\n",
        "  in_features: \"@n\"\n",
        "  out_features: 2\n",
    ))
    .with_registry(registry_with_linear());

    let value = config.resolve("lin").unwrap();
    let callable = value.as_callable().expect("callable mode returns a callable");
    let built = callable.call(CallArgs::default()).unwrap();
    assert_eq!(
        built.downcast_ref::<Linear>(),
        Some(&Linear {
            in_features: 5,
            out_features: 2
        })
    );
}

#[test]
fn callable_mode_without_arguments_returns_bare_target() {
    let mut registry = Registry::new();
    registry.register("Zero", |_call| Ok(Value::Int(0)));
    let mut config = config_from("z:\n  _target_: Zero\n  _mode_: callable\n")
        .with_registry(registry);
    let value = config.resolve("z").unwrap();
    let callable = value.as_callable().unwrap();
    assert_eq!(callable.call(CallArgs::default()).unwrap(), Value::Int(0));
}

#[test]
fn disabled_site_resolves_to_null() {
    let mut config = config_from(concat!(
        "lin:\n",
        "  _target_: Linear\n",
        "  _disabled_: true\n",
        "  in_features: 1\n",
        "  out_features: 1\n",
    ))
    .with_registry(registry_with_linear());
    assert_eq!(config.resolve("lin").unwrap(), Value::Null);
}

#[test]
fn disabled_accepts_string_forms() {
    let mut config = config_from(concat!(
        "lin:\n",
        "  _target_: Linear\n",
        "  _disabled_: \"  TRUE  \"\n",
        "  in_features: 1\n",
        "  out_features: 1\n",
    ))
    .with_registry(registry_with_linear());
    assert_eq!(config.resolve("lin").unwrap(), Value::Null);
}

#[test]
fn disabled_expression() {
    let mut config = config_from(concat!(
        "flag: 3\n",
        "lin:\n",
        "  _target_: Linear\n",
        "  _disabled_: \"$@flag > 2\"\n",
        "  in_features: 1\n",
        "  out_features: 1\n",
    ))
    .with_registry(registry_with_linear());
    assert_eq!(config.resolve("lin").unwrap(), Value::Null);
}

#[test]
fn positional_args_resolved() {
    let mut registry = Registry::new();
    registry.register("Sum", |call: CallArgs| {
        let total: i64 = call
            .args
            .iter()
            .filter_map(Value::as_int)
            .sum();
        Ok(Value::Int(total))
    });
    let mut config = config_from(concat!(
        "n: 4\n",
        "s:\n",
        "  _target_: Sum\n",
        "  _args_: [1, 2, \"@n\"]\n",
    ))
    .with_registry(registry);
    assert_eq!(config.resolve("s").unwrap(), Value::Int(7));
}

#[test]
fn requires_resolves_extra_dependencies_first() {
    let mut config = config_from(concat!(
        "setup: 99\n",
        "lin:\n",
        "  _target_: Linear\n",
        "  _requires_: [\"@setup\"]\n",
        "  in_features: 1\n",
        "  out_features: 1\n",
    ))
    .with_registry(registry_with_linear());
    // The requires value is discarded; instantiation still works.
    let value = config.resolve("lin").unwrap();
    assert!(value.downcast_ref::<Linear>().is_some());
}

#[test]
fn requires_missing_dependency_fails() {
    let mut config = config_from(concat!(
        "lin:\n",
        "  _target_: Linear\n",
        "  _requires_: [\"@nope\"]\n",
        "  in_features: 1\n",
        "  out_features: 1\n",
    ))
    .with_registry(registry_with_linear());
    assert!(matches!(
        config.resolve("lin"),
        Err(Error::KeyNotFound { .. })
    ));
}

#[test]
fn unknown_target_fails_with_suggestion() {
    let mut config = config_from("l:\n  _target_: Liner\n  in_features: 1\n  out_features: 1\n")
        .with_registry(registry_with_linear());
    match config.resolve("l") {
        Err(Error::Instantiation { message, suggestion, .. }) => {
            assert!(message.contains("Liner"));
            assert!(suggestion.unwrap().contains("Linear"));
        }
        other => panic!("expected instantiation error, got {other:?}"),
    }
}

#[test]
fn constructor_failure_annotated_with_site_id() {
    let mut registry = Registry::new();
    registry.register("Boom", |_call| Err("exploded".to_string()));
    let mut config = config_from("b:\n  _target_: Boom\n").with_registry(registry);
    match config.resolve("b") {
        Err(Error::Instantiation { id, message, .. }) => {
            assert_eq!(id, "b");
            assert!(message.contains("exploded"));
        }
        other => panic!("expected instantiation error, got {other:?}"),
    }
}

#[test]
fn target_via_reference_to_callable_site() {
    let mut registry = Registry::new();
    registry.register("MakeAdder", |call: CallArgs| {
        let offset = call.kwarg("offset").and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Int(offset))
    });
    let mut config = config_from(concat!(
        "factory:\n",
        "  _target_: MakeAdder\n",
        "  _mode_: callable\n",
        "  offset: 3\n",
        "use:\n",
        "  _target_: \"@factory\"\n",
    ))
    .with_registry(registry);
    assert_eq!(config.resolve("use").unwrap(), Value::Int(3));
}

#[test]
fn nested_sites_resolve_inner_first() {
    let mut registry = registry_with_linear();
    registry.register("Wrap", |call: CallArgs| {
        let inner = call.kwarg("inner").ok_or("missing inner")?;
        let features = inner
            .downcast_ref::<Linear>()
            .map(|l| l.in_features)
            .ok_or("inner is not a Linear")?;
        Ok(Value::Int(features))
    });
    let mut config = config_from(concat!(
        "w:\n",
        "  _target_: Wrap\n",
        "  inner:\n",
        "    _target_: Linear\n",
        "    in_features: 11\n",
        "    out_features: 1\n",
    ))
    .with_registry(registry);
    assert_eq!(config.resolve("w").unwrap(), Value::Int(11));
}

#[test]
fn resolve_raw_keeps_directive_mapping() {
    let mut config = config_from("l:\n  _target_: Linear\n  in_features: 1\n  out_features: 1\n")
        .with_registry(registry_with_linear());
    let value = config.resolve_raw("l").unwrap();
    let map = value.as_map().expect("raw resolve keeps the mapping");
    assert_eq!(map["_target_"], Value::String("Linear".into()));
}

#[test]
fn macro_copies_raw_node_before_resolution() {
    // The copy stays a plain mapping; the original still instantiates.
    let mut config = config_from(concat!(
        "t:\n",
        "  _target_: Linear\n",
        "  in_features: 1\n",
        "  out_features: 1\n",
        "c: \"%t\"\n",
    ))
    .with_registry(registry_with_linear());

    let copy = config.resolve("c").unwrap();
    let map = copy.as_map().expect("macro copy resolves to the raw mapping");
    assert_eq!(map["_target_"], Value::String("Linear".into()));
    assert_eq!(map["in_features"], Value::Int(1));

    let original = config.resolve("t").unwrap();
    assert!(original.downcast_ref::<Linear>().is_some());
}

#[test]
fn macro_copy_keeps_markers_raw() {
    let mut config = config_from("n: 5\nt:\n  ref: \"@n\"\nc: \"%t\"\n");
    let copy = config.resolve("c").unwrap();
    let map = copy.as_map().unwrap();
    assert_eq!(map["ref"], Value::String("@n".into()));
}

#[test]
fn macro_from_external_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.yaml");
    std::fs::write(&path, "defaults:\n  depth: 3\n").unwrap();

    let yaml = format!("net: \"%{}::defaults\"\n", path.display());
    let mut config = config_from(&yaml);
    let value = config.resolve("net").unwrap();
    assert_eq!(value.as_map().unwrap()["depth"], Value::Int(3));
}

#[test]
fn resolve_whole_tree() {
    let mut config = config_from("a: 1\nb: \"@a\"\n");
    let value = config.resolve("").unwrap();
    let map = value.as_map().unwrap();
    assert_eq!(map["a"], Value::Int(1));
    assert_eq!(map["b"], Value::Int(1));
}

#[test]
fn sibling_order_preserved_in_resolved_mapping() {
    let mut config = config_from("z: 1\na: 2\nm: 3\n");
    let value = config.resolve("").unwrap();
    let keys: Vec<&String> = value.as_map().unwrap().keys().collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
}

#[test]
fn expression_error_carries_id() {
    let mut config = config_from("bad: \"$1 +\"\n");
    match config.resolve("bad") {
        Err(Error::Expression { id, .. }) => assert_eq!(id, "bad"),
        other => panic!("expected expression error, got {other:?}"),
    }
}

#[test]
fn namespace_callable_in_expression() {
    let mut namespace = IndexMap::new();
    namespace.insert(
        "scale".to_string(),
        Value::Callable(std::sync::Arc::new(sparkwheel::Callable::new(
            "scale",
            std::sync::Arc::new(|call: CallArgs| {
                let x = call.arg(0).and_then(Value::as_int).ok_or("missing arg")?;
                Ok(Value::Int(x * 100))
            }),
        ))),
    );
    let mut config =
        config_from("n: 7\nv: \"$scale(@n)\"\n").with_namespace(namespace);
    assert_eq!(config.resolve("v").unwrap(), Value::Int(700));
}

#[test]
fn legacy_separator_accepted() {
    let mut config = config_from("m:\n  x: 1\nr: \"@m#x\"\n");
    assert_eq!(config.resolve("r").unwrap(), Value::Int(1));
}

#[test]
fn node_and_value_round_trip_for_plain_data() {
    let mut config = config_from("m:\n  xs: [1, 2.5, true, null, text]\n");
    let value = config.resolve("m::xs").unwrap();
    assert_eq!(
        value,
        Value::Seq(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::Bool(true),
            Value::Null,
            Value::String("text".into()),
        ])
    );
    let raw = config.get("m::xs").unwrap();
    assert_eq!(Value::from_node(raw), value);
}
