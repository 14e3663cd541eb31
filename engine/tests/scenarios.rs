//! End-to-end migration scenarios for lens-engine

use lens_engine::{
    add_property, apply, convert_value, extract, head_property, hoist_property, inside, map,
    plunge_property, remove_property, rename_property, revert, validate, wrap_property,
    DegradeReason, Engine, EngineConfig, Error, JsonType, Lens, LensGraph, OpKind, Property,
    ValueMapping,
};
use serde_json::{json, Value};

fn keys(value: &Value) -> Vec<&str> {
    value
        .as_object()
        .map(|obj| obj.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

fn open_schema() -> Value {
    json!({})
}

// ============================================================================
// Concrete Scenarios
// ============================================================================

#[test]
fn rename_round_trip() {
    let lens = Lens::new(vec![rename_property("name", "fullName")]);
    let schema = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    });

    let out = apply(&lens, json!({"name": "Ada"}), schema.clone()).unwrap();
    assert_eq!(out.value, json!({"fullName": "Ada"}));
    assert!(validate(&out.value, &out.schema).is_ok());

    let back = revert(&lens, out.value, out.schema).unwrap();
    assert_eq!(back.value, json!({"name": "Ada"}));
    assert_eq!(back.schema, schema);
}

#[test]
fn hoist_and_plunge_are_inverse() {
    let hoist = Lens::new(vec![hoist_property("address", "city")]);
    let plunge = Lens::new(vec![plunge_property("address", "city")]);
    let doc = json!({"address": {"city": "Oslo", "zip": "0150"}});

    let out = apply(&hoist, doc.clone(), open_schema()).unwrap();
    assert_eq!(out.value, json!({"city": "Oslo", "address": {"zip": "0150"}}));
    assert_eq!(keys(&out.value), vec!["city", "address"]);

    let back = apply(&plunge, out.value, open_schema()).unwrap();
    assert_eq!(back.value, doc);
    assert_eq!(keys(&back.value["address"]), vec!["zip", "city"]);
}

#[test]
fn moved_fields_return_to_original_positions() {
    let lens = Lens::new(vec![
        hoist_property("address", "city"),
        extract("user", "contact", ["street"]),
    ]);
    let doc = json!({
        "address": {"city": "Oslo", "zip": "0150"},
        "user": {"street": "Elm", "name": "A"}
    });
    let engine = Engine::default();

    let out = engine.apply(&lens, doc.clone(), open_schema()).unwrap();
    let back = engine
        .revert_with(&lens, out.value, out.schema, &out.context)
        .unwrap();
    assert_eq!(back.value, doc);
    assert_eq!(keys(&back.value), vec!["address", "user"]);
    assert_eq!(keys(&back.value["address"]), vec!["city", "zip"]);
    assert_eq!(keys(&back.value["user"]), vec!["street", "name"]);
}

#[test]
fn wrap_then_head() {
    let wrap = Lens::new(vec![wrap_property("tags")]);
    let head = Lens::new(vec![head_property("tags")]);

    let out = apply(&wrap, json!({"tags": "urgent"}), open_schema()).unwrap();
    assert_eq!(out.value, json!({"tags": ["urgent"]}));

    let back = apply(&head, out.value, open_schema()).unwrap();
    assert_eq!(back.value, json!({"tags": "urgent"}));
    assert!(!back.is_degraded());
}

#[test]
fn remove_uses_stored_state_or_default() {
    let lens = Lens::new(vec![remove_property(
        Property::new("temp", JsonType::Integer).with_default(0),
    )]);
    let engine = Engine::default();

    let out = engine.apply(&lens, json!({"temp": 5, "x": 1}), open_schema()).unwrap();
    assert_eq!(out.value, json!({"x": 1}));

    let back = engine
        .revert_with(&lens, out.value.clone(), open_schema(), &out.context)
        .unwrap();
    assert_eq!(back.value, json!({"temp": 5, "x": 1}));
    assert_eq!(keys(&back.value), vec!["temp", "x"]);
    assert!(!back.is_degraded());

    let fresh = engine.revert(&lens, out.value, open_schema()).unwrap();
    assert_eq!(fresh.value, json!({"temp": 0, "x": 1}));
    assert_eq!(fresh.degradations.len(), 1);
    assert_eq!(fresh.degradations[0].op, OpKind::Remove);
    assert_eq!(
        fresh.degradations[0].reason,
        DegradeReason::MissingStoredDefault { default: json!(0) }
    );
}

#[test]
fn extract_and_reassemble() {
    let lens = Lens::new(vec![extract("user", "address", ["street", "city"])]);
    let doc = json!({"user": {"name": "A", "street": "Elm", "city": "Oslo"}});
    let schema = json!({
        "type": "object",
        "properties": {
            "user": {
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "street": {"type": "string"},
                    "city": {"type": "string"}
                },
                "required": ["name"]
            }
        },
        "required": ["user"]
    });

    let out = apply(&lens, doc.clone(), schema.clone()).unwrap();
    assert_eq!(
        out.value,
        json!({
            "user": {"name": "A", "address": "address#1"},
            "address#1": {"street": "Elm", "city": "Oslo"}
        })
    );
    assert!(validate(&out.value, &out.schema).is_ok());

    let back = revert(&lens, out.value, out.schema).unwrap();
    assert_eq!(back.value, doc);
    assert_eq!(back.schema, schema);
}

// ============================================================================
// Nested Lenses
// ============================================================================

#[test]
fn nested_map_inside_object() {
    let lens = Lens::new(vec![inside("order", vec![map_items_lens()])]);
    let doc = json!({
        "order": {
            "items": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 2}]
        }
    });

    let out = apply(&lens, doc.clone(), open_schema()).unwrap();
    assert_eq!(
        out.value,
        json!({"order": {"items": [
            {"sku": "a", "quantity": 1},
            {"sku": "b", "quantity": 2}
        ]}})
    );
    let back = revert(&lens, out.value, out.schema).unwrap();
    assert_eq!(back.value, doc);
}

fn map_items_lens() -> lens_engine::LensOp {
    inside("items", vec![map(vec![rename_property("qty", "quantity")])])
}

#[test]
fn nested_failure_reports_absolute_path() {
    let lens = Lens::new(vec![inside("rows", vec![map(vec![rename_property("a", "b")])])]);
    let doc = json!({"rows": [{"a": 1}, {"a": 2, "b": 3}]});

    let err = apply(&lens, doc, open_schema()).unwrap_err();
    assert_eq!(err.op(), Some(OpKind::Rename));
    assert_eq!(err.path(), Some(&vec!["rows".to_string(), "1".to_string()]));
    assert_eq!(err.to_string(), "rename: key 'b' already present at /rows/1");
}

// ============================================================================
// Conversions
// ============================================================================

#[test]
fn convert_status_to_flag() {
    let lens = Lens::new(vec![convert_value(
        "status",
        ValueMapping::new([("open", false), ("closed", true)]),
        Some(JsonType::String),
        Some(JsonType::Boolean),
    )]);
    let schema = json!({
        "type": "object",
        "properties": {"status": {"type": "string", "enum": ["open", "closed"]}}
    });

    let out = apply(&lens, json!({"status": "closed"}), schema.clone()).unwrap();
    assert_eq!(out.value, json!({"status": true}));
    assert!(validate(&out.value, &out.schema).is_ok());

    let back = revert(&lens, out.value, out.schema).unwrap();
    assert_eq!(back.value, json!({"status": "closed"}));
    assert_eq!(back.schema, schema);

    let err = apply(&lens, json!({"status": "pending"}), schema).unwrap_err();
    assert!(matches!(err, Error::UnmappedValue { .. }));
}

#[test]
fn identity_fallback_is_degraded() {
    let lens = Lens::new(vec![convert_value(
        "level",
        ValueMapping::new([("lo", 1)]).with_identity_fallback(),
        None,
        None,
    )]);
    let out = apply(&lens, json!({"level": "mid"}), open_schema()).unwrap();
    assert_eq!(out.value, json!({"level": "mid"}));
    assert!(matches!(
        out.degradations[0].reason,
        DegradeReason::IdentityFallback { .. }
    ));
}

// ============================================================================
// Failures and Configuration
// ============================================================================

#[test]
fn first_failure_aborts_pipeline() {
    let lens = Lens::new(vec![
        rename_property("a", "b"),
        hoist_property("missing", "x"),
        add_property(Property::untyped("never")),
    ]);
    let err = apply(&lens, json!({"a": 1}), open_schema()).unwrap_err();
    assert_eq!(
        err,
        Error::MissingField {
            op: OpKind::Hoist,
            path: vec![],
            field: "missing".into(),
        }
    );
}

#[test]
fn head_arity_policy() {
    let lens = Lens::new(vec![head_property("tags")]);
    let doc = json!({"tags": ["a", "b"]});

    let lenient = apply(&lens, doc.clone(), open_schema()).unwrap();
    assert_eq!(lenient.value, json!({"tags": "a"}));
    assert_eq!(
        lenient.degradations[0].reason,
        DegradeReason::ArityCoerced { length: 2 }
    );

    let strict = Engine::new(EngineConfig::default().strict());
    let err = strict.apply(&lens, doc, open_schema()).unwrap_err();
    assert!(matches!(err, Error::InvalidShape { op: OpKind::Head, .. }));

    let err = apply(&lens, json!({"tags": []}), open_schema()).unwrap_err();
    assert!(matches!(err, Error::InvalidShape { .. }));
}

#[test]
fn output_validation_rejects_bad_documents() {
    let lens = Lens::new(vec![rename_property("a", "b")]);
    let schema = json!({
        "type": "object",
        "properties": {"a": {"type": "integer"}},
        "required": ["a"]
    });
    let engine = Engine::new(EngineConfig::default().validated());

    let err = engine.apply(&lens, json!({"a": "text"}), schema.clone()).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let out = engine.apply(&lens, json!({"a": 1}), schema).unwrap();
    assert_eq!(out.value, json!({"b": 1}));
}

// ============================================================================
// Version Graph
// ============================================================================

#[test]
fn graph_migrates_between_versions() {
    let mut graph = LensGraph::new(
        "1",
        json!({
            "type": "object",
            "properties": {"title": {"type": "string"}, "tag": {"type": "string"}},
            "required": ["title"]
        }),
    );
    graph
        .register("1", "2", Lens::new(vec![rename_property("title", "name")]))
        .unwrap();
    graph
        .register("2", "3", Lens::new(vec![wrap_property("tag")]))
        .unwrap();

    let out = graph
        .migrate("1", "3", json!({"title": "x", "tag": "y"}))
        .unwrap();
    assert_eq!(out.value, json!({"name": "x", "tag": ["y"]}));
    assert!(validate(&out.value, graph.schema("3").unwrap()).is_ok());

    let back = graph.migrate("3", "1", out.value).unwrap();
    assert_eq!(back.value, json!({"title": "x", "tag": "y"}));
}
