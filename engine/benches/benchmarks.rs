//! Performance benchmarks for lens-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lens_engine::{
    apply, hoist_property, inside, map, remove_property, rename_property, translate,
    wrap_property, Engine, JsonType, Lens, PatchOp, Property,
};
use serde_json::{json, Value};

fn person_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "email": {"type": "string"},
            "age": {"type": "integer"},
            "address": {
                "type": "object",
                "properties": {"city": {"type": "string"}, "zip": {"type": "string"}},
                "required": ["city"]
            }
        },
        "required": ["name", "address"]
    })
}

fn person_lens() -> Lens {
    Lens::new(vec![
        rename_property("name", "fullName"),
        hoist_property("address", "city"),
        wrap_property("email"),
        remove_property(Property::new("age", JsonType::Integer)),
    ])
}

fn person(i: usize) -> Value {
    json!({
        "name": format!("User {}", i),
        "email": format!("user{}@example.com", i),
        "age": 30,
        "address": {"city": "Oslo", "zip": "0150"}
    })
}

fn bench_single_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_document");
    let lens = person_lens();
    let engine = Engine::default();

    group.bench_function("rename_apply", |b| {
        let rename = Lens::new(vec![rename_property("name", "fullName")]);
        b.iter(|| apply(black_box(&rename), black_box(person(1)), json!({})))
    });

    group.bench_function("pipeline_apply", |b| {
        b.iter(|| engine.apply(black_box(&lens), black_box(person(1)), person_schema()))
    });

    group.bench_function("pipeline_round_trip", |b| {
        b.iter(|| {
            let out = engine.apply(&lens, black_box(person(1)), person_schema())?;
            engine.revert_with(&lens, out.value, out.schema, &out.context)
        })
    });

    group.finish();
}

fn bench_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("map");
    let lens = Lens::new(vec![map(person_lens())]);

    for size in [10, 100, 1000] {
        let items = Value::Array((0..size).map(person).collect());
        group.bench_with_input(BenchmarkId::new("apply", size), &items, |b, items| {
            b.iter(|| apply(&lens, black_box(items.clone()), json!({})))
        });
    }

    group.finish();
}

fn bench_schema(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema");
    let engine = Engine::default();
    let lens = person_lens();

    group.bench_function("project", |b| {
        b.iter(|| engine.project(black_box(&lens), black_box(person_schema())))
    });

    // Deep nesting stresses path threading in the projector.
    let mut nested = rename_property("leaf", "renamed");
    let mut schema = json!({"type": "object", "properties": {"leaf": {"type": "string"}}});
    for _ in 0..20 {
        nested = inside("n", vec![nested]);
        schema = json!({"type": "object", "properties": {"n": schema}});
    }
    let nested = Lens::new(vec![nested]);
    group.bench_function("project_nested", |b| {
        b.iter(|| engine.project(black_box(&nested), black_box(schema.clone())))
    });

    group.finish();
}

fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch");
    let lens = person_lens();
    let patch = PatchOp::set("/address/city", "Bergen");

    group.bench_function("translate", |b| {
        b.iter(|| translate(black_box(&lens), black_box(&patch)))
    });

    group.finish();
}

criterion_group!(benches, bench_single_document, bench_map, bench_schema, bench_patch);
criterion_main!(benches);
