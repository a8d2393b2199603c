use criterion::{Criterion, black_box, criterion_group, criterion_main};
use execscript::input::reconstruct;
use execscript::output::{declare_variable, linearize_into};
use execscript::{
    KeyPolicy, MemoryStore, NonPrintableCodec, ScriptAssembler, ScriptSource, Value, ValueKind,
    to_tag_group,
};
use indexmap::IndexMap;

fn sample() -> Value {
    let rows: Vec<serde_json::Value> = (0..50)
        .map(|i| serde_json::json!({"id": i, "name": format!("row µ{i}"), "tags": [1.5, true, "x/y"]}))
        .collect();
    Value::try_from(serde_json::json!({"rows": rows, "meta": {"depth": {"a": {"b": 1}}}})).unwrap()
}

fn bench_declare(c: &mut Criterion) {
    let value = sample();
    c.bench_function("declare_nested", |b| {
        b.iter(|| declare_variable("data", black_box(&value), true).unwrap())
    });
}

fn bench_linearize_and_reconstruct(c: &mut Criterion) {
    let value = sample();
    let group = to_tag_group(&value, &KeyPolicy::Reject).unwrap();
    let codec = NonPrintableCodec::default();

    c.bench_function("linearize", |b| {
        b.iter(|| {
            let mut store = MemoryStore::new();
            linearize_into(&mut store, "ns", "data", black_box(&group), &codec)
        })
    });

    let mut store = MemoryStore::new();
    linearize_into(&mut store, "ns", "data", &group, &codec);
    c.bench_function("reconstruct", |b| {
        b.iter(|| reconstruct(black_box(&store), "ns", "data", ValueKind::Mapping, &codec).unwrap())
    });
}

fn bench_assemble(c: &mut Criterion) {
    let setvars = IndexMap::from([("data".to_string(), sample())]);
    let sources = [ScriptSource::labeled("main", "number n = 1;\nn += 1;")];
    let assembler = ScriptAssembler::new("ns");
    c.bench_function("assemble", |b| {
        b.iter(|| {
            assembler
                .assemble(&sources, black_box(&setvars), &IndexMap::new(), &[])
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_declare,
    bench_linearize_and_reconstruct,
    bench_assemble
);
criterion_main!(benches);
