//! Criterion benchmarks for representative path shapes: member chains,
//! filters over arrays, and recursive descent.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jsonb_path_core::{path_query, EvalOptions, JsonbDoc, Mode, PathExpr, Variables};
use serde_json::json;

fn fixture() -> JsonbDoc {
    let rows: Vec<_> = (0..200)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("row-{i}"),
                "tags": ["a", "b", "c"],
                "meta": {"score": i % 17, "nested": {"deep": i}}
            })
        })
        .collect();
    JsonbDoc::from_value(&json!({"rows": rows})).expect("fixture encodes")
}

fn bench_queries(c: &mut Criterion) {
    let doc = fixture();
    let vars = Variables::new();
    let opts = EvalOptions::default();

    let member_chain = PathExpr::root()
        .key("rows")
        .index(100)
        .key("meta")
        .key("score")
        .compile(Mode::Lax)
        .unwrap();
    c.bench_function("member_chain", |b| {
        b.iter(|| path_query(black_box(&doc), &member_chain, &vars, &opts).unwrap())
    });

    let filter = PathExpr::root()
        .key("rows")
        .wild_element()
        .filter(PathExpr::gt(
            PathExpr::current().key("meta").key("score"),
            PathExpr::lit(12),
        ))
        .key("id")
        .compile(Mode::Lax)
        .unwrap();
    c.bench_function("filter_scan", |b| {
        b.iter(|| path_query(black_box(&doc), &filter, &vars, &opts).unwrap())
    });

    let recursive = PathExpr::root()
        .recursive()
        .key("deep")
        .compile(Mode::Lax)
        .unwrap();
    c.bench_function("recursive_descent", |b| {
        b.iter(|| path_query(black_box(&doc), &recursive, &vars, &opts).unwrap())
    });
}

criterion_group!(benches, bench_queries);
criterion_main!(benches);
