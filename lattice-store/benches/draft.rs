use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use lattice_store::{draft, effect, view, Draft, Value};
use serde_json::json;

fn wide_tree(width: usize) -> Value {
    let rows: Vec<serde_json::Value> = (0..width)
        .map(|i| json!({ "id": i, "label": format!("row {i}"), "tags": ["a", "b"] }))
        .collect();
    Value::from(json!({ "rows": rows, "meta": { "count": width } }))
}

fn root_of(base: &Value) -> Draft {
    draft(base.clone()).as_draft().expect("objects are draftable")
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for &width in &[16_usize, 256, 4_096] {
        let base = wide_tree(width);

        group.bench_function(format!("untouched(n={width})"), |b| {
            b.iter_batched(
                || root_of(&base),
                |root| {
                    black_box(root.snapshot());
                    root.dispose();
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_function(format!("single_write(n={width})"), |b| {
            b.iter_batched(
                || root_of(&base),
                |root| {
                    let rows = root.get("rows").and_then(|rows| rows.as_draft());
                    let row = rows.and_then(|rows| rows.get(width / 2)).and_then(|row| row.as_draft());
                    if let Some(row) = row {
                        let _ = row.set("label", "edited");
                    }
                    black_box(root.snapshot());
                    root.dispose();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_views(c: &mut Criterion) {
    let mut group = c.benchmark_group("views");

    group.bench_function("recompute_after_write", |b| {
        let root = root_of(&Value::from(json!({ "n": 0, "other": 0 })));
        let doubled = view(move || root.get("n").and_then(|n| n.as_f64()).unwrap_or(0.0) * 2.0);
        let mut n = 0.0;
        b.iter(|| {
            n += 1.0;
            let _ = root.set("n", n);
            black_box(doubled.value());
        });
        root.dispose();
    });

    group.bench_function("cached_read", |b| {
        let root = root_of(&Value::from(json!({ "n": 1 })));
        let doubled = view(move || root.get("n").and_then(|n| n.as_f64()).unwrap_or(0.0) * 2.0);
        b.iter(|| black_box(doubled.value()));
        root.dispose();
    });

    group.bench_function("effect_fanout(n=64)", |b| {
        let root = root_of(&Value::from(json!({ "n": 0 })));
        let effects: Vec<_> = (0..64)
            .map(|_| {
                effect(move || {
                    black_box(root.get("n"));
                })
            })
            .collect();
        let mut n = 0.0;
        b.iter(|| {
            n += 1.0;
            let _ = root.set("n", n);
        });
        for effect in effects {
            effect.stop();
        }
        root.dispose();
    });

    group.finish();
}

criterion_group!(benches, bench_snapshot, bench_views);
criterion_main!(benches);
