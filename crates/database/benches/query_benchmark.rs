//! Benchmarks comparing incremental and full view maintenance.
//!
//! Each sample applies one small diff to a database whose join view is
//! already populated; only the `apply` call is measured.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_core::fact;
use tessera_database::{Database, DatabaseConfig};
use tessera_query::{Binding, Column, PrimitiveRegistry};

fn database(incremental: bool, rows: usize) -> Database {
    let config = DatabaseConfig {
        incremental,
        ..DatabaseConfig::default()
    };
    let mut db = Database::with_config(config, Arc::new(PrimitiveRegistry::new()));
    db.add_table("orders", ["id", "customer", "amount"]);
    db.add_table("customers", ["id", "region"]);

    let view = db
        .query("by_region")
        .select("orders", Vec::<(String, Binding)>::new(), "o")
        .unwrap()
        .select("customers", [("id", Binding::field("o", "customer"))], "c")
        .unwrap()
        .project([("order", Binding::field("o", "id")), ("region", Binding::field("c", "region"))])
        .unwrap();
    db.as_view(view).unwrap();

    let customers = rows / 10 + 1;
    let mut diff = db.diff();
    for i in 0..rows {
        diff.add("orders", fact! { "id" => i, "customer" => i % customers, "amount" => i % 97 });
    }
    for i in 0..customers {
        diff.add("customers", fact! { "id" => i, "region" => if i % 2 == 0 { "north" } else { "south" } });
    }
    db.apply(&diff).unwrap();
    db
}

fn bench_join_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_view");
    group.sample_size(20);
    for rows in [1_000usize, 10_000] {
        for (label, incremental) in [("full", false), ("incremental", true)] {
            group.bench_with_input(BenchmarkId::new(label, rows), &rows, |b, &rows| {
                b.iter_batched(
                    || {
                        let db = database(incremental, rows);
                        let mut diff = db.diff();
                        diff.add("orders", fact! { "id" => rows, "customer" => 0, "amount" => 1 })
                            .remove_facts("orders", [fact! { "id" => 0usize, "customer" => 0usize, "amount" => 0usize }]);
                        (db, diff)
                    },
                    |(mut db, diff)| black_box(db.apply(&diff).unwrap().rounds),
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

fn bench_recursive_union(c: &mut Criterion) {
    let mut group = c.benchmark_group("ancestor");
    group.sample_size(10);
    for (label, incremental) in [("full", false), ("incremental", true)] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || {
                    let mut db = Database::with_config(
                        DatabaseConfig {
                            incremental,
                            ..DatabaseConfig::default()
                        },
                        Arc::new(PrimitiveRegistry::new()),
                    );
                    db.add_table("parent", ["from", "to"]);
                    let both = [("from", Column::field("from")), ("to", Column::field("to"))];
                    let union = db
                        .union("ancestor")
                        .union("parent", both.clone())
                        .unwrap()
                        .union("ancestor step", both)
                        .unwrap();
                    let step = db
                        .query("ancestor step")
                        .select("parent", Vec::<(String, Binding)>::new(), "p")
                        .unwrap()
                        .select("ancestor", [("from", Binding::field("p", "to"))], "a")
                        .unwrap()
                        .project([("from", Binding::field("p", "from")), ("to", Binding::field("a", "to"))])
                        .unwrap();
                    db.as_view(union).unwrap();
                    db.as_view(step).unwrap();

                    let mut diff = db.diff();
                    for i in 0..40usize {
                        diff.add("parent", fact! { "from" => i, "to" => i + 1 });
                    }
                    db.apply(&diff).unwrap();

                    let mut diff = db.diff();
                    diff.add("parent", fact! { "from" => 40usize, "to" => 41usize });
                    (db, diff)
                },
                |(mut db, diff)| black_box(db.apply(&diff).unwrap().rounds),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_join_view, bench_recursive_union);
criterion_main!(benches);
