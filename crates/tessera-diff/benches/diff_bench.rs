//! Benchmarks for building and diffing large trees

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_diff::DiffTree;
use tessera_store::{InMemoryObjectDatabase, Node, ObjectDatabase, RevTree};
use tessera_tree::RevTreeBuilder;
use tessera_types::ObjectId;

fn record(i: usize, version: u32) -> Node {
    Node::record(
        format!("feature-{i:08}"),
        ObjectId::from_bytes(format!("{i}:{version}").as_bytes()),
    )
}

fn build(db: &InMemoryObjectDatabase, size: usize) -> RevTree {
    let mut builder = RevTreeBuilder::new(db);
    for i in 0..size {
        builder.insert(record(i, 0)).unwrap();
    }
    builder.build().unwrap()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_build");
    for size in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let db = InMemoryObjectDatabase::new();
                black_box(build(&db, size))
            });
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_diff");
    for size in [1_000, 10_000, 50_000] {
        let db = Arc::new(InMemoryObjectDatabase::new());
        let base = build(&db, size);

        let mut builder = RevTreeBuilder::from_tree(db.as_ref(), base.clone());
        builder.insert(record(size / 2, 1)).unwrap();
        let one_change = builder.build().unwrap();

        let mut builder = RevTreeBuilder::from_tree(db.as_ref(), base.clone());
        for i in (0..size).step_by(10) {
            builder.insert(record(i, 1)).unwrap();
        }
        let many_changes = builder.build().unwrap();

        let shared: Arc<dyn ObjectDatabase> = db;
        group.bench_with_input(BenchmarkId::new("one_change", size), &size, |b, _| {
            let op = DiffTree::new(Arc::clone(&shared))
                .old_tree(base.id())
                .new_tree(one_change.id());
            b.iter(|| black_box(op.call().unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("ten_percent", size), &size, |b, _| {
            let op = DiffTree::new(Arc::clone(&shared))
                .old_tree(base.id())
                .new_tree(many_changes.id());
            b.iter(|| black_box(op.count().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_diff);
criterion_main!(benches);
