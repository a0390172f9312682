//! Position update benchmarks: grouped transforms against one write per node.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use structlink_bench::{apply_shifts, engine_with, jittered_grid, random_shifts};
use structlink_core::{group_deltas, AdapterConfig};

/// Benchmark pushing a shifted grid with and without grouped transforms.
fn bench_shift_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("shift_push");
    group.sample_size(30);

    for side in [5usize, 10, 20].iter() {
        let count = side * side;
        group.throughput(Throughput::Elements(count as u64));

        for (label, batched) in [("grouped", true), ("per_object", false)] {
            group.bench_with_input(BenchmarkId::new(label, count), side, |b, &side| {
                b.iter_batched(
                    || {
                        let config = AdapterConfig::new().with_batch_position_updates(batched);
                        let mut nodes = jittered_grid(side, 5.0);
                        let adapter = engine_with(&mut nodes, config);
                        apply_shifts(&mut nodes, &random_shifts(nodes.len(), 2));
                        (adapter, nodes)
                    },
                    |(adapter, mut nodes)| {
                        let report = adapter.push(black_box(&mut nodes)).unwrap();
                        black_box(report);
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }
    group.finish();
}

/// Benchmark delta grouping alone.
fn bench_group_deltas(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_deltas");

    for count in [100usize, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let deltas = random_shifts(count, 4);
            b.iter(|| {
                let groups = group_deltas(black_box(&deltas), 1e-3);
                black_box(groups);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_shift_push, bench_group_deltas);
criterion_main!(benches);
