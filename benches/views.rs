use criterion::{criterion_group, criterion_main, black_box, Criterion, BenchmarkId, Throughput};
use array_history::*;
use edit_testdata::{generate_trace, EditTrace, OrderKey, TraceOp};

const TRACE_LENGTHS: &[usize] = &[1_000, 10_000];

fn edits_only(trace: &EditTrace) -> Vec<ArrayChange<u32>> {
    trace.ops.iter().filter_map(|op| match *op {
        TraceOp::Insert { value, pos } => Some(ArrayChange::Insert(value, pos)),
        TraceOp::Remove { pos } => Some(ArrayChange::Remove(pos)),
        _ => None,
    }).collect()
}

fn apply_benchmarks(c: &mut Criterion) {
    for &len in TRACE_LENGTHS {
        let mut group = c.benchmark_group("apply");
        let trace = generate_trace(len as u64, len);
        let edits = edits_only(&trace);
        group.throughput(Throughput::Elements(edits.len() as u64));

        group.bench_function(BenchmarkId::new("history", len), |b| {
            b.iter(|| {
                let arr = ArrayWithHistory::new(trace.start_content.clone());
                for c in &edits { arr.change(c.clone()); }
                black_box(arr.len());
            })
        });

        group.bench_function(BenchmarkId::new("latest_cell", len), |b| {
            b.iter(|| {
                let arr = ArrayWithHistory::new(trace.start_content.clone());
                let latest = arr.latest();
                for c in &edits { arr.change(c.clone()); }
                black_box(latest.with(|v| v.len()));
            })
        });

        group.bench_function(BenchmarkId::new("map", len), |b| {
            b.iter(|| {
                let arr = ArrayWithHistory::new(trace.start_content.clone());
                let view = arr.map(|x| x + 1);
                for c in &edits { arr.change(c.clone()); }
                black_box(view.changes().len());
            })
        });

        group.bench_function(BenchmarkId::new("filter", len), |b| {
            b.iter(|| {
                let arr = ArrayWithHistory::new(trace.start_content.clone());
                let pred = Cell::constant(Predicate::new(|x: &u32| x % 2 == 0));
                let view = arr.filter(&pred);
                for c in &edits { arr.change(c.clone()); }
                black_box(view.changes().len());
            })
        });

        group.bench_function(BenchmarkId::new("sort", len), |b| {
            b.iter(|| {
                let arr = ArrayWithHistory::new(trace.start_content.clone());
                let order = Cell::constant(Order::<u32>::natural());
                let view = arr.sort(&order);
                for c in &edits { arr.change(c.clone()); }
                black_box(view.changes().len());
            })
        });

        group.finish();
    }
}

fn switch_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("switch");
    let trace = generate_trace(5, 10_000);
    let content = trace.end_content.clone();

    group.bench_function("filter_changes", |b| {
        b.iter(|| {
            let script = filter_changes(&content, |x: &u32| x % 2 == 0, |x: &u32| x % 3 == 0);
            black_box(script.len());
        })
    });

    group.bench_function("sort_changes", |b| {
        b.iter(|| {
            let script = sort_changes(&content, |a: &u32, b: &u32| OrderKey::Modulo(7).cmp(a, b));
            black_box(script.len());
        })
    });

    // Replaying a whole trace with live predicate and order switches.
    group.bench_function("replay_trace", |b| {
        b.iter(|| {
            let arr = ArrayWithHistory::new(trace.start_content.clone());
            let pred = Cell::new(Predicate::all());
            let order = Cell::new(Order::<u32>::natural());
            let view = arr.filter(&pred).sort(&order);

            for op in &trace.ops {
                match *op {
                    TraceOp::Insert { value, pos } => arr.change(ArrayChange::Insert(value, pos)),
                    TraceOp::Remove { pos } => arr.change(ArrayChange::Remove(pos)),
                    TraceOp::SetFilter { modulus } => {
                        pred.write(Predicate::new(move |x: &u32| x % modulus == 0))
                    }
                    TraceOp::SetOrder { key } => {
                        order.write(Order::new(move |a: &u32, b: &u32| key.cmp(a, b)))
                    }
                }
            }
            black_box(view.changes().len());
        })
    });

    group.finish();
}

criterion_group!(benches,
    apply_benchmarks,
    switch_benchmarks,
);
criterion_main!(benches);
