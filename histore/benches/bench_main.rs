use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use histore::key::Key;
use histore::timestamp::Timestamp;

fn bench_timestamp_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("timestamp_append");
    for &versions in &[16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(versions), &versions, |b, &versions| {
            b.iter(|| {
                let mut t = Timestamp::new();
                for v in 0..versions as u64 {
                    t = t.append(black_box(v)).unwrap();
                }
                t
            });
        });
    }
    group.finish();
}

fn bench_timestamp_contains(c: &mut Criterion) {
    let mut t = Timestamp::new();
    // Every third version, so contains() can't short-circuit on a single
    // wide interval the way the coalescing case does.
    for v in (0..30_000u64).step_by(3) {
        t = t.append(v).unwrap();
    }

    c.bench_function("timestamp_contains_recent", |b| b.iter(|| t.contains(black_box(29_999))));
    c.bench_function("timestamp_contains_oldest", |b| b.iter(|| t.contains(black_box(0))));
}

fn bench_key_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_sort");
    for &n in &[100usize, 1_000, 10_000] {
        let keys: Vec<Key> = (0..n)
            .map(|i| match i % 3 {
                0 => Key::Number((n - i) as f64),
                1 => Key::String(format!("row-{}", n - i)),
                _ => Key::Null((n - i) as u64),
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &keys, |b, keys| {
            b.iter(|| {
                let mut keys = keys.clone();
                keys.sort();
                black_box(keys);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_timestamp_append, bench_timestamp_contains, bench_key_sort);
criterion_main!(benches);
