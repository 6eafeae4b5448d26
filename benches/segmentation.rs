//! Segmentation benchmarks.
//!
//! Run with: `cargo bench --bench segmentation`

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trail_engine::{
    geodesy::project, Coordinate, Sample, SegmentationEngine, Timeline, TrailEngine,
};

fn timeline(n: i64) -> Timeline {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let mut position = Coordinate::new(51.5074, -0.1278);
    let mut secs = 0;
    (0..n)
        .map(|i| {
            secs += if i % 50 == 49 { 900 } else { 40 };
            let step = if i % 70 == 69 { 3_000.0 } else { 60.0 };
            position = project(position, step, (i * 7 % 360) as f64);
            (t0 + Duration::seconds(secs), position)
        })
        .collect()
}

fn bench_recompute(c: &mut Criterion) {
    let engine = SegmentationEngine::default();
    let mut group = c.benchmark_group("recompute");

    for size in [100, 1_000, 10_000] {
        let timeline = timeline(size);
        let now = timeline.latest().map(|p| p.timestamp).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &timeline, |b, tl| {
            b.iter(|| engine.recompute(black_box(tl), now))
        });
    }
    group.finish();
}

fn bench_tail_recompute(c: &mut Criterion) {
    let engine = SegmentationEngine::default();
    let timeline = timeline(10_000);
    let now = timeline.latest().map(|p| p.timestamp).unwrap();
    let previous = engine.recompute(&timeline, now);

    c.bench_function("recompute_from_tail_10000", |b| {
        b.iter(|| engine.recompute_from(black_box(&previous), &timeline, now, now))
    });
}

fn bench_observe(c: &mut Criterion) {
    let samples: Vec<Sample> = timeline(2_000)
        .iter()
        .map(|p| Sample::new(p.timestamp, p.coordinate))
        .collect();

    c.bench_function("observe_2000", |b| {
        b.iter(|| {
            let engine = TrailEngine::default();
            for sample in &samples {
                engine.observe("bench", *sample, sample.timestamp);
            }
            black_box(engine.stats())
        })
    });
}

criterion_group!(benches, bench_recompute, bench_tail_recompute, bench_observe);
criterion_main!(benches);
