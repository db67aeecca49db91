/// Detection throughput over synthetic daily cost series.
///
/// Run with: cargo bench --bench detection_throughput

use chrono::{Days, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use finops_core::{AnomalyEngine, Dataset, DetectorConfig, RawCostRecord};

fn synthetic(n: usize) -> Dataset {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let categories = ["EC2", "RDS", "S3", "Lambda", "CloudFront"];
    Dataset::ingest((0..n).map(|i| {
        let amount = if i % 97 == 13 { 2_500.0 } else { 100.0 + ((i * 31) % 17) as f64 };
        RawCostRecord::new(&(start + Days::new((i / categories.len()) as u64)).to_string(), categories[i % categories.len()], &amount.to_string())
    }))
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect");
    for &n in &[180usize, 1_000, 5_000] {
        let ds = synthetic(n);
        group.throughput(Throughput::Elements(n as u64));
        for parallel in [false, true] {
            let engine = AnomalyEngine::new(DetectorConfig { parallel, ..Default::default() }).unwrap();
            let id = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(id, n), &ds, |b, ds| b.iter(|| black_box(engine.detect(ds))));
        }
    }
    group.finish();
}

criterion_group!(benches, bench_detect);
criterion_main!(benches);
