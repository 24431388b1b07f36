//! Parser and reduction benchmarks.
//!
//! Run with: cargo bench --bench build_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sweep_db::extract::stats::Stat;
use sweep_db::help::HelpDict;

const SMALL: usize = 1_000;
const LARGE: usize = 100_000;

/// Benchmark the statistical reduction kernels across series sizes.
fn bench_reductions(c: &mut Criterion) {
    let mut group = c.benchmark_group("series_reductions");

    for size in [SMALL, LARGE] {
        let series: Vec<f64> = (0..size).map(|i| 3000.0 - 0.01 * i as f64).collect();
        for stat in [Stat::Mean, Stat::Stddev, Stat::Mode, Stat::Geomean] {
            group.bench_with_input(
                BenchmarkId::new(format!("{stat:?}"), size),
                &series,
                |b, data| {
                    b.iter(|| stat.reduce(black_box(data)));
                },
            );
        }
    }
    group.finish();
}

/// Benchmark help-dictionary parsing on a synthetic self-documentation dump.
fn bench_help_parse(c: &mut Criterion) {
    let mut text = String::new();
    for i in 0..500 {
        text.push_str(&format!(
            " **dOption{i}\n   Type | Double\n   Dimension(s) | length\n   Default value | 1.0\n"
        ));
    }
    text.push_str("Output Parameters\n");

    c.bench_function("help_dict_parse_500_options", |b| {
        b.iter(|| HelpDict::parse(black_box(&text)));
    });
}

criterion_group!(benches, bench_reductions, bench_help_parse);
criterion_main!(benches);
