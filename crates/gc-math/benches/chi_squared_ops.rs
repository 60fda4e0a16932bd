//! Criterion benchmarks for `gc-math`.
//!
//! Table regeneration evaluates one quantile per row and tail, so the
//! quantile search dominates estimator start-up.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gc_math::{chi_squared_cdf, chi_squared_quantile};

fn bench_chi_squared_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("chi_squared");

    for dof in [2.0_f64, 20.0, 200.0] {
        group.bench_with_input(BenchmarkId::new("cdf", dof), &dof, |b, &dof| {
            b.iter(|| black_box(chi_squared_cdf(black_box(dof), black_box(dof))));
        });

        group.bench_with_input(BenchmarkId::new("quantile_lower", dof), &dof, |b, &dof| {
            b.iter(|| black_box(chi_squared_quantile(black_box(0.025), black_box(dof))));
        });

        group.bench_with_input(BenchmarkId::new("quantile_upper", dof), &dof, |b, &dof| {
            b.iter(|| black_box(chi_squared_quantile(black_box(0.975), black_box(dof))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chi_squared_kernels);
criterion_main!(benches);
