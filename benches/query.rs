//! Query benchmarks across index families.
//!
//! Run with: cargo bench --bench query

use canopy::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 32;
const N: usize = 10_000;

fn generate(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen::<f32>()).collect()
}

fn bench_knn_by_family(c: &mut Criterion) {
    let buf = generate(N, DIM, 42);
    let data = Dataset::new(N, DIM, &buf).unwrap();
    let query = generate(1, DIM, 43);

    let mut group = c.benchmark_group("knn_by_family");
    for name in ["linear", "kdtree", "kmeans", "vptree"] {
        let params = Params::new().with("seed", 7);
        let index = create_index(name, data, &params).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &index, |b, index| {
            b.iter(|| {
                index
                    .knn(black_box(&query), 10, &SearchParams::new(128))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_kd_forest_checks(c: &mut Criterion) {
    let buf = generate(N, DIM, 42);
    let data = Dataset::new(N, DIM, &buf).unwrap();
    let query = generate(1, DIM, 44);
    let params = Params::new().with("trees", 4).with("seed", 7);
    let index = create_index("kdtree", data, &params).unwrap();

    let mut group = c.benchmark_group("kd_forest_checks");
    for checks in [8, 64, 512, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(checks), &checks, |b, &checks| {
            b.iter(|| {
                index
                    .knn(black_box(&query), 10, &SearchParams::new(checks))
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_knn_by_family, bench_kd_forest_checks);
criterion_main!(benches);
