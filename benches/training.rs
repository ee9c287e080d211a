use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use pl_positions::data::N_POSITIONS;
use pl_positions::training::{KernelType, RandomForest, SvmClassifier, SvmConfig};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_position_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let y: Vec<usize> = (0..n_rows).map(|i| i % N_POSITIONS).collect();
    let x = Array2::from_shape_fn((n_rows, n_features), |(i, j)| {
        let shift = if j % N_POSITIONS == y[i] { 2.0 } else { 0.0 };
        shift + rng.gen::<f64>()
    });
    (x, y)
}

fn bench_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_forest");
    group.sample_size(10);

    for n_trees in [25, 100, 500].iter() {
        let (x, y) = create_position_data(400, 24);

        group.bench_with_input(BenchmarkId::new("fit", n_trees), n_trees, |b, &n_trees| {
            b.iter(|| {
                let mut forest = RandomForest::new(n_trees).with_random_state(42);
                forest.fit(black_box(&x), black_box(&y), N_POSITIONS).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_svm(c: &mut Criterion) {
    let mut group = c.benchmark_group("svm_ovo");
    group.sample_size(10);

    let (x, y) = create_position_data(400, 14);
    for kernel in [KernelType::Linear, KernelType::Radial, KernelType::Polynomial] {
        group.bench_with_input(BenchmarkId::new("fit", kernel.name()), &kernel, |b, &kernel| {
            b.iter(|| {
                let mut svm = SvmClassifier::new(kernel, SvmConfig::default());
                svm.fit(black_box(&x), black_box(&y), N_POSITIONS).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forest, bench_svm);
criterion_main!(benches);
