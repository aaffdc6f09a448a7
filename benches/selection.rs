//! Model selection benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Measures the inner level (one family's grid search) and the outer level
//! (sequential vs parallel fan-out across families) on the 100x7 training
//! shape the trainer targets.
//!
//! Run with: cargo bench --bench selection

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use elegir::estimator::{DecisionTreeRegressor, LinearRegression, RandomForestRegressor};
use elegir::metrics::RegressionMetrics;
use elegir::{
    DatasetSplit, FamilyRegistry, GridSearch, ModelFamily, ModelSelectionEngine, ParamGrid,
};

const TRAIN_ROWS: usize = 100;
const TEST_ROWS: usize = 20;
const FEATURES: usize = 7;

fn split() -> DatasetSplit {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut make = |rows: usize| {
        let x = Array2::from_shape_fn((rows, FEATURES), |_| rng.gen_range(-1.0..1.0));
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| r.iter().enumerate().map(|(j, v)| (j as f64 + 1.0) * v).sum::<f64>())
            .collect();
        (x, y)
    };
    let (x_train, y_train) = make(TRAIN_ROWS);
    let (x_test, y_test) = make(TEST_ROWS);
    DatasetSplit::new(x_train, y_train, x_test, y_test).unwrap()
}

fn registry() -> FamilyRegistry {
    FamilyRegistry::new()
        .with_family(ModelFamily::new(
            "Random Forest",
            || Box::new(RandomForestRegressor::default()),
            ParamGrid::new().axis("n_estimators", [10_i64, 20]),
        ))
        .and_then(|r| {
            r.with_family(ModelFamily::new(
                "Decision Tree",
                || Box::new(DecisionTreeRegressor::new()),
                ParamGrid::new()
                    .axis("criterion", ["squared_error", "friedman_mse", "absolute_error"]),
            ))
        })
        .and_then(|r| {
            r.with_family(ModelFamily::new(
                "Linear Regression",
                || Box::new(LinearRegression::new()),
                ParamGrid::new(),
            ))
        })
        .unwrap()
}

/// Benchmark metric computation on the held-out shape
fn bench_metrics(c: &mut Criterion) {
    let y: Array1<f64> = (0..TEST_ROWS).map(|i| i as f64).collect();
    let p = y.mapv(|v| v + 0.5);
    c.bench_function("regression_metrics_20", |b| {
        b.iter(|| RegressionMetrics::compute(black_box(y.view()), black_box(p.view())));
    });
}

/// Benchmark the inner level: one family's grid search and refit
fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_search");
    let split = split();
    let registry = registry();
    let search = GridSearch::default();

    for family in &registry {
        group.bench_with_input(BenchmarkId::new("family", family.name()), family, |b, family| {
            b.iter(|| search.search(black_box(family), &split));
        });
    }

    group.finish();
}

/// Benchmark the outer level: sequential vs parallel fan-out
fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_selection");
    group.sample_size(10);
    let split = split();
    let registry = registry();

    for parallel in [false, true] {
        let engine = ModelSelectionEngine::new(0.6).with_parallel(parallel);
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_with_input(BenchmarkId::new(label, registry.len()), &engine, |b, engine| {
            b.iter(|| engine.select(black_box(&registry), &split));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_metrics, bench_grid_search, bench_selection);
criterion_main!(benches);
