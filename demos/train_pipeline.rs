//! Training Pipeline Example
//!
//! Runs the full select → record → persist pipeline over every built-in
//! family on a synthetic 100x8 / 20x8 regression task, then prints the
//! per-family report and saves the experiment store next to the artifact.
//!
//! Run with: cargo run --release --example train_pipeline [config.json]

use anyhow::Context;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use elegir::experiment::ExperimentStore;
use elegir::{Error, FamilyRegistry, ModelTrainer, TrainerConfig};

/// Last column is the target: a mildly non-linear function of 7 features.
fn synthetic(rows: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let mut m = Array2::<f64>::zeros((rows, 8));
    for i in 0..rows {
        for j in 0..7 {
            m[[i, j]] = rng.gen_range(-2.0..2.0);
        }
        let r = m.row(i);
        m[[i, 7]] = 3.0 * r[0] - 2.0 * r[1] + r[2] * r[3] + 0.5 * r[4].powi(2)
            + rng.gen_range(-0.3..0.3);
    }
    m
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elegir=info".into()),
        )
        .init();

    println!("=== Elegir Model Selection ===\n");

    let config = match std::env::args().nth(1) {
        Some(path) => TrainerConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => TrainerConfig::builder().build()?,
    };
    println!("Threshold:     {}", config.threshold());
    println!("Artifact path: {}", config.artifact_path().display());
    println!("CV folds:      {}\n", config.search().cv_folds());

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let train = synthetic(100, &mut rng);
    let test = synthetic(20, &mut rng);

    let trainer = ModelTrainer::new(config)?;
    let registry = FamilyRegistry::default_regressors()?;
    let experiment = trainer.experiment();
    let mut store = ExperimentStore::new();

    println!("Searching {} families...", registry.len());
    let summary = match trainer.train(train.view(), test.view(), &registry, &mut store, &experiment)
    {
        Ok(summary) => summary,
        Err(Error::NoAcceptableModel(rejection)) => {
            println!("\nNo model accepted: {rejection}");
            for entry in rejection.report.iter() {
                println!("   {:<24} r2 = {:.4}", entry.name, entry.score);
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("training pipeline failed"),
    };

    println!("\nFamily report:");
    for entry in summary.report().iter() {
        let marker = if entry.name == summary.best_name() { "*" } else { " " };
        println!(" {marker} {:<24} r2 = {:.4}", entry.name, entry.score);
    }

    let m = summary.metrics();
    println!("\nWinner:      {}", summary.best_name());
    println!("Best params: {}", summary.best_params());
    println!("r2 = {:.4}  mae = {:.4}  mse = {:.4}  rmse = {:.4}", m.r2, m.mae, m.mse, m.rmse);
    println!("Run:         {} ({:?})", summary.run().run_id(), summary.run().status());
    println!(
        "Artifact:    {} ({} bytes)",
        summary.artifact_path().display(),
        summary.artifact_bytes()
    );

    let runs_path = summary.artifact_path().with_file_name("runs.json");
    store.save_json(&runs_path)?;
    println!("Runs saved:  {}", runs_path.display());

    Ok(())
}
