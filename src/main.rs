use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use pipevo::engines::evaluation::{Evaluator, ThreadDispatcher, WorkerLog};
use pipevo::engines::generation::{Archive, Compiler, EvolutionEngine, GpToolbox, Pipeline, Toolbox};
use pipevo::functions::{negative_mse, numeric_catalog, PrimitiveSet};
use pipevo::load_config;

/// Samples of `y = 2x^2 + 1` on `[-2, 2]`.
fn samples() -> (Vec<f64>, Vec<f64>) {
    let xs: Vec<f64> = (0..=40).map(|i| -2.0 + i as f64 * 0.1).collect();
    let ys = xs.iter().map(|x| 2.0 * x * x + 1.0).collect();
    (xs, ys)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;

    let pset = Arc::new(PrimitiveSet::from_catalog(&numeric_catalog())?);
    info!("Built primitive set with {} primitives", pset.primitive_count());

    let mut toolbox = GpToolbox::new(Compiler::new(pset), config.evolution.clone());
    let start_population = toolbox.population(config.search.population_size)?;

    let (xs, ys) = samples();
    let evaluator: Arc<dyn Evaluator> =
        Arc::new(move |pipeline: &Pipeline, log: &mut WorkerLog| -> anyhow::Result<f64> {
            let score = negative_mse(pipeline, &xs, &ys)?;
            log.debug(format!("{:?} scored {}", pipeline.step_names(), score));
            Ok(score)
        });
    let dispatcher = ThreadDispatcher::new(config.search.n_jobs, evaluator);

    let mut archive = Archive::new(&config.search.run_id, &config.search.output_dir)?;
    if let Some(n) = config.search.restart_after {
        archive = archive.with_restart_after(n);
    }
    archive.register_pareto_callback(|individual| {
        info!("New Pareto-optimal pipeline: {}", individual);
    });

    let mut engine = EvolutionEngine::new(config.search.clone(), toolbox, dispatcher);
    let outcome = engine.run(start_population, &mut archive)?;
    info!(
        "Search ended ({}) after {} evaluations, final population {}",
        outcome.termination,
        outcome.n_evaluations,
        outcome.population.len()
    );

    let front_path = Path::new(&config.search.output_dir)
        .join(format!("{}_front.json", config.search.run_id));
    archive.save_front_json(&front_path)?;

    println!("Best pipelines:");
    for individual in archive.best_n(5) {
        println!("{:>14.6}  {}", individual.primary_wvalue(), individual);
    }
    Ok(())
}
