use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

use super::individual::Individual;
use super::pareto::ParetoFront;
use super::progress::SearchObserver;
use crate::error::Result;

pub type ParetoCallback = Box<dyn FnMut(&Individual)>;

/// One overall-front member as written by [`Archive::save_front_json`].
#[derive(Debug, Clone, Serialize)]
pub struct FrontRecord {
    pub pipeline: String,
    pub values: Vec<f64>,
    pub wvalues: Vec<f64>,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Keeps every evaluated individual, the current and overall Pareto fronts,
/// and an append-only audit log of evaluations.
pub struct Archive {
    run_id: String,
    log_path: PathBuf,
    log: LineWriter<File>,
    evaluations: Vec<Individual>,
    current_front: ParetoFront,
    overall_front: ParetoFront,
    since_last_update: usize,
    restart_after: Option<usize>,
    callbacks: Vec<ParetoCallback>,
}

impl Archive {
    /// Create an archive logging to `{output_dir}/{run_id}_evaluations.csv`.
    pub fn new(run_id: &str, output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;
        let log_path = output_dir.join(format!("{}_evaluations.csv", run_id));
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        debug!("Writing evaluations of run {} to {}", run_id, log_path.display());

        Ok(Self {
            run_id: run_id.to_string(),
            log_path,
            log: LineWriter::new(file),
            evaluations: Vec::new(),
            current_front: ParetoFront::new(),
            overall_front: ParetoFront::new(),
            since_last_update: 0,
            restart_after: None,
            callbacks: Vec::new(),
        })
    }

    /// Request a restart once `n` evaluations passed without a change of the current front.
    pub fn with_restart_after(mut self, n: usize) -> Self {
        self.restart_after = Some(n);
        self
    }

    pub fn register_pareto_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&Individual) + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Record an evaluated individual. Returns whether the overall front improved.
    pub fn update(&mut self, individual: &Individual) -> Result<bool> {
        if let Some(fitness) = &individual.fitness {
            let wvalues: Vec<String> = fitness.wvalues.iter().map(|w| w.to_string()).collect();
            writeln!(
                self.log,
                "{};{};{}",
                fitness.duration.as_secs_f64(),
                wvalues.join(";"),
                individual.canonical_string()
            )?;
        }
        self.evaluations.push(individual.clone());

        if self.current_front.update(individual) {
            self.since_last_update = 0;
        } else {
            self.since_last_update += 1;
        }

        let improved = self.overall_front.update(individual);
        if improved {
            debug!("Overall front improved by {}", individual);
            for callback in self.callbacks.iter_mut() {
                callback(individual);
            }
        }
        Ok(improved)
    }

    pub fn reset_current_front(&mut self) {
        self.current_front.clear();
        self.since_last_update = 0;
    }

    /// Up to `n` evaluated individuals, best primary objective first, ties
    /// by canonical string.
    pub fn best_n(&self, n: usize) -> Vec<&Individual> {
        let mut ranked: Vec<&Individual> = self.evaluations.iter().collect();
        ranked.sort_by(|a, b| {
            b.primary_wvalue()
                .total_cmp(&a.primary_wvalue())
                .then_with(|| a.canonical_string().cmp(b.canonical_string()))
        });
        ranked.truncate(n);
        ranked
    }

    pub fn save_front_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let records: Vec<FrontRecord> = self
            .overall_front
            .members()
            .iter()
            .filter_map(|ind| {
                let fitness = ind.fitness.as_ref()?;
                Some(FrontRecord {
                    pipeline: ind.canonical_string().to_string(),
                    values: fitness.values.clone(),
                    wvalues: fitness.wvalues.clone(),
                    start_time: fitness.start_time,
                    duration_seconds: fitness.duration.as_secs_f64(),
                })
            })
            .collect();
        fs::write(path.as_ref(), serde_json::to_string_pretty(&records)?)?;
        info!(
            "Saved {} front members of run {} to {}",
            records.len(),
            self.run_id,
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn evaluations(&self) -> &[Individual] {
        &self.evaluations
    }

    pub fn current_front(&self) -> &ParetoFront {
        &self.current_front
    }

    pub fn overall_front(&self) -> &ParetoFront {
        &self.overall_front
    }

    /// Evaluations since the current front last changed.
    pub fn since_last_update(&self) -> usize {
        self.since_last_update
    }
}

impl SearchObserver for Archive {
    fn on_evaluation(&mut self, individual: &Individual) -> anyhow::Result<()> {
        self.update(individual)?;
        Ok(())
    }

    fn should_restart(&mut self, _evaluation_index: usize) -> bool {
        self.restart_after
            .is_some_and(|n| self.since_last_update >= n)
    }

    fn on_restart(&mut self, _evaluation_index: usize) -> anyhow::Result<()> {
        self.reset_current_front();
        Ok(())
    }
}
