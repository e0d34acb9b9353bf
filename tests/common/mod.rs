#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use pipevo::config::EvolutionConfig;
use pipevo::engines::evaluation::{
    run_evaluation, Dispatcher, EvaluationResult, Evaluator, TaskId, WorkerLog,
};
use pipevo::engines::generation::{
    Compiler, Genome, GpToolbox, Individual, Pipeline, SearchObserver, Toolbox, Uncompilable,
};
use pipevo::error::{PipevoError, Result};
use pipevo::functions::{numeric_catalog, PrimitiveSet};
use pipevo::SearchConfig;

pub fn numeric_pset() -> Arc<PrimitiveSet> {
    Arc::new(PrimitiveSet::from_catalog(&numeric_catalog()).expect("numeric catalog is valid"))
}

pub fn seeded_toolbox(seed: u64) -> GpToolbox {
    let config = EvolutionConfig {
        seed: Some(seed),
        ..Default::default()
    };
    GpToolbox::new(Compiler::new(numeric_pset()), config)
}

/// `n` compilable genomes with distinct canonical strings.
pub fn distinct_population(toolbox: &mut GpToolbox, n: usize) -> Vec<Genome> {
    let mut seen = HashSet::new();
    let mut population = Vec::with_capacity(n);
    for _ in 0..1000 {
        if population.len() == n {
            break;
        }
        let genome = toolbox.population(1).expect("generation succeeds").remove(0);
        if seen.insert(genome.canonical_string()) {
            population.push(genome);
        }
    }
    assert_eq!(population.len(), n, "not enough distinct genomes");
    population
}

pub fn search_config(max_n_evaluations: usize, max_time_seconds: f64) -> SearchConfig {
    SearchConfig {
        max_n_evaluations,
        max_time_seconds,
        n_jobs: 2,
        ..Default::default()
    }
}

/// Score by pipeline length: shorter pipelines score higher.
pub fn length_evaluator() -> Arc<dyn Evaluator> {
    Arc::new(|pipeline: &Pipeline, _: &mut WorkerLog| -> anyhow::Result<f64> {
        Ok(-(pipeline.len() as f64))
    })
}

pub fn constant_evaluator(score: f64) -> Arc<dyn Evaluator> {
    Arc::new(move |_: &Pipeline, _: &mut WorkerLog| -> anyhow::Result<f64> { Ok(score) })
}

pub fn sleeping_evaluator(sleep: Duration) -> Arc<dyn Evaluator> {
    Arc::new(move |_: &Pipeline, _: &mut WorkerLog| -> anyhow::Result<f64> {
        std::thread::sleep(sleep);
        Ok(0.0)
    })
}

/// Evaluates synchronously when a result is requested: oldest task first,
/// or newest first when built with [`InlineDispatcher::newest_first`].
pub struct InlineDispatcher {
    evaluator: Arc<dyn Evaluator>,
    queue: VecDeque<(TaskId, Pipeline)>,
    next_id: TaskId,
    running: bool,
    newest_first: bool,
    pub restarts: usize,
}

impl InlineDispatcher {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            queue: VecDeque::new(),
            next_id: 0,
            running: false,
            newest_first: false,
            restarts: 0,
        }
    }

    pub fn newest_first(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            newest_first: true,
            ..Self::new(evaluator)
        }
    }
}

impl Dispatcher for InlineDispatcher {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn queue_evaluation(&mut self, pipeline: Pipeline) -> Result<TaskId> {
        if !self.running {
            return Err(PipevoError::Dispatcher("not running".to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push_back((id, pipeline));
        Ok(id)
    }

    fn get_next_result(&mut self, _timeout: Duration) -> Result<Option<EvaluationResult>> {
        let task = if self.newest_first {
            self.queue.pop_back()
        } else {
            self.queue.pop_front()
        };
        Ok(task.map(|(id, pipeline)| {
            let (output, log) = run_evaluation(self.evaluator.as_ref(), &pipeline);
            EvaluationResult { id, output, log }
        }))
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn restart(&mut self) -> Result<()> {
        self.restarts += 1;
        self.queue.clear();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        self.queue.clear();
        Ok(())
    }
}

/// Wraps a toolbox and records the sizes requested from `population`.
pub struct RecordingToolbox<T: Toolbox> {
    pub inner: T,
    pub population_requests: Vec<usize>,
}

impl<T: Toolbox> RecordingToolbox<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            population_requests: Vec::new(),
        }
    }
}

impl<T: Toolbox> Toolbox for RecordingToolbox<T> {
    fn compile(&self, genome: &Genome) -> std::result::Result<Pipeline, Uncompilable> {
        self.inner.compile(genome)
    }

    fn eliminate(&self, population: &[Individual], k: usize) -> Vec<usize> {
        self.inner.eliminate(population, k)
    }

    fn create(&mut self, population: &[Individual], k: usize) -> Result<Vec<Genome>> {
        self.inner.create(population, k)
    }

    fn population(&mut self, n: usize) -> Result<Vec<Genome>> {
        self.population_requests.push(n);
        self.inner.population(n)
    }
}

/// Observer recording every hook call, with optional scripted behaviour.
#[derive(Default)]
pub struct RecordingObserver {
    pub evaluated: Vec<String>,
    pub restart_indices: Vec<usize>,
    pub eliminated: Vec<String>,
    pub restart_at: Option<usize>,
    pub fail_on_evaluation: bool,
    pub cancel_after: Option<usize>,
    /// Sleep inside `on_evaluation` once this many individuals were seen.
    pub stall_after: Option<(usize, Duration)>,
    pub restart_checks: usize,
}

impl SearchObserver for RecordingObserver {
    fn on_evaluation(&mut self, individual: &Individual) -> anyhow::Result<()> {
        assert!(individual.fitness.is_some(), "observer saw an unevaluated individual");
        self.evaluated.push(individual.canonical_string().to_string());
        if let Some((n, pause)) = self.stall_after {
            if self.evaluated.len() == n {
                std::thread::sleep(pause);
            }
        }
        if self.cancel_after == Some(self.evaluated.len()) {
            return Err(PipevoError::Cancelled.into());
        }
        if self.fail_on_evaluation {
            anyhow::bail!("evaluation callback failure #{}", self.evaluated.len());
        }
        Ok(())
    }

    fn should_restart(&mut self, evaluation_index: usize) -> bool {
        self.restart_checks += 1;
        // Only the first pass restarts.
        self.restart_indices.is_empty() && self.restart_at == Some(evaluation_index)
    }

    fn on_restart(&mut self, evaluation_index: usize) -> anyhow::Result<()> {
        self.restart_indices.push(evaluation_index);
        Ok(())
    }

    fn on_elimination(&mut self, individual: &Individual) -> anyhow::Result<()> {
        self.eliminated.push(individual.canonical_string().to_string());
        Ok(())
    }
}
