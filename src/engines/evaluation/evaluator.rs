use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::Level;

use crate::engines::generation::compiler::Pipeline;

/// Log target used when worker records are replayed on the control path.
pub const WORKER_TARGET: &str = "pipevo::worker";

/// Log records buffered by one evaluation, replayed by the search loop.
#[derive(Debug, Clone, Default)]
pub struct WorkerLog {
    records: Vec<(Level, String)>,
}

impl WorkerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        self.records.push((level, message.into()));
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message);
    }

    pub fn records(&self) -> &[(Level, String)] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Emit every buffered record through `log`, in order.
    pub fn flush(&mut self) {
        for (level, message) in self.records.drain(..) {
            log::log!(target: WORKER_TARGET, level, "{}", message);
        }
    }
}

/// Scores compiled pipelines. Called from worker threads.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, pipeline: &Pipeline, log: &mut WorkerLog) -> anyhow::Result<f64>;
}

impl<F> Evaluator for F
where
    F: Fn(&Pipeline, &mut WorkerLog) -> anyhow::Result<f64> + Send + Sync,
{
    fn evaluate(&self, pipeline: &Pipeline, log: &mut WorkerLog) -> anyhow::Result<f64> {
        self(pipeline, log)
    }
}

/// Outcome of one evaluation. `score` is `None` when the evaluator failed.
#[derive(Debug, Clone)]
pub struct EvaluationOutput {
    pub score: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl EvaluationOutput {
    pub fn is_failure(&self) -> bool {
        self.score.is_none()
    }
}

/// Run `evaluator` on `pipeline`, turning errors and panics into a failed output.
pub fn run_evaluation(evaluator: &dyn Evaluator, pipeline: &Pipeline) -> (EvaluationOutput, WorkerLog) {
    let mut log = WorkerLog::new();
    let start_time = Utc::now();
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(pipeline, &mut log)));
    let duration = started.elapsed();

    let (score, error) = match outcome {
        Ok(Ok(score)) => (Some(score), None),
        Ok(Err(e)) => (None, Some(format!("{:#}", e))),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "evaluation panicked".to_string());
            (None, Some(message))
        }
    };
    if let Some(error) = &error {
        log.warn(format!("Evaluation of {:?} failed: {}", pipeline.step_names(), error));
    }

    (
        EvaluationOutput {
            score,
            start_time,
            duration,
            error,
        },
        log,
    )
}
