use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use super::evaluator::{run_evaluation, EvaluationOutput, Evaluator, WorkerLog};
use crate::engines::generation::compiler::Pipeline;
use crate::error::{PipevoError, Result};

pub type TaskId = u64;

/// A completed evaluation delivered back to the control path.
#[derive(Debug)]
pub struct EvaluationResult {
    pub id: TaskId,
    pub output: EvaluationOutput,
    pub log: WorkerLog,
}

/// Worker pool executing compiled pipelines asynchronously.
///
/// Results may arrive in any order. After `restart` no result of a task
/// queued before it is delivered; after `stop` nothing is delivered.
pub trait Dispatcher {
    fn start(&mut self) -> Result<()>;

    fn queue_evaluation(&mut self, pipeline: Pipeline) -> Result<TaskId>;

    /// Wait up to `timeout` for the next completed evaluation.
    fn get_next_result(&mut self, timeout: Duration) -> Result<Option<EvaluationResult>>;

    /// Number of queued tasks whose result has not been delivered.
    fn pending(&self) -> usize;

    fn restart(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

struct Channel {
    sender: Sender<(u64, EvaluationResult)>,
    receiver: Receiver<(u64, EvaluationResult)>,
}

/// Dispatcher backed by a dedicated rayon thread pool of `n_jobs` threads.
pub struct ThreadDispatcher {
    n_jobs: usize,
    evaluator: Arc<dyn Evaluator>,
    pool: Option<rayon::ThreadPool>,
    channel: Option<Channel>,
    generation: Arc<AtomicU64>,
    stopped: Arc<AtomicBool>,
    next_id: TaskId,
    pending: HashSet<TaskId>,
}

impl ThreadDispatcher {
    pub fn new(n_jobs: usize, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            n_jobs,
            evaluator,
            pool: None,
            channel: None,
            generation: Arc::new(AtomicU64::new(0)),
            stopped: Arc::new(AtomicBool::new(false)),
            next_id: 0,
            pending: HashSet::new(),
        }
    }

    fn discard_delivered(&mut self) {
        if let Some(channel) = &self.channel {
            while channel.receiver.try_recv().is_ok() {}
        }
    }
}

impl Dispatcher for ThreadDispatcher {
    fn start(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        // rayon reads zero threads as "one per core".
        if self.n_jobs == 0 {
            return Err(PipevoError::ParameterValidation {
                parameter: "n_jobs",
                message: "must be greater than 0".to_string(),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .thread_name(|i| format!("pipevo-worker-{}", i))
            .build()
            .map_err(|e| PipevoError::Dispatcher(format!("Failed to build worker pool: {}", e)))?;
        let (sender, receiver) = channel();

        self.stopped.store(false, Ordering::SeqCst);
        self.pool = Some(pool);
        self.channel = Some(Channel { sender, receiver });
        info!("Started {} evaluation workers", self.n_jobs);
        Ok(())
    }

    fn queue_evaluation(&mut self, pipeline: Pipeline) -> Result<TaskId> {
        let (Some(pool), Some(channel)) = (&self.pool, &self.channel) else {
            return Err(PipevoError::Dispatcher("Dispatcher is not running".to_string()));
        };

        let id = self.next_id;
        self.next_id += 1;

        let generation = self.generation.load(Ordering::SeqCst);
        let current = Arc::clone(&self.generation);
        let stopped = Arc::clone(&self.stopped);
        let evaluator = Arc::clone(&self.evaluator);
        let sender = channel.sender.clone();

        pool.spawn(move || {
            let is_stale =
                || stopped.load(Ordering::SeqCst) || current.load(Ordering::SeqCst) != generation;
            if is_stale() {
                return;
            }
            let (output, log) = run_evaluation(evaluator.as_ref(), &pipeline);
            if is_stale() {
                return;
            }
            // The receiver is gone once the dispatcher stopped.
            let _ = sender.send((generation, EvaluationResult { id, output, log }));
        });

        self.pending.insert(id);
        Ok(id)
    }

    fn get_next_result(&mut self, timeout: Duration) -> Result<Option<EvaluationResult>> {
        let Some(channel) = &self.channel else {
            return Err(PipevoError::Dispatcher("Dispatcher is not running".to_string()));
        };
        match channel.receiver.recv_timeout(timeout) {
            Ok((generation, result)) => {
                if generation == self.generation.load(Ordering::SeqCst) && self.pending.remove(&result.id) {
                    Ok(Some(result))
                } else {
                    debug!("Discarding stale result of task {}", result.id);
                    Ok(None)
                }
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PipevoError::Dispatcher("Result channel disconnected".to_string()))
            }
        }
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn restart(&mut self) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let discarded = self.pending.len();
        self.pending.clear();
        self.discard_delivered();
        debug!("Dispatcher restarted, discarded {} pending tasks", discarded);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
        self.channel = None;
        // Dropping the pool lets in-flight evaluations finish in the background.
        self.pool = None;
        Ok(())
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn constant(score: f64) -> Arc<dyn Evaluator> {
        Arc::new(move |_: &Pipeline, _: &mut WorkerLog| -> anyhow::Result<f64> { Ok(score) })
    }

    fn next(dispatcher: &mut ThreadDispatcher) -> EvaluationResult {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(result) = dispatcher.get_next_result(Duration::from_millis(50)).unwrap() {
                return result;
            }
        }
        panic!("no result within 10s");
    }

    #[test]
    fn test_results_match_queued_ids() {
        let mut dispatcher = ThreadDispatcher::new(2, constant(1.5));
        dispatcher.start().unwrap();
        let ids: HashSet<TaskId> = (0..4)
            .map(|_| dispatcher.queue_evaluation(Pipeline::default()).unwrap())
            .collect();
        assert_eq!(dispatcher.pending(), 4);

        let mut seen = HashSet::new();
        for _ in 0..4 {
            let result = next(&mut dispatcher);
            assert_eq!(result.output.score, Some(1.5));
            seen.insert(result.id);
        }
        assert_eq!(seen, ids);
        assert_eq!(dispatcher.pending(), 0);
        dispatcher.stop().unwrap();
    }

    #[test]
    fn test_queue_before_start_fails() {
        let mut dispatcher = ThreadDispatcher::new(1, constant(0.0));
        assert!(matches!(
            dispatcher.queue_evaluation(Pipeline::default()),
            Err(PipevoError::Dispatcher(_))
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut dispatcher = ThreadDispatcher::new(0, constant(0.0));
        assert!(matches!(
            dispatcher.start(),
            Err(PipevoError::ParameterValidation { parameter: "n_jobs", .. })
        ));
        assert!(dispatcher.queue_evaluation(Pipeline::default()).is_err());
    }

    #[test]
    fn test_restart_drops_previous_work() {
        let slow: Arc<dyn Evaluator> = Arc::new(|_: &Pipeline, _: &mut WorkerLog| -> anyhow::Result<f64> {
            std::thread::sleep(Duration::from_millis(30));
            Ok(0.0)
        });
        let mut dispatcher = ThreadDispatcher::new(1, slow);
        dispatcher.start().unwrap();
        for _ in 0..3 {
            dispatcher.queue_evaluation(Pipeline::default()).unwrap();
        }
        dispatcher.restart().unwrap();
        assert_eq!(dispatcher.pending(), 0);

        let fresh = dispatcher.queue_evaluation(Pipeline::default()).unwrap();
        assert_eq!(next(&mut dispatcher).id, fresh);
        dispatcher.stop().unwrap();
    }
}
