use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::genome::Genome;
use super::individual::{Individual, Objectives};
use super::progress::{log_parseable_event, EventToken, SearchObserver};
use super::toolbox::Toolbox;
use crate::config::{validate_budget, SearchConfig};
use crate::engines::evaluation::{Dispatcher, EvaluationResult, TaskId};
use crate::error::{PipevoError, Result};

/// Attempts at producing one queueable offspring per processed result.
pub const MAX_CREATE_ATTEMPTS: usize = 50;

/// Longest single wait on the dispatcher before budget and cancellation are rechecked.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cloneable handle that stops a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wall-clock budget measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.elapsed() > self.budget
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `max_n_evaluations` results processed without a restart.
    EvaluationsExhausted,
    /// The time budget ran out.
    TimeLimit,
    /// A result was needed but nothing was queued.
    QueueExhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Termination::EvaluationsExhausted => "evaluations_exhausted",
            Termination::TimeLimit => "time_limit",
            Termination::QueueExhausted => "queue_exhausted",
        };
        f.write_str(reason)
    }
}

#[derive(Debug)]
pub struct SearchOutcome {
    /// Working population at termination.
    pub population: Vec<Individual>,
    /// Results processed over the whole run.
    pub n_evaluations: usize,
    /// Evaluation indices at which the search restarted.
    pub restarts: Vec<usize>,
    pub termination: Termination,
}

#[derive(Default)]
struct LoopState {
    /// Canonical strings of every genome ever queued; kept across restarts.
    queued: HashSet<String>,
    pending: HashMap<TaskId, Individual>,
    population: Vec<Individual>,
    n_evaluations: usize,
    restarts: Vec<usize>,
}

/// Run `f`, logging and swallowing its error. Cancellation always
/// propagates; an exhausted budget afterwards becomes a timeout.
fn safe_outside_call<F>(deadline: &Deadline, f: F) -> Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if let Err(e) = f() {
        if matches!(e.downcast_ref::<PipevoError>(), Some(PipevoError::Cancelled)) {
            return Err(PipevoError::Cancelled);
        }
        warn!("Exception during callback: {:#}", e);
    }
    if deadline.expired() {
        warn!("Time exceeded during callback, but exception was swallowed.");
        return Err(PipevoError::Timeout);
    }
    Ok(())
}

/// Steady-state evolutionary search with asynchronous evaluation.
pub struct EvolutionEngine<T: Toolbox, D: Dispatcher> {
    config: SearchConfig,
    objectives: Objectives,
    toolbox: T,
    dispatcher: D,
    cancel: CancelToken,
}

impl<T: Toolbox, D: Dispatcher> EvolutionEngine<T, D> {
    pub fn new(config: SearchConfig, toolbox: T, dispatcher: D) -> Self {
        let objectives = config.objectives();
        Self {
            config,
            objectives,
            toolbox,
            dispatcher,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn toolbox(&self) -> &T {
        &self.toolbox
    }

    pub fn toolbox_mut(&mut self) -> &mut T {
        &mut self.toolbox
    }

    /// Run the search from `start_population`, whose size bounds the working population.
    pub fn run(
        &mut self,
        start_population: Vec<Genome>,
        observer: &mut dyn SearchObserver,
    ) -> Result<SearchOutcome> {
        validate_budget(
            self.config.max_time_seconds,
            self.config.max_n_evaluations,
            self.config.n_jobs,
        )?;

        let deadline = Deadline::after(Duration::from_secs_f64(self.config.max_time_seconds));
        let mut state = LoopState::default();
        self.dispatcher.start()?;

        let termination = match self.search(start_population, observer, &deadline, &mut state) {
            Ok(termination) => termination,
            Err(PipevoError::Timeout) => {
                info!("Search terminated because maximum time has elapsed.");
                Termination::TimeLimit
            }
            Err(e) => {
                if let Err(stop_err) = self.dispatcher.stop() {
                    warn!("Failed to stop dispatcher: {}", stop_err);
                }
                return Err(e);
            }
        };

        self.dispatcher.stop()?;
        info!(
            "Search finished ({}): {} individuals evaluated, {} restarts.",
            termination,
            state.n_evaluations,
            state.restarts.len()
        );
        log_parseable_event(EventToken::EaTerminated, &[&termination, &state.n_evaluations]);

        Ok(SearchOutcome {
            population: state.population,
            n_evaluations: state.n_evaluations,
            restarts: state.restarts,
            termination,
        })
    }

    fn search(
        &mut self,
        start_population: Vec<Genome>,
        observer: &mut dyn SearchObserver,
        deadline: &Deadline,
        state: &mut LoopState,
    ) -> Result<Termination> {
        let max_population_size = start_population.len();
        let mut seed = start_population;

        loop {
            state.population.clear();
            info!("Starting EA with new population.");
            for genome in seed.drain(..) {
                self.queue(genome, state)?;
            }

            let mut restarted = false;
            for evaluation_index in 0..self.config.max_n_evaluations {
                let Some(result) = self.next_result(state, deadline)? else {
                    warn!("No evaluations pending, stopping search early.");
                    return Ok(Termination::QueueExhausted);
                };
                let individual = self.process_result(result, state)?;

                safe_outside_call(deadline, || observer.on_evaluation(&individual))?;

                if observer.should_restart(evaluation_index) {
                    info!("Restart criterion met. Restarting with new random population.");
                    log_parseable_event(EventToken::EaRestart, &[&evaluation_index]);
                    state.restarts.push(evaluation_index);
                    safe_outside_call(deadline, || observer.on_restart(evaluation_index))?;
                    seed = self.toolbox.population(max_population_size)?;
                    restarted = true;
                    break;
                }

                state.population.push(individual);
                if state.population.len() > max_population_size {
                    self.eliminate_one(state, observer, deadline)?;
                }

                if state.population.len() > 1 {
                    self.queue_offspring(state)?;
                }
            }

            self.dispatcher.restart()?;
            state.pending.clear();
            if !restarted {
                return Ok(Termination::EvaluationsExhausted);
            }
        }
    }

    /// Queue `genome` unless it was seen before or does not compile.
    fn queue(&mut self, genome: Genome, state: &mut LoopState) -> Result<bool> {
        let individual = Individual::new(genome);
        if !state.queued.insert(individual.canonical_string().to_string()) {
            return Ok(false);
        }
        match self.toolbox.compile(individual.genome()) {
            Ok(pipeline) => {
                let id = self.dispatcher.queue_evaluation(pipeline)?;
                state.pending.insert(id, individual);
                Ok(true)
            }
            Err(reason) => {
                debug!("Skipping {}: {}", individual, reason);
                Ok(false)
            }
        }
    }

    fn next_result(&mut self, state: &LoopState, deadline: &Deadline) -> Result<Option<EvaluationResult>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipevoError::Cancelled);
            }
            if deadline.expired() {
                return Err(PipevoError::Timeout);
            }
            if state.pending.is_empty() {
                return Ok(None);
            }
            let wait = deadline.remaining().min(POLL_INTERVAL);
            if let Some(result) = self.dispatcher.get_next_result(wait)? {
                return Ok(Some(result));
            }
        }
    }

    fn process_result(&mut self, mut result: EvaluationResult, state: &mut LoopState) -> Result<Individual> {
        result.log.flush();
        let mut individual = state.pending.remove(&result.id).ok_or_else(|| {
            PipevoError::Internal(format!("Result for unknown task {}", result.id))
        })?;

        let output = result.output;
        let fitness = self.objectives.fitness(
            output.score,
            output.start_time,
            output.duration,
            individual.length(),
        );
        state.n_evaluations += 1;
        log_parseable_event(
            EventToken::EvaluationResult,
            &[
                &fitness.start_time.format("%Y-%m-%d %H:%M:%S,%3f"),
                &fitness.duration.as_secs_f64(),
                &format!("{:?}", fitness.wvalues),
                &individual,
            ],
        );
        individual.fitness = Some(fitness);
        Ok(individual)
    }

    fn eliminate_one(
        &mut self,
        state: &mut LoopState,
        observer: &mut dyn SearchObserver,
        deadline: &Deadline,
    ) -> Result<()> {
        let to_remove = self.toolbox.eliminate(&state.population, 1);
        let Some(&index) = to_remove.first() else {
            return Err(PipevoError::Internal(
                "Elimination selected no individual".to_string(),
            ));
        };
        if index >= state.population.len() {
            return Err(PipevoError::Internal(format!(
                "Elimination selected position {} of {}",
                index,
                state.population.len()
            )));
        }
        let removed = state.population.remove(index);
        log_parseable_event(EventToken::EaRemoveInd, &[&removed]);
        safe_outside_call(deadline, || observer.on_elimination(&removed))
    }

    fn queue_offspring(&mut self, state: &mut LoopState) -> Result<()> {
        for _ in 0..MAX_CREATE_ATTEMPTS {
            let offspring = self.toolbox.create(&state.population, 1)?;
            for genome in offspring {
                if self.queue(genome, state)? {
                    return Ok(());
                }
            }
        }
        warn!("Unable to create new individual.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_safe_outside_call_swallows_errors() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(safe_outside_call(&deadline, || Err(anyhow!("callback failed"))).is_ok());
    }

    #[test]
    fn test_safe_outside_call_propagates_cancellation() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let result = safe_outside_call(&deadline, || Err(PipevoError::Cancelled.into()));
        assert!(matches!(result, Err(PipevoError::Cancelled)));
    }

    #[test]
    fn test_safe_outside_call_times_out_after_budget() {
        let deadline = Deadline::after(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let result = safe_outside_call(&deadline, || Err(anyhow!("late")));
        assert!(matches!(result, Err(PipevoError::Timeout)));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let handle = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_deadline_remaining_saturates() {
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
