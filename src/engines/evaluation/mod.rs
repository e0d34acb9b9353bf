pub mod dispatcher;
pub mod evaluator;

pub use dispatcher::{Dispatcher, EvaluationResult, TaskId, ThreadDispatcher};
pub use evaluator::{run_evaluation, EvaluationOutput, Evaluator, WorkerLog};
