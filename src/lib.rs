pub mod config;
pub mod engines;
pub mod error;
pub mod functions;
pub mod types;

pub use config::{load_config, AppConfig, ConfigManager, EvolutionConfig, SearchConfig};
pub use engines::evaluation::{Dispatcher, EvaluationOutput, Evaluator, ThreadDispatcher, WorkerLog};
pub use engines::generation::{
    Archive, Compiler, EvolutionEngine, Genome, GpToolbox, Individual, Pipeline, SearchObserver,
    SearchOutcome, Termination, Toolbox,
};
pub use error::{PipevoError, Result};
pub use functions::{OperatorCatalog, OperatorSpec, PrimitiveSet};
