pub mod archive;
pub mod compiler;
pub mod evolution_engine;
pub mod genome;
pub mod individual;
pub mod mutation;
pub mod operators;
pub mod pareto;
pub mod progress;
pub mod toolbox;

pub use archive::{Archive, FrontRecord, ParetoCallback};
pub use compiler::{Compiler, Pipeline, PipelineStep, Uncompilable};
pub use evolution_engine::{CancelToken, Deadline, EvolutionEngine, SearchOutcome, Termination};
pub use genome::{Genome, TypedNode};
pub use individual::{Fitness, Individual, Objectives, SecondaryObjective};
pub use mutation::{random_valid_mutation, MutationError, MutationKind};
pub use pareto::{ObjectiveConfig, OptimizationDirection, ParetoFront};
pub use progress::{log_parseable_event, EventToken, NoopObserver, SearchObserver};
pub use toolbox::{GpToolbox, Toolbox};
