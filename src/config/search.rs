use super::traits::ConfigSection;
use crate::engines::generation::individual::{Objectives, SecondaryObjective};
use crate::engines::generation::pareto::{ObjectiveConfig, OptimizationDirection};
use crate::error::{PipevoError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on the search time budget, in seconds.
pub const MAX_TIME_SECONDS: f64 = 3e6;

/// Budget and objectives of one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_n_evaluations: usize,
    pub max_time_seconds: f64,
    pub n_jobs: usize,
    pub population_size: usize,
    pub run_id: String,
    pub output_dir: String,
    pub primary_objective: ObjectiveConfig,
    pub secondary_objective: Option<SecondaryObjective>,
    /// Restart after this many evaluations without a current-front change.
    pub restart_after: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_n_evaluations: 10_000,
            max_time_seconds: 3600.0,
            n_jobs: 1,
            population_size: 50,
            run_id: "pipevo".to_string(),
            output_dir: ".".to_string(),
            primary_objective: ObjectiveConfig::new("score", OptimizationDirection::Maximize),
            secondary_objective: Some(SecondaryObjective::Size),
            restart_after: None,
        }
    }
}

impl SearchConfig {
    pub fn objectives(&self) -> Objectives {
        Objectives::new(self.primary_objective.clone(), self.secondary_objective)
    }
}

/// Check the search budget; each violation names the offending parameter.
pub fn validate_budget(max_time_seconds: f64, max_n_evaluations: usize, n_jobs: usize) -> Result<()> {
    if !(max_time_seconds > 0.0 && max_time_seconds <= MAX_TIME_SECONDS) {
        return Err(PipevoError::ParameterValidation {
            parameter: "max_time_seconds",
            message: format!(
                "must be greater than 0 and at most {}, but was {}",
                MAX_TIME_SECONDS, max_time_seconds
            ),
        });
    }
    if max_n_evaluations == 0 {
        return Err(PipevoError::ParameterValidation {
            parameter: "max_n_evaluations",
            message: "must be greater than 0".to_string(),
        });
    }
    if n_jobs == 0 {
        return Err(PipevoError::ParameterValidation {
            parameter: "n_jobs",
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

impl ConfigSection for SearchConfig {
    fn section_name() -> &'static str {
        "search"
    }

    fn validate(&self) -> Result<()> {
        validate_budget(self.max_time_seconds, self.max_n_evaluations, self.n_jobs)?;
        if self.population_size < 2 {
            return Err(PipevoError::Configuration(
                "Population size must be at least 2".to_string(),
            ));
        }
        if self.run_id.is_empty() {
            return Err(PipevoError::Configuration("Run id must not be empty".to_string()));
        }
        if self.restart_after == Some(0) {
            return Err(PipevoError::Configuration(
                "restart_after must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
