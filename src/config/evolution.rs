use super::traits::ConfigSection;
use crate::error::{PipevoError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub min_depth: usize,
    pub max_depth: usize,
    pub elimination: EliminationPolicy,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliminationPolicy {
    /// Non-dominated rank, then crowding distance.
    Nsga2,
    /// Lowest primary objective.
    WorstFirst,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            crossover_rate: 0.2,
            mutation_rate: 0.8,
            min_depth: 1,
            max_depth: 3,
            elimination: EliminationPolicy::Nsga2,
            seed: None,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(PipevoError::Configuration(
                "Mutation rate must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(PipevoError::Configuration(
                "Crossover rate must be between 0 and 1".to_string(),
            ));
        }
        if self.min_depth == 0 || self.min_depth > self.max_depth {
            return Err(PipevoError::Configuration(format!(
                "Depth range {}..={} is empty or starts at 0",
                self.min_depth, self.max_depth
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_must_be_probabilities() {
        let mut config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
        config.crossover_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_depth_range() {
        let config = EvolutionConfig {
            min_depth: 4,
            max_depth: 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipevoError::Configuration(_))));
    }
}
