use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::genome::Genome;
use super::pareto::{ObjectiveConfig, OptimizationDirection};

/// Optional second objective; both are minimised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryObjective {
    /// Wall-clock evaluation time in seconds.
    Duration,
    /// Number of primitives in the pipeline.
    Size,
}

/// Which objectives a fitness carries, and in which direction.
#[derive(Debug, Clone, PartialEq)]
pub struct Objectives {
    pub primary: ObjectiveConfig,
    pub secondary: Option<SecondaryObjective>,
}

impl Objectives {
    pub fn new(primary: ObjectiveConfig, secondary: Option<SecondaryObjective>) -> Self {
        Self { primary, secondary }
    }

    pub fn len(&self) -> usize {
        1 + usize::from(self.secondary.is_some())
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn directions(&self) -> Vec<OptimizationDirection> {
        let mut directions = vec![self.primary.direction];
        if self.secondary.is_some() {
            directions.push(OptimizationDirection::Minimize);
        }
        directions
    }

    /// Build the fitness of one evaluation. A missing score marks a failed
    /// evaluation and gets the worst primary value for its direction.
    pub fn fitness(
        &self,
        score: Option<f64>,
        start_time: DateTime<Utc>,
        duration: Duration,
        length: usize,
    ) -> Fitness {
        let primary = match score {
            Some(s) if !s.is_nan() => s,
            _ => self.primary.direction.worst(),
        };
        let mut values = vec![primary];
        match self.secondary {
            Some(SecondaryObjective::Duration) => values.push(duration.as_secs_f64()),
            Some(SecondaryObjective::Size) => values.push(length as f64),
            None => {}
        }
        let wvalues = values
            .iter()
            .zip(self.directions())
            .map(|(v, d)| v * d.weight())
            .collect();
        Fitness {
            values,
            wvalues,
            start_time,
            duration,
        }
    }
}

impl Default for Objectives {
    fn default() -> Self {
        Self::new(
            ObjectiveConfig::new("score", OptimizationDirection::Maximize),
            Some(SecondaryObjective::Size),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    pub values: Vec<f64>,
    /// Direction-normalised values; larger is always better.
    pub wvalues: Vec<f64>,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

/// A genome and, once evaluated, its fitness.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    genome: Genome,
    canonical: String,
    pub fitness: Option<Fitness>,
}

impl Individual {
    pub fn new(genome: Genome) -> Self {
        let canonical = genome.canonical_string();
        Self {
            genome,
            canonical,
            fitness: None,
        }
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn canonical_string(&self) -> &str {
        &self.canonical
    }

    /// Number of primitives in the pipeline.
    pub fn length(&self) -> usize {
        self.genome.length()
    }

    pub fn wvalues(&self) -> Option<&[f64]> {
        self.fitness.as_ref().map(|f| f.wvalues.as_slice())
    }

    /// Weighted primary objective, `f64::MIN` when unevaluated.
    pub fn primary_wvalue(&self) -> f64 {
        self.wvalues()
            .and_then(|w| w.first().copied())
            .unwrap_or(f64::MIN)
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engines::generation::genome::TypedNode;
    use crate::functions::Terminal;
    use crate::types::{NodeType, Value};
    use std::sync::Arc;

    /// Individual whose canonical string is `name` and whose weighted values are `wvalues`.
    pub(crate) fn evaluated(name: &str, wvalues: &[f64]) -> Individual {
        let genome = Genome::new(vec![TypedNode::Terminal(Arc::new(Terminal {
            name: name.to_string(),
            ret: NodeType::Data,
            value: Some(Value::Integer(0)),
        }))]);
        let mut individual = Individual::new(genome);
        individual.fitness = Some(Fitness {
            values: wvalues.to_vec(),
            wvalues: wvalues.to_vec(),
            start_time: Utc::now(),
            duration: Duration::from_millis(10),
        });
        individual
    }

    #[test]
    fn test_fitness_weights_secondary() {
        let objectives = Objectives::default();
        let fitness = objectives.fitness(Some(0.8), Utc::now(), Duration::from_secs(2), 3);
        assert_eq!(fitness.values, vec![0.8, 3.0]);
        assert_eq!(fitness.wvalues, vec![0.8, -3.0]);

        let timed = Objectives::new(
            ObjectiveConfig::new("loss", OptimizationDirection::Minimize),
            Some(SecondaryObjective::Duration),
        );
        let fitness = timed.fitness(Some(0.25), Utc::now(), Duration::from_millis(1500), 3);
        assert_eq!(fitness.wvalues, vec![-0.25, -1.5]);
    }

    #[test]
    fn test_failed_evaluation_is_worst() {
        let objectives = Objectives::new(
            ObjectiveConfig::new("score", OptimizationDirection::Maximize),
            None,
        );
        let fitness = objectives.fitness(None, Utc::now(), Duration::ZERO, 1);
        assert_eq!(fitness.values, vec![f64::MIN]);
        assert_eq!(objectives.len(), 1);

        let nan = objectives.fitness(Some(f64::NAN), Utc::now(), Duration::ZERO, 1);
        assert_eq!(nan.wvalues, vec![f64::MIN]);
    }

    #[test]
    fn test_unevaluated_primary() {
        let individual = Individual::new(Genome::default());
        assert!(individual.wvalues().is_none());
        assert_eq!(individual.primary_wvalue(), f64::MIN);
    }
}
