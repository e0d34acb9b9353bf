/// Pareto optimization utilities for multi-objective evolution
/// Implements NSGA-II style fast non-dominated sorting and crowding distance,
/// plus the non-dominated set used by the archive.
///
/// All comparisons here are on *weighted* values: every objective has been
/// multiplied by its direction's sign, so larger is always better.
use serde::{Deserialize, Serialize};

use super::individual::Individual;

/// Defines whether a metric should be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationDirection {
    Maximize,
    Minimize,
}

impl OptimizationDirection {
    /// Multiplier turning a raw value into a weighted one.
    pub fn weight(self) -> f64 {
        match self {
            OptimizationDirection::Maximize => 1.0,
            OptimizationDirection::Minimize => -1.0,
        }
    }

    /// Worst representable raw value for this direction.
    pub fn worst(self) -> f64 {
        match self {
            OptimizationDirection::Maximize => f64::MIN,
            OptimizationDirection::Minimize => f64::MAX,
        }
    }
}

/// Configuration for a single objective in multi-objective optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    pub name: String,
    pub direction: OptimizationDirection,
}

impl ObjectiveConfig {
    pub fn new(name: impl Into<String>, direction: OptimizationDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }
}

/// Individual with multiple objective values
#[derive(Debug, Clone)]
pub struct MultiObjectiveIndividual<T> {
    pub data: T,
    pub objectives: Vec<f64>,
    pub rank: usize,           // Pareto rank (0 = best frontier)
    pub crowding_distance: f64, // Diversity measure
}

impl<T> MultiObjectiveIndividual<T> {
    pub fn new(data: T, objectives: Vec<f64>) -> Self {
        Self {
            data,
            objectives,
            rank: 0,
            crowding_distance: 0.0,
        }
    }
}

/// Check if weighted vector A dominates weighted vector B
/// A dominates B if A is no worse than B in all objectives and strictly better in at least one
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut at_least_one_better = false;
    for (a_val, b_val) in a.iter().zip(b) {
        if b_val > a_val {
            return false;
        }
        if a_val > b_val {
            at_least_one_better = true;
        }
    }

    at_least_one_better
}

/// Fast non-dominated sorting (NSGA-II algorithm)
/// Returns individuals grouped by Pareto front (0 = best, 1 = second best, etc.)
pub fn fast_non_dominated_sort<T>(individuals: &mut [MultiObjectiveIndividual<T>]) -> Vec<Vec<usize>> {
    let n = individuals.len();

    // domination_count: how many individuals dominate it
    // dominated_solutions: indices of individuals it dominates
    let mut domination_count = vec![0; n];
    let mut dominated_solutions: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut first_front = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if dominates(&individuals[i].objectives, &individuals[j].objectives) {
                dominated_solutions[i].push(j);
            } else if dominates(&individuals[j].objectives, &individuals[i].objectives) {
                domination_count[i] += 1;
            }
        }

        if domination_count[i] == 0 {
            individuals[i].rank = 0;
            first_front.push(i);
        }
    }

    if first_front.is_empty() {
        return fronts;
    }
    fronts.push(first_front);

    let mut front_index = 0;
    while front_index < fronts.len() {
        let mut next_front = Vec::new();

        for &i in &fronts[front_index] {
            for &j in &dominated_solutions[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    individuals[j].rank = front_index + 1;
                    next_front.push(j);
                }
            }
        }

        if !next_front.is_empty() {
            fronts.push(next_front);
        }
        front_index += 1;
    }

    fronts
}

/// Calculate crowding distance for individuals in a front
/// Higher values indicate more diversity (isolated individuals)
pub fn calculate_crowding_distance<T>(
    individuals: &mut [MultiObjectiveIndividual<T>],
    front_indices: &[usize],
) {
    let front_size = front_indices.len();

    if front_size <= 2 {
        // Boundary solutions have infinite crowding distance
        for &idx in front_indices {
            individuals[idx].crowding_distance = f64::INFINITY;
        }
        return;
    }

    let num_objectives = individuals[front_indices[0]].objectives.len();

    for &idx in front_indices {
        individuals[idx].crowding_distance = 0.0;
    }

    for obj in 0..num_objectives {
        let mut sorted_indices: Vec<usize> = front_indices.to_vec();
        sorted_indices.sort_by(|&a, &b| {
            individuals[a].objectives[obj].total_cmp(&individuals[b].objectives[obj])
        });

        individuals[sorted_indices[0]].crowding_distance = f64::INFINITY;
        individuals[sorted_indices[front_size - 1]].crowding_distance = f64::INFINITY;

        let min_val = individuals[sorted_indices[0]].objectives[obj];
        let max_val = individuals[sorted_indices[front_size - 1]].objectives[obj];
        let range = max_val - min_val;

        if !range.is_finite() || range.abs() < 1e-10 {
            // All values are the same for this objective
            continue;
        }

        for i in 1..(front_size - 1) {
            let idx = sorted_indices[i];
            let prev_val = individuals[sorted_indices[i - 1]].objectives[obj];
            let next_val = individuals[sorted_indices[i + 1]].objectives[obj];

            individuals[idx].crowding_distance += (next_val - prev_val) / range;
        }
    }
}

/// Rank and crowding distance for every vector, in input order.
pub fn rank_and_crowd(objectives: Vec<Vec<f64>>) -> Vec<(usize, f64)> {
    let mut individuals: Vec<MultiObjectiveIndividual<usize>> = objectives
        .into_iter()
        .enumerate()
        .map(|(i, o)| MultiObjectiveIndividual::new(i, o))
        .collect();

    let fronts = fast_non_dominated_sort(&mut individuals);
    for front in &fronts {
        calculate_crowding_distance(&mut individuals, front);
    }

    individuals
        .into_iter()
        .map(|ind| (ind.rank, ind.crowding_distance))
        .collect()
}

/// Set of mutually non-dominated, evaluated individuals.
#[derive(Debug, Clone, Default)]
pub struct ParetoFront {
    members: Vec<Individual>,
}

impl ParetoFront {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `individual` unless a member dominates it or has the same
    /// weighted values. Members it dominates are evicted. Returns whether the
    /// front changed.
    pub fn update(&mut self, individual: &Individual) -> bool {
        let Some(candidate) = individual.wvalues() else {
            return false;
        };

        let rejected = self.members.iter().any(|m| {
            m.wvalues()
                .is_some_and(|w| w == candidate || dominates(w, candidate))
        });
        if rejected {
            return false;
        }

        self.members
            .retain(|m| !m.wvalues().is_some_and(|w| dominates(candidate, w)));
        self.members.push(individual.clone());
        true
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn members(&self) -> &[Individual] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::individual::tests::evaluated;

    #[test]
    fn test_dominance() {
        // A is better in both objectives
        assert!(dominates(&[10.0, 20.0], &[5.0, 10.0]));

        // A is better in one, equal in other
        assert!(dominates(&[10.0, 20.0], &[10.0, 10.0]));

        // A is better in one, worse in other - no dominance
        assert!(!dominates(&[10.0, 5.0], &[5.0, 10.0]));

        // Equal in both - no dominance
        assert!(!dominates(&[10.0, 20.0], &[10.0, 20.0]));

        // Different lengths never compare
        assert!(!dominates(&[10.0, 20.0], &[5.0]));
    }

    #[test]
    fn test_weighted_minimisation() {
        // Second objective minimised: raw 5 beats raw 10 once weighted.
        let w = OptimizationDirection::Minimize.weight();
        assert!(dominates(&[10.0, 5.0 * w], &[5.0, 10.0 * w]));
        assert_eq!(OptimizationDirection::Minimize.worst() * w, f64::MIN);
    }

    #[test]
    fn test_fast_non_dominated_sort() {
        let mut individuals = vec![
            MultiObjectiveIndividual::new(0, vec![1.0, 5.0]),  // Front 0
            MultiObjectiveIndividual::new(1, vec![3.0, 3.0]),  // Front 0
            MultiObjectiveIndividual::new(2, vec![5.0, 1.0]),  // Front 0
            MultiObjectiveIndividual::new(3, vec![2.0, 2.0]),  // Front 1
            MultiObjectiveIndividual::new(4, vec![1.0, 1.0]),  // Front 2
        ];

        let fronts = fast_non_dominated_sort(&mut individuals);

        assert_eq!(fronts.len(), 3);
        assert_eq!(fronts[0].len(), 3);
        assert_eq!(individuals[3].rank, 1);
        assert_eq!(individuals[4].rank, 2);
    }

    #[test]
    fn test_crowding_distance() {
        let ranked = rank_and_crowd(vec![
            vec![1.0, 5.0],
            vec![3.0, 3.0],
            vec![5.0, 1.0],
            vec![4.0, 2.5],
        ]);

        // Boundary individuals should have infinite crowding distance
        assert!(ranked[0].1.is_infinite());
        assert!(ranked[2].1.is_infinite());
        assert!(ranked[1].1.is_finite());
        assert!(ranked.iter().all(|(rank, _)| *rank == 0));
    }

    #[test]
    fn test_front_update_evicts_dominated() {
        let mut front = ParetoFront::new();
        assert!(front.update(&evaluated("a", &[1.0, -3.0])));
        assert!(front.update(&evaluated("b", &[2.0, -4.0])));
        assert_eq!(front.len(), 2);

        // Dominates both.
        assert!(front.update(&evaluated("c", &[3.0, -2.0])));
        assert_eq!(front.len(), 1);
        assert_eq!(front.members()[0].canonical_string(), "c");

        // Dominated and equal candidates leave the front unchanged.
        assert!(!front.update(&evaluated("d", &[1.0, -5.0])));
        assert!(!front.update(&evaluated("e", &[3.0, -2.0])));
        assert_eq!(front.len(), 1);

        front.clear();
        assert!(front.is_empty());
    }
}
