use std::collections::BTreeSet;
use std::sync::Arc;

use log::debug;
use rand::seq::{index, SliceRandom};
use rand::Rng;

use super::compiler::Compiler;
use super::genome::{Genome, TypedNode};
use super::individual::Individual;
use super::mutation::{random_valid_mutation, MutationError};
use super::pareto;
use crate::error::{PipevoError, Result};
use crate::functions::PrimitiveSet;
use crate::types::NodeType;

/// Attempts made by [`generate_valid`] before giving up.
pub const MAX_GENERATION_ATTEMPTS: usize = 50;

/// Typed "grow" generation of a random genome.
///
/// A height is drawn from `min_depth..=max_depth`. Below it, each slot is
/// filled with a terminal or a primitive in proportion to how many of each
/// the slot's type offers; at the height a terminal is forced. Types without
/// terminals (the prediction root) always get a primitive.
pub fn generate_genome<R: Rng>(
    pset: &PrimitiveSet,
    min_depth: usize,
    max_depth: usize,
    rng: &mut R,
) -> Result<Genome> {
    let height = rng.gen_range(min_depth.min(max_depth)..=max_depth);
    let mut nodes = Vec::new();
    let mut stack = vec![(NodeType::Prediction, 0usize)];

    while let Some((ty, depth)) = stack.pop() {
        let terminals = pset.terminals(&ty);
        let primitives = pset.primitives(&ty);
        let terminal_ratio =
            terminals.len() as f64 / (terminals.len() + primitives.len()).max(1) as f64;
        let stop = depth >= height || (depth >= min_depth && rng.gen::<f64>() < terminal_ratio);

        if (stop && !terminals.is_empty()) || primitives.is_empty() {
            let terminal = terminals.choose(rng).ok_or_else(|| {
                PipevoError::Generation(format!("Type {} has neither primitives nor terminals", ty))
            })?;
            nodes.push(TypedNode::Terminal(Arc::clone(terminal)));
        } else {
            let primitive = primitives.choose(rng).ok_or_else(|| {
                PipevoError::Generation(format!("No primitive returns {}", ty))
            })?;
            nodes.push(TypedNode::Primitive(Arc::clone(primitive)));
            for arg in primitive.args.iter().rev() {
                stack.push((arg.clone(), depth + 1));
            }
        }
    }

    Ok(Genome::new(nodes))
}

/// Generate genomes until one compiles.
pub fn generate_valid<R: Rng>(
    compiler: &Compiler,
    min_depth: usize,
    max_depth: usize,
    rng: &mut R,
) -> Result<Genome> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let genome = generate_genome(compiler.pset(), min_depth, max_depth, rng)?;
        match compiler.compile(&genome) {
            Ok(_) => return Ok(genome),
            Err(reason) => debug!("Generated genome {} is uncompilable: {}", genome, reason),
        }
    }
    Err(PipevoError::Generation(format!(
        "No compilable genome in {} attempts",
        MAX_GENERATION_ATTEMPTS
    )))
}

/// Typed one-point crossover: swap one subtree of a type both parents share
/// below the root. Returns `None` when the parents share no such type.
pub fn crossover<R: Rng>(parent1: &Genome, parent2: &Genome, rng: &mut R) -> Option<(Genome, Genome)> {
    let types = |g: &Genome| -> BTreeSet<NodeType> { g.iter().skip(1).map(|n| n.ret().clone()).collect() };
    let common: Vec<NodeType> = types(parent1).intersection(&types(parent2)).cloned().collect();
    let ty = common.choose(rng)?;

    let positions = |g: &Genome| -> Vec<usize> {
        g.iter()
            .enumerate()
            .skip(1)
            .filter(|(_, n)| n.ret() == ty)
            .map(|(i, _)| i)
            .collect()
    };
    let &i1 = positions(parent1).choose(rng)?;
    let &i2 = positions(parent2).choose(rng)?;
    let span1 = parent1.subtree(i1);
    let span2 = parent2.subtree(i2);

    let swap = |into: &Genome, at: std::ops::Range<usize>, from: &Genome, with: std::ops::Range<usize>| {
        let nodes = into.nodes();
        Genome::new(
            nodes[..at.start]
                .iter()
                .chain(&from.nodes()[with])
                .chain(&nodes[at.end..])
                .cloned()
                .collect(),
        )
    };

    Some((
        swap(parent1, span1.clone(), parent2, span2.clone()),
        swap(parent2, span2, parent1, span1),
    ))
}

/// Create one offspring from two distinct random parents: mate them with
/// probability `crossover_rate`, otherwise mutate the first with probability
/// `mutation_rate`. The first child is returned.
///
/// A mutation with no eligible target leaves the child unchanged; an
/// inconsistent genome is an internal error.
pub fn offspring_mate_or_mutate<R: Rng>(
    population: &[Individual],
    pset: &PrimitiveSet,
    crossover_rate: f64,
    mutation_rate: f64,
    rng: &mut R,
) -> Result<Genome> {
    if population.len() < 2 {
        return Err(PipevoError::Generation(
            "Reproduction needs at least two individuals".to_string(),
        ));
    }
    let parents = index::sample(rng, population.len(), 2);
    let first = population[parents.index(0)].genome();
    let second = population[parents.index(1)].genome();

    if rng.gen::<f64>() < crossover_rate {
        if let Some((child, _)) = crossover(first, second, rng) {
            return Ok(child);
        }
        return Ok(first.clone());
    }
    if rng.gen::<f64>() < mutation_rate {
        return match random_valid_mutation(first, pset, rng) {
            Ok((child, kind)) => {
                debug!("Applied {} mutation", kind);
                Ok(child)
            }
            Err(MutationError::InconsistentGenome(message)) => Err(PipevoError::Internal(message)),
            Err(reason) => {
                debug!("Mutation of {} skipped: {}", first, reason);
                Ok(first.clone())
            }
        };
    }
    Ok(first.clone())
}

/// NSGA-II elimination: order by non-dominated rank, then crowding distance
/// (descending), then canonical string; the last `k` positions are returned.
pub fn eliminate_nsga2(population: &[Individual], k: usize) -> Vec<usize> {
    let ranked = pareto::rank_and_crowd(
        population
            .iter()
            .map(|ind| ind.wvalues().map(<[f64]>::to_vec).unwrap_or_default())
            .collect(),
    );

    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| {
        ranked[a]
            .0
            .cmp(&ranked[b].0)
            .then_with(|| ranked[b].1.total_cmp(&ranked[a].1))
            .then_with(|| {
                population[a]
                    .canonical_string()
                    .cmp(population[b].canonical_string())
            })
    });
    order.split_off(order.len().saturating_sub(k))
}

/// Single-objective elimination: lowest weighted primary value first, ties
/// broken by canonical string descending.
pub fn eliminate_worst(population: &[Individual], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| {
        population[a]
            .primary_wvalue()
            .total_cmp(&population[b].primary_wvalue())
            .then_with(|| {
                population[b]
                    .canonical_string()
                    .cmp(population[a].canonical_string())
            })
    });
    order.truncate(k);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::genome::tests::three_step_genome;
    use crate::engines::generation::individual::tests::evaluated;
    use crate::functions::test_support::sample_pset;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_genomes_are_consistent() {
        let pset = sample_pset();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let genome = generate_genome(&pset, 1, 3, &mut rng).unwrap();
            assert!(genome.is_type_consistent(), "{}", genome);
            assert!((1..=3).contains(&genome.length()), "{}", genome);
        }
    }

    #[test]
    fn test_generate_valid_compiles() {
        let pset = sample_pset();
        let compiler = Compiler::new(Arc::clone(&pset));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let genome = generate_valid(&compiler, 1, 3, &mut rng).unwrap();
            assert!(compiler.compile(&genome).is_ok());
        }
    }

    #[test]
    fn test_crossover_preserves_types() {
        let pset = sample_pset();
        let mut rng = StdRng::seed_from_u64(5);
        let a = three_step_genome(&pset);
        for _ in 0..100 {
            let b = generate_genome(&pset, 1, 3, &mut rng).unwrap();
            if let Some((c1, c2)) = crossover(&a, &b, &mut rng) {
                assert!(c1.is_type_consistent(), "{}", c1);
                assert!(c2.is_type_consistent(), "{}", c2);
                assert_eq!(
                    c1.len() + c2.len(),
                    a.len() + b.len(),
                    "crossover only moves nodes"
                );
            }
        }
    }

    #[test]
    fn test_offspring_is_consistent() {
        let pset = sample_pset();
        let mut rng = StdRng::seed_from_u64(21);
        let population: Vec<Individual> = (0..6)
            .map(|_| Individual::new(generate_genome(&pset, 1, 3, &mut rng).unwrap()))
            .collect();
        for _ in 0..100 {
            let child = offspring_mate_or_mutate(&population, &pset, 0.2, 0.8, &mut rng).unwrap();
            assert!(child.is_type_consistent(), "{}", child);
        }
        assert!(offspring_mate_or_mutate(&population[..1], &pset, 0.2, 0.8, &mut rng).is_err());
    }

    #[test]
    fn test_eliminate_worst_removes_lowest_primary() {
        let population = vec![
            evaluated("b", &[0.5, -1.0]),
            evaluated("a", &[0.1, -1.0]),
            evaluated("c", &[0.9, -3.0]),
            evaluated("d", &[0.1, -2.0]),
        ];
        // Tie on 0.1 resolved by canonical string descending: "d" goes first.
        assert_eq!(eliminate_worst(&population, 1), vec![3]);
        assert_eq!(eliminate_worst(&population, 2), vec![3, 1]);
    }

    #[test]
    fn test_eliminate_nsga2_removes_dominated() {
        let population = vec![
            evaluated("front-a", &[0.9, -3.0]),
            evaluated("front-b", &[0.5, -1.0]),
            evaluated("dominated", &[0.4, -3.0]),
            evaluated("front-c", &[0.7, -2.0]),
        ];
        assert_eq!(eliminate_nsga2(&population, 1), vec![2]);
        assert_eq!(eliminate_nsga2(&population, 0), Vec::<usize>::new());
    }

    #[test]
    fn test_eliminate_nsga2_crowding_breaks_ties() {
        // One front; the interior point is the most crowded.
        let population = vec![
            evaluated("x", &[1.0, -5.0]),
            evaluated("y", &[3.0, -3.0]),
            evaluated("z", &[5.0, -1.0]),
        ];
        assert_eq!(eliminate_nsga2(&population, 1), vec![1]);
    }
}
