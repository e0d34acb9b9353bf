use rand::rngs::StdRng;
use rand::SeedableRng;

use super::compiler::{Compiler, Pipeline, Uncompilable};
use super::genome::Genome;
use super::individual::Individual;
use super::operators::{
    eliminate_nsga2, eliminate_worst, generate_valid, offspring_mate_or_mutate,
};
use crate::config::{EliminationPolicy, EvolutionConfig};
use crate::error::Result;

/// Search-specific operations the evolutionary loop is parameterised over.
pub trait Toolbox {
    fn compile(&self, genome: &Genome) -> std::result::Result<Pipeline, Uncompilable>;

    /// Positions of exactly `k` individuals to remove.
    fn eliminate(&self, population: &[Individual], k: usize) -> Vec<usize>;

    /// `k` new genomes derived from `population`.
    fn create(&mut self, population: &[Individual], k: usize) -> Result<Vec<Genome>>;

    /// `n` fresh random genomes.
    fn population(&mut self, n: usize) -> Result<Vec<Genome>>;
}

/// Genetic-programming toolbox over a primitive set.
pub struct GpToolbox {
    compiler: Compiler,
    config: EvolutionConfig,
    rng: StdRng,
}

impl GpToolbox {
    pub fn new(compiler: Compiler, config: EvolutionConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            compiler,
            config,
            rng,
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }
}

impl Toolbox for GpToolbox {
    fn compile(&self, genome: &Genome) -> std::result::Result<Pipeline, Uncompilable> {
        self.compiler.compile(genome)
    }

    fn eliminate(&self, population: &[Individual], k: usize) -> Vec<usize> {
        match self.config.elimination {
            EliminationPolicy::Nsga2 => eliminate_nsga2(population, k),
            EliminationPolicy::WorstFirst => eliminate_worst(population, k),
        }
    }

    fn create(&mut self, population: &[Individual], k: usize) -> Result<Vec<Genome>> {
        (0..k)
            .map(|_| {
                offspring_mate_or_mutate(
                    population,
                    self.compiler.pset(),
                    self.config.crossover_rate,
                    self.config.mutation_rate,
                    &mut self.rng,
                )
            })
            .collect()
    }

    fn population(&mut self, n: usize) -> Result<Vec<Genome>> {
        (0..n)
            .map(|_| {
                generate_valid(
                    &self.compiler,
                    self.config.min_depth,
                    self.config.max_depth,
                    &mut self.rng,
                )
            })
            .collect()
    }
}
