//! Type-preserving structural mutations.
//!
//! Every operator takes a genome by reference and returns a new one, or an
//! explicit [`MutationError`] when the genome offers no eligible target.

use std::fmt;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use super::genome::{find_unmatched_terminal, Genome, TypedNode};
use crate::functions::{Primitive, PrimitiveSet, Terminal};
use crate::types::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    ReplaceTerminal,
    ReplacePrimitive,
    Insert,
    Shrink,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::ReplaceTerminal => "replace_terminal",
            MutationKind::ReplacePrimitive => "replace_primitive",
            MutationKind::Insert => "insert",
            MutationKind::Shrink => "shrink",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("no terminal has an alternative value")]
    NoEligibleTerminal,

    #[error("no primitive has an alternative with the same return type")]
    NoEligiblePrimitive,

    #[error("no subtree can be wrapped by a new primitive")]
    NoInsertionPoint,

    #[error("no primitive can be shrunk")]
    NoShrinkTarget,

    /// The genome did not have the shape its types promise. Not a normal outcome.
    #[error("genome is inconsistent: {0}")]
    InconsistentGenome(String),
}

fn random_terminal<R: Rng>(
    pset: &PrimitiveSet,
    ty: &NodeType,
    rng: &mut R,
) -> Result<Arc<Terminal>, MutationError> {
    pset.terminals(ty)
        .choose(rng)
        .cloned()
        .ok_or_else(|| MutationError::InconsistentGenome(format!("no terminal of type {}", ty)))
}

/// Replace one terminal by another value of the same type.
pub fn mut_replace_terminal<R: Rng>(
    genome: &Genome,
    pset: &PrimitiveSet,
    rng: &mut R,
) -> Result<Genome, MutationError> {
    let has_alternative = |node: &TypedNode| {
        pset.terminals(node.ret())
            .iter()
            .any(|t| t.name != node.name())
    };
    let eligible: Vec<usize> = genome
        .iter()
        .enumerate()
        .filter(|(_, node)| node.is_terminal() && has_alternative(node))
        .map(|(i, _)| i)
        .collect();

    let &to_change = eligible.choose(rng).ok_or(MutationError::NoEligibleTerminal)?;
    let current = &genome.nodes()[to_change];
    let alternatives: Vec<&Arc<Terminal>> = pset
        .terminals(current.ret())
        .iter()
        .filter(|t| t.name != current.name())
        .collect();
    let replacement = alternatives
        .choose(rng)
        .map(|t| Arc::clone(t))
        .ok_or(MutationError::NoEligibleTerminal)?;

    let mut nodes = genome.nodes().to_vec();
    nodes[to_change] = TypedNode::Terminal(replacement);
    Ok(Genome::new(nodes))
}

/// Replace one primitive by another with the same return type, regenerating
/// its hyperparameter terminals. The data subtree is kept as is.
pub fn mut_replace_primitive<R: Rng>(
    genome: &Genome,
    pset: &PrimitiveSet,
    rng: &mut R,
) -> Result<Genome, MutationError> {
    let eligible: Vec<usize> = genome
        .iter()
        .enumerate()
        .filter_map(|(i, node)| {
            let p = node.as_primitive()?;
            (pset.primitives(&p.ret).len() > 1).then_some(i)
        })
        .collect();

    let &to_change = eligible.choose(rng).ok_or(MutationError::NoEligiblePrimitive)?;
    let old = genome.nodes()[to_change]
        .as_primitive()
        .ok_or(MutationError::NoEligiblePrimitive)?;

    let alternatives: Vec<&Arc<Primitive>> = pset
        .primitives(&old.ret)
        .iter()
        .filter(|p| p.name != old.name)
        .collect();
    let new_primitive = alternatives
        .choose(rng)
        .map(|p| Arc::clone(p))
        .ok_or(MutationError::NoEligiblePrimitive)?;

    let new_terminals = new_primitive
        .hyperparameter_types()
        .iter()
        .map(|ty| random_terminal(pset, ty, rng))
        .collect::<Result<Vec<_>, _>>()?;

    replace_primitive_at(genome, to_change, new_primitive, new_terminals)
}

/// Splice `new_primitive` and its terminals in place of the primitive at `position`.
pub(crate) fn replace_primitive_at(
    genome: &Genome,
    position: usize,
    new_primitive: Arc<Primitive>,
    new_terminals: Vec<Arc<Terminal>>,
) -> Result<Genome, MutationError> {
    let nodes = genome.nodes();
    let old = nodes[position]
        .as_primitive()
        .ok_or_else(|| MutationError::InconsistentGenome(format!("no primitive at {}", position)))?;
    let n_removed = old.hyperparameter_types().len();
    let new_terminals = new_terminals.into_iter().map(TypedNode::Terminal);

    let mut new_nodes: Vec<TypedNode> = match find_unmatched_terminal(&nodes[position + 1..]) {
        None if n_removed == 0 => {
            // The old primitive's subtree runs to the end of the genome.
            nodes.iter().cloned().chain(new_terminals).collect()
        }
        None => {
            return Err(MutationError::InconsistentGenome(format!(
                "no unmatched terminal after {} which had {} hyperparameters: {}",
                old.name, n_removed, genome
            )));
        }
        Some(offset) => {
            let mut start = position + 1 + offset;
            // The data input is the leaf of the kept subtree, not a hyperparameter.
            if nodes[start]
                .as_terminal()
                .is_some_and(|t| t.is_data_input())
            {
                start += 1;
            }
            if start + n_removed > nodes.len() {
                return Err(MutationError::InconsistentGenome(format!(
                    "{} expects {} hyperparameters past the end of {}",
                    old.name, n_removed, genome
                )));
            }
            nodes[..start]
                .iter()
                .cloned()
                .chain(new_terminals)
                .chain(nodes[start + n_removed..].iter().cloned())
                .collect()
        }
    };
    new_nodes[position] = TypedNode::Primitive(new_primitive);
    Ok(Genome::new(new_nodes))
}

/// Wrap a random subtree in a new primitive that takes and returns its type.
pub fn mut_insert<R: Rng>(
    genome: &Genome,
    pset: &PrimitiveSet,
    rng: &mut R,
) -> Result<Genome, MutationError> {
    let eligible: Vec<usize> = genome
        .iter()
        .enumerate()
        .filter(|(_, node)| !pset.primitives_wrapping(node.ret()).is_empty())
        .map(|(i, _)| i)
        .collect();

    let &index = eligible.choose(rng).ok_or(MutationError::NoInsertionPoint)?;
    let ty = genome.nodes()[index].ret().clone();
    let candidates = pset.primitives_wrapping(&ty);
    let new_primitive = candidates
        .choose(rng)
        .cloned()
        .ok_or(MutationError::NoInsertionPoint)?;
    let slots: Vec<usize> = new_primitive
        .args
        .iter()
        .enumerate()
        .filter(|(_, arg)| **arg == ty)
        .map(|(i, _)| i)
        .collect();
    let &position = slots.choose(rng).ok_or(MutationError::NoInsertionPoint)?;

    let span = genome.subtree(index);
    let mut subtree = vec![TypedNode::Primitive(Arc::clone(&new_primitive))];
    for (i, arg) in new_primitive.args.iter().enumerate() {
        if i == position {
            subtree.extend(genome.nodes()[span.clone()].iter().cloned());
        } else {
            subtree.push(TypedNode::Terminal(random_terminal(pset, arg, rng)?));
        }
    }

    let nodes = genome.nodes();
    let new_nodes = nodes[..span.start]
        .iter()
        .cloned()
        .chain(subtree)
        .chain(nodes[span.end..].iter().cloned())
        .collect();
    Ok(Genome::new(new_nodes))
}

/// Replace a non-root primitive by one of its same-typed argument subtrees.
pub fn mut_shrink<R: Rng>(genome: &Genome, rng: &mut R) -> Result<Genome, MutationError> {
    if genome.len() < 3 {
        return Err(MutationError::NoShrinkTarget);
    }

    let eligible: Vec<usize> = genome
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, node)| {
            let p = node.as_primitive()?;
            p.args.contains(&p.ret).then_some(i)
        })
        .collect();

    let &index = eligible.choose(rng).ok_or(MutationError::NoShrinkTarget)?;
    let primitive = genome.nodes()[index]
        .as_primitive()
        .ok_or(MutationError::NoShrinkTarget)?;
    let slots: Vec<usize> = primitive
        .args
        .iter()
        .enumerate()
        .filter(|(_, arg)| **arg == primitive.ret)
        .map(|(i, _)| i)
        .collect();
    let &arg_idx = slots.choose(rng).ok_or(MutationError::NoShrinkTarget)?;

    let children = genome.children(index);
    let &child = children.get(arg_idx).ok_or_else(|| {
        MutationError::InconsistentGenome(format!("{} is missing argument {}", primitive.name, arg_idx))
    })?;
    let kept = genome.subtree(child);
    let span = genome.subtree(index);

    let nodes = genome.nodes();
    let new_nodes = nodes[..span.start]
        .iter()
        .chain(&nodes[kept])
        .chain(&nodes[span.end..])
        .cloned()
        .collect();
    Ok(Genome::new(new_nodes))
}

/// Mutations that are structurally possible for this genome.
pub fn available_mutations(genome: &Genome) -> Vec<MutationKind> {
    let mut available = vec![MutationKind::ReplacePrimitive, MutationKind::Insert];
    if genome.primitive_count() > 1 {
        available.push(MutationKind::Shrink);
    }
    // The data input is always present but never replaceable.
    if genome.terminal_count() > 1 {
        available.push(MutationKind::ReplaceTerminal);
    }
    available
}

pub fn apply_mutation<R: Rng>(
    kind: MutationKind,
    genome: &Genome,
    pset: &PrimitiveSet,
    rng: &mut R,
) -> Result<Genome, MutationError> {
    match kind {
        MutationKind::ReplaceTerminal => mut_replace_terminal(genome, pset, rng),
        MutationKind::ReplacePrimitive => mut_replace_primitive(genome, pset, rng),
        MutationKind::Insert => mut_insert(genome, pset, rng),
        MutationKind::Shrink => mut_shrink(genome, rng),
    }
}

/// Apply one uniformly chosen legal mutation and report which one fired.
pub fn random_valid_mutation<R: Rng>(
    genome: &Genome,
    pset: &PrimitiveSet,
    rng: &mut R,
) -> Result<(Genome, MutationKind), MutationError> {
    let available = available_mutations(genome);
    let &kind = available
        .choose(rng)
        .ok_or(MutationError::NoEligiblePrimitive)?;
    apply_mutation(kind, genome, pset, rng).map(|g| (g, kind))
}
