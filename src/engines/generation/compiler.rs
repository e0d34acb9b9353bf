use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use thiserror::Error;

use super::genome::{Genome, TypedNode};
use crate::functions::{Component, Params, PrimitiveSet};
use crate::types::NodeType;

/// Why a genome could not be turned into a pipeline. Never fatal: the
/// candidate is simply skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Uncompilable {
    #[error("genome is empty")]
    Empty,

    #[error("pipeline root returns {0}, expected Predictions")]
    RootType(NodeType),

    #[error("{primitive} returns {found} inside the pipeline, expected Data")]
    IntermediateType { primitive: String, found: NodeType },

    #[error("missing {expected}-terminal for {primitive}")]
    MissingTerminal {
        primitive: String,
        expected: NodeType,
    },

    #[error("terminal {0} appears before the end of the pipeline")]
    StrayTerminal(String),

    #[error("pipeline has no data input")]
    MissingInput,

    #[error("{0} rejected its bound arguments")]
    ParameterCheck(String),

    #[error("no factory registered for {0}")]
    UnknownOperator(String),

    #[error("failed to instantiate {operator}: {message}")]
    Instantiation { operator: String, message: String },
}

/// One instantiated step of a compiled pipeline.
#[derive(Clone)]
pub struct PipelineStep {
    pub name: String,
    pub operator: String,
    pub params: Params,
    pub component: Arc<dyn Component>,
}

impl PipelineStep {
    /// A fixed step supplied from outside the genome.
    pub fn fixed(name: impl Into<String>, component: Arc<dyn Component>) -> Self {
        Self {
            name: name.into(),
            operator: component.operator().to_string(),
            params: Params::new(),
            component,
        }
    }
}

impl fmt::Debug for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStep")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Sequential pipeline, innermost step first.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PipelineStep> {
        self.steps.iter()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Turns genomes into pipelines against a fixed primitive set.
#[derive(Clone)]
pub struct Compiler {
    pset: Arc<PrimitiveSet>,
    preprocessing: Vec<PipelineStep>,
}

impl Compiler {
    pub fn new(pset: Arc<PrimitiveSet>) -> Self {
        Self {
            pset,
            preprocessing: Vec::new(),
        }
    }

    /// Steps placed ahead of every compiled pipeline.
    pub fn with_preprocessing(mut self, steps: Vec<PipelineStep>) -> Self {
        self.preprocessing = steps;
        self
    }

    pub fn pset(&self) -> &Arc<PrimitiveSet> {
        &self.pset
    }

    /// Compile a genome; the same genome always yields the same step layout.
    ///
    /// The outermost primitive is read first. Its hyperparameters are the last
    /// nodes of the remaining sequence, matched back to front against its
    /// argument types; they are then dropped and the next primitive is read.
    pub fn compile(&self, genome: &Genome) -> Result<Pipeline, Uncompilable> {
        let mut remaining = genome.nodes();
        let mut components = Vec::new();
        let mut name_counter: HashMap<&str, usize> = HashMap::new();
        let mut saw_input = false;

        while let Some((head, rest)) = remaining.split_first() {
            let primitive = match head {
                TypedNode::Terminal(t) => {
                    if !rest.is_empty() || !t.is_data_input() {
                        return Err(Uncompilable::StrayTerminal(t.name.clone()));
                    }
                    saw_input = true;
                    break;
                }
                TypedNode::Primitive(p) => p,
            };

            if components.is_empty() {
                if primitive.ret != NodeType::Prediction {
                    return Err(Uncompilable::RootType(primitive.ret.clone()));
                }
            } else if primitive.ret != NodeType::Data {
                return Err(Uncompilable::IntermediateType {
                    primitive: primitive.name.clone(),
                    found: primitive.ret.clone(),
                });
            }

            let required = primitive.hyperparameter_types();
            if rest.len() < required.len() {
                return Err(Uncompilable::MissingTerminal {
                    primitive: primitive.name.clone(),
                    expected: required[required.len() - rest.len() - 1].clone(),
                });
            }

            let mut params = Params::new();
            for (expected, provided) in required.iter().rev().zip(rest.iter().rev()) {
                let bound = match provided {
                    TypedNode::Terminal(t) if &t.ret == expected => {
                        t.value.clone().map(|v| (t.argument_name(), v))
                    }
                    _ => None,
                };
                let Some((name, value)) = bound else {
                    return Err(Uncompilable::MissingTerminal {
                        primitive: primitive.name.clone(),
                        expected: expected.clone(),
                    });
                };
                params.insert(name.to_string(), value);
            }

            if let Some(check) = self.pset.parameter_check(&primitive.name) {
                if !check(&params) {
                    return Err(Uncompilable::ParameterCheck(primitive.name.clone()));
                }
            }

            let factory = self
                .pset
                .factory(&primitive.name)
                .ok_or_else(|| Uncompilable::UnknownOperator(primitive.name.clone()))?;
            let component = factory.instantiate(&params).map_err(|e| {
                debug!("Instantiating {} failed: {:#}", primitive.name, e);
                Uncompilable::Instantiation {
                    operator: primitive.name.clone(),
                    message: e.to_string(),
                }
            })?;

            // Each step needs a unique name.
            let counter = name_counter.entry(primitive.name.as_str()).or_insert(0);
            let name = format!("{}{}", primitive.name, counter);
            *counter += 1;

            components.push(PipelineStep {
                name,
                operator: primitive.name.clone(),
                params,
                component,
            });
            remaining = &rest[..rest.len() - required.len()];
        }

        if components.is_empty() {
            return Err(Uncompilable::Empty);
        }
        if !saw_input {
            return Err(Uncompilable::MissingInput);
        }

        let steps = self
            .preprocessing
            .iter()
            .cloned()
            .chain(components.into_iter().rev())
            .collect();
        Ok(Pipeline::new(steps))
    }
}
