//! Numeric operators over `f64` samples: a small ready-made catalog for
//! symbolic regression style searches.

use std::any::Any;
use std::sync::Arc;

use anyhow::{anyhow, bail};

use super::registry::{OperatorCatalog, OperatorSpec};
use super::traits::{Component, Params};
use crate::engines::generation::compiler::Pipeline;
use crate::types::Capability;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericOp {
    /// `x * factor + shift`
    Affine { factor: f64, shift: f64 },
    /// `x^exponent`
    Power(i32),
    /// `|x|`
    Abs,
    /// Final step: `slope * x + intercept`.
    Linear { slope: f64, intercept: f64 },
    /// Final step: the input as is.
    Identity,
}

#[derive(Debug, Clone)]
pub struct NumericStep {
    operator: String,
    op: NumericOp,
}

impl NumericStep {
    pub fn new(operator: impl Into<String>, op: NumericOp) -> Self {
        Self {
            operator: operator.into(),
            op,
        }
    }

    pub fn op(&self) -> NumericOp {
        self.op
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self.op {
            NumericOp::Affine { factor, shift } => x * factor + shift,
            NumericOp::Power(exponent) => x.powi(exponent),
            NumericOp::Abs => x.abs(),
            NumericOp::Linear { slope, intercept } => slope * x + intercept,
            NumericOp::Identity => x,
        }
    }
}

impl Component for NumericStep {
    fn operator(&self) -> &str {
        &self.operator
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn float(params: &Params, name: &str) -> anyhow::Result<f64> {
    params
        .get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow!("missing numeric argument '{}'", name))
}

fn step(operator: &str, op: NumericOp) -> anyhow::Result<Arc<dyn Component>> {
    Ok(Arc::new(NumericStep::new(operator, op)))
}

/// Catalog of the numeric operators. `shift` is shared by `Scale` and `Offset`.
pub fn numeric_catalog() -> OperatorCatalog {
    let mut catalog = OperatorCatalog::new();
    catalog
        .register_shared("shift", [-1.0, 0.0, 0.5, 1.0])
        .register(
            OperatorSpec::new("Scale", Capability::ProducesData, |p: &Params| {
                step(
                    "Scale",
                    NumericOp::Affine {
                        factor: float(p, "factor")?,
                        shift: float(p, "shift")?,
                    },
                )
            })
            .with_values("factor", [0.5, 2.0, 3.0])
            .with_shared("shift"),
        )
        .register(
            OperatorSpec::new("Offset", Capability::ProducesData, |p: &Params| {
                step(
                    "Offset",
                    NumericOp::Affine {
                        factor: 1.0,
                        shift: float(p, "shift")?,
                    },
                )
            })
            .with_shared("shift"),
        )
        .register(
            OperatorSpec::new("Power", Capability::ProducesData, |p: &Params| {
                let exponent = p
                    .get("exponent")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| anyhow!("missing integer argument 'exponent'"))?;
                step("Power", NumericOp::Power(i32::try_from(exponent)?))
            })
            .with_values("exponent", [2_i64, 3]),
        )
        .register(OperatorSpec::new("Abs", Capability::ProducesData, |_: &Params| {
            step("Abs", NumericOp::Abs)
        }))
        .register(
            OperatorSpec::new("Linear", Capability::ProducesPrediction, |p: &Params| {
                step(
                    "Linear",
                    NumericOp::Linear {
                        slope: float(p, "slope")?,
                        intercept: float(p, "intercept")?,
                    },
                )
            })
            .with_values("slope", [-1.0, 0.0, 0.5, 1.0, 2.0])
            .with_values("intercept", [0.0, 1.0, 2.0])
            // A flat line is never worth evaluating.
            .with_param_check(|p| p.get("slope").and_then(|v| v.as_f64()) != Some(0.0)),
        )
        .register(OperatorSpec::new(
            "Identity",
            Capability::ProducesPrediction,
            |_: &Params| step("Identity", NumericOp::Identity),
        ));
    catalog
}

/// Run a compiled numeric pipeline over `xs`, innermost step first.
pub fn predict(pipeline: &Pipeline, xs: &[f64]) -> anyhow::Result<Vec<f64>> {
    let steps = pipeline
        .iter()
        .map(|s| {
            s.component
                .as_any()
                .downcast_ref::<NumericStep>()
                .ok_or_else(|| anyhow!("step {} is not a numeric operator", s.name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(xs
        .iter()
        .map(|&x| steps.iter().fold(x, |acc, step| step.apply(acc)))
        .collect())
}

/// Negative mean squared error of the pipeline's predictions against `ys`.
pub fn negative_mse(pipeline: &Pipeline, xs: &[f64], ys: &[f64]) -> anyhow::Result<f64> {
    if xs.len() != ys.len() || xs.is_empty() {
        bail!("need equally many, non-zero, inputs and targets");
    }
    let predictions = predict(pipeline, xs)?;
    let mse = predictions
        .iter()
        .zip(ys)
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / ys.len() as f64;
    if !mse.is_finite() {
        bail!("predictions diverged");
    }
    Ok(-mse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::compiler::Compiler;
    use crate::engines::generation::genome::{Genome, TypedNode};
    use crate::functions::PrimitiveSet;
    use crate::types::NodeType;

    fn node(pset: &PrimitiveSet, name: &str) -> TypedNode {
        let primitive = pset
            .primitives(&NodeType::Data)
            .iter()
            .chain(pset.primitives(&NodeType::Prediction))
            .find(|p| p.name == name)
            .cloned();
        if let Some(p) = primitive {
            return TypedNode::Primitive(p);
        }
        let ty = name.split('=').next().unwrap_or(name);
        pset.terminals(&NodeType::hyperparameter(ty))
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .map(TypedNode::Terminal)
            .unwrap_or_else(|| panic!("unknown node {}", name))
    }

    #[test]
    fn test_exact_pipeline_scores_zero() {
        let pset = Arc::new(PrimitiveSet::from_catalog(&numeric_catalog()).unwrap());
        // Linear(Power(data, 2), intercept=1, slope=2) computes 2x^2 + 1.
        let genome = Genome::new(vec![
            node(&pset, "Linear"),
            node(&pset, "Power"),
            TypedNode::Terminal(Arc::clone(pset.data_input())),
            node(&pset, "Power.exponent=2"),
            node(&pset, "Linear.intercept=1.0"),
            node(&pset, "Linear.slope=2.0"),
        ]);
        let pipeline = Compiler::new(Arc::clone(&pset)).compile(&genome).unwrap();

        let xs = [-1.0, 0.0, 2.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x * x + 1.0).collect();
        assert_eq!(predict(&pipeline, &xs).unwrap(), ys);
        assert_eq!(negative_mse(&pipeline, &xs, &ys).unwrap(), 0.0);
    }

    #[test]
    fn test_empty_samples_rejected() {
        assert!(negative_mse(&Pipeline::default(), &[], &[]).is_err());
    }
}
