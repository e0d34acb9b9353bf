//! Small catalog shared by unit tests.

use std::any::Any;
use std::sync::Arc;

use super::primitives::PrimitiveSet;
use super::registry::{OperatorCatalog, OperatorSpec};
use super::traits::{Component, Params};
use crate::types::Capability;

#[derive(Debug, Clone)]
pub struct RecordedStep {
    pub operator: String,
    pub params: Params,
}

impl Component for RecordedStep {
    fn operator(&self) -> &str {
        &self.operator
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn noop_factory(
    name: &'static str,
) -> impl Fn(&Params) -> anyhow::Result<Arc<dyn Component>> + Send + Sync + 'static {
    move |params: &Params| -> anyhow::Result<Arc<dyn Component>> {
        Ok(Arc::new(RecordedStep {
            operator: name.to_string(),
            params: params.clone(),
        }))
    }
}

pub fn sample_catalog() -> OperatorCatalog {
    let mut catalog = OperatorCatalog::new();
    catalog
        .register_shared("shift", [0.0, 1.0, 2.0])
        .register(
            OperatorSpec::new("Scale", Capability::ProducesData, noop_factory("Scale"))
                .with_values("factor", [0.5, 2.0, 3.0])
                .with_shared("shift"),
        )
        .register(
            OperatorSpec::new("Offset", Capability::ProducesData, noop_factory("Offset"))
                .with_shared("shift"),
        )
        .register(OperatorSpec::new(
            "Square",
            Capability::ProducesData,
            noop_factory("Square"),
        ))
        .register(
            OperatorSpec::new("Linear", Capability::ProducesPrediction, noop_factory("Linear"))
                .with_values("slope", [0.5, 1.0, 2.0])
                .with_values("intercept", [0_i64, 1])
                .with_param_check(|params| {
                    // slope=2.0 with intercept=1 is declared illegal.
                    !(params.get("slope").and_then(|v| v.as_f64()) == Some(2.0)
                        && params.get("intercept").and_then(|v| v.as_i64()) == Some(1))
                }),
        )
        .register(OperatorSpec::new(
            "Mean",
            Capability::ProducesPrediction,
            noop_factory("Mean"),
        ));
    catalog
}

pub fn sample_pset() -> Arc<PrimitiveSet> {
    Arc::new(PrimitiveSet::from_catalog(&sample_catalog()).expect("sample catalog is valid"))
}
