use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::traits::{Component, OperatorFactory, ParamCheck, Params};
use crate::types::{Capability, Value};

/// Legal values of one hyperparameter.
#[derive(Debug, Clone)]
pub enum Domain {
    Values(Vec<Value>),
    /// Draws from the catalog-wide shared hyperparameter of the same name.
    Shared,
}

#[derive(Debug, Clone)]
pub struct HyperparameterSpec {
    pub name: String,
    pub domain: Domain,
}

/// One catalog entry: an operator, its role and its hyperparameter domains.
#[derive(Clone)]
pub struct OperatorSpec {
    pub name: String,
    pub capability: Capability,
    pub hyperparameters: Vec<HyperparameterSpec>,
    pub param_check: Option<ParamCheck>,
    pub factory: Arc<dyn OperatorFactory>,
}

impl OperatorSpec {
    pub fn new<F>(name: impl Into<String>, capability: Capability, factory: F) -> Self
    where
        F: Fn(&Params) -> anyhow::Result<Arc<dyn Component>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            capability,
            hyperparameters: Vec::new(),
            param_check: None,
            factory: Arc::new(factory),
        }
    }

    pub fn with_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.hyperparameters.push(HyperparameterSpec {
            name: name.into(),
            domain: Domain::Values(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    pub fn with_shared(mut self, name: impl Into<String>) -> Self {
        self.hyperparameters.push(HyperparameterSpec {
            name: name.into(),
            domain: Domain::Shared,
        });
        self
    }

    pub fn with_param_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Params) -> bool + Send + Sync + 'static,
    {
        self.param_check = Some(Arc::new(check));
        self
    }
}

impl fmt::Debug for OperatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorSpec")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("hyperparameters", &self.hyperparameters)
            .field("param_check", &self.param_check.is_some())
            .finish()
    }
}

/// The external operator catalog the search space is built from.
#[derive(Debug, Clone, Default)]
pub struct OperatorCatalog {
    operators: Vec<OperatorSpec>,
    shared: BTreeMap<String, Vec<Value>>,
}

impl OperatorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operator: OperatorSpec) -> &mut Self {
        self.operators.push(operator);
        self
    }

    pub fn register_shared<I, V>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.shared
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn operators(&self) -> &[OperatorSpec] {
        &self.operators
    }

    pub fn shared(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.shared
    }

    pub fn get(&self, name: &str) -> Option<&OperatorSpec> {
        self.operators.iter().find(|op| op.name == name)
    }
}
