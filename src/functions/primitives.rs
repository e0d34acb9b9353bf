use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use super::registry::{Domain, OperatorCatalog};
use super::traits::{OperatorFactory, ParamCheck};
use crate::error::{PipevoError, Result};
use crate::types::{Capability, NodeType, Value};

/// Name of the terminal standing in for the pipeline's input data.
pub const DATA_INPUT: &str = "data";

/// A typed operator node. The first argument is always the data subtree.
#[derive(Debug, PartialEq)]
pub struct Primitive {
    pub name: String,
    pub args: Vec<NodeType>,
    pub ret: NodeType,
    pub capability: Capability,
}

impl Primitive {
    /// Argument types excluding the leading data argument.
    pub fn hyperparameter_types(&self) -> &[NodeType] {
        &self.args[1..]
    }
}

/// A typed leaf. `value` is `None` only for the data input terminal.
#[derive(Debug, PartialEq)]
pub struct Terminal {
    pub name: String,
    pub ret: NodeType,
    pub value: Option<Value>,
}

impl Terminal {
    pub fn is_data_input(&self) -> bool {
        self.value.is_none()
    }

    /// Keyword the terminal binds to: `Op.alpha=0.1` and `alpha=0.1` both give `alpha`.
    /// Names never hold `=`, so the first one ends the keyword even when a
    /// text value contains more.
    pub fn argument_name(&self) -> &str {
        let equal_idx = self.name.find('=').unwrap_or(self.name.len());
        let start = self.name[..equal_idx].rfind('.').map_or(0, |i| i + 1);
        &self.name[start..equal_idx]
    }
}

/// Typed primitive set built once from an [`OperatorCatalog`].
pub struct PrimitiveSet {
    primitives: BTreeMap<NodeType, Vec<Arc<Primitive>>>,
    terminals: BTreeMap<NodeType, Vec<Arc<Terminal>>>,
    data_input: Arc<Terminal>,
    parameter_checks: HashMap<String, ParamCheck>,
    factories: HashMap<String, Arc<dyn OperatorFactory>>,
}

impl PrimitiveSet {
    pub fn from_catalog(catalog: &OperatorCatalog) -> Result<Self> {
        let data_input = Arc::new(Terminal {
            name: DATA_INPUT.to_string(),
            ret: NodeType::Data,
            value: None,
        });

        let mut pset = Self {
            primitives: BTreeMap::new(),
            terminals: BTreeMap::new(),
            data_input: Arc::clone(&data_input),
            parameter_checks: HashMap::new(),
            factories: HashMap::new(),
        };
        pset.terminals
            .entry(NodeType::Data)
            .or_default()
            .push(data_input);

        // Shared hyperparameters come first so operators can refer to them.
        let mut shared_types = HashMap::new();
        for (name, values) in catalog.shared() {
            if values.is_empty() {
                return Err(PipevoError::Catalog(format!(
                    "Shared hyperparameter '{}' has no values",
                    name
                )));
            }
            let ty = NodeType::hyperparameter(name);
            for value in values {
                pset.add_terminal(format!("{}={}", name, value), ty.clone(), value.clone());
            }
            shared_types.insert(name.clone(), ty);
        }

        let mut seen = HashSet::new();
        for operator in catalog.operators() {
            if !seen.insert(operator.name.clone()) {
                return Err(PipevoError::Catalog(format!(
                    "Operator '{}' is registered twice",
                    operator.name
                )));
            }

            let mut hyperparameters: Vec<_> = operator.hyperparameters.iter().collect();
            hyperparameters.sort_by(|a, b| a.name.cmp(&b.name));

            let mut args = vec![NodeType::Data];
            for hp in hyperparameters {
                let ty = match &hp.domain {
                    Domain::Shared => shared_types.get(&hp.name).cloned().ok_or_else(|| {
                        PipevoError::Catalog(format!(
                            "Operator '{}' uses unknown shared hyperparameter '{}'",
                            operator.name, hp.name
                        ))
                    })?,
                    Domain::Values(values) => {
                        if values.is_empty() {
                            return Err(PipevoError::Catalog(format!(
                                "Hyperparameter '{}.{}' has no values",
                                operator.name, hp.name
                            )));
                        }
                        let ty = NodeType::hyperparameter(&format!("{}.{}", operator.name, hp.name));
                        for value in values {
                            pset.add_terminal(
                                format!("{}.{}={}", operator.name, hp.name, value),
                                ty.clone(),
                                value.clone(),
                            );
                        }
                        ty
                    }
                };
                args.push(ty);
            }

            if let Some(check) = &operator.param_check {
                pset.parameter_checks
                    .insert(operator.name.clone(), Arc::clone(check));
            }
            pset.factories
                .insert(operator.name.clone(), Arc::clone(&operator.factory));

            let ret = operator.capability.return_type();
            debug!("Registered primitive {} with {} arguments", operator.name, args.len());
            pset.primitives.entry(ret.clone()).or_default().push(Arc::new(Primitive {
                name: operator.name.clone(),
                args,
                ret,
                capability: operator.capability,
            }));
        }

        if pset.primitives(&NodeType::Prediction).is_empty() {
            return Err(PipevoError::Catalog(
                "Catalog needs at least one operator producing predictions".to_string(),
            ));
        }

        Ok(pset)
    }

    fn add_terminal(&mut self, name: String, ret: NodeType, value: Value) {
        self.terminals.entry(ret.clone()).or_default().push(Arc::new(Terminal {
            name,
            ret,
            value: Some(value),
        }));
    }

    /// Primitives returning `ret`, in catalog order.
    pub fn primitives(&self, ret: &NodeType) -> &[Arc<Primitive>] {
        self.primitives.get(ret).map_or(&[], Vec::as_slice)
    }

    /// Terminals of type `ret`, in registration order.
    pub fn terminals(&self, ret: &NodeType) -> &[Arc<Terminal>] {
        self.terminals.get(ret).map_or(&[], Vec::as_slice)
    }

    /// Primitives returning `ty` that also accept `ty` as an argument.
    pub fn primitives_wrapping(&self, ty: &NodeType) -> Vec<Arc<Primitive>> {
        self.primitives(ty)
            .iter()
            .filter(|p| p.args.contains(ty))
            .cloned()
            .collect()
    }

    pub fn data_input(&self) -> &Arc<Terminal> {
        &self.data_input
    }

    pub fn parameter_check(&self, operator: &str) -> Option<&ParamCheck> {
        self.parameter_checks.get(operator)
    }

    pub fn factory(&self, operator: &str) -> Option<&Arc<dyn OperatorFactory>> {
        self.factories.get(operator)
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for PrimitiveSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveSet")
            .field("primitives", &self.primitives)
            .field("terminals", &self.terminals.values().map(Vec::len).sum::<usize>())
            .field("parameter_checks", &self.parameter_checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::registry::OperatorSpec;
    use crate::functions::test_support::{noop_factory, sample_catalog, sample_pset};

    #[test]
    fn test_primitive_argument_types() {
        let pset = sample_pset();
        let scale = pset
            .primitives(&NodeType::Data)
            .iter()
            .find(|p| p.name == "Scale")
            .cloned()
            .unwrap();

        // Hyperparameters are sorted by name; `shift` is shared.
        assert_eq!(
            scale.args,
            vec![
                NodeType::Data,
                NodeType::hyperparameter("Scale.factor"),
                NodeType::hyperparameter("shift"),
            ]
        );
        assert_eq!(scale.ret, NodeType::Data);
    }

    #[test]
    fn test_terminals_registered_per_value() {
        let pset = sample_pset();
        let factors = pset.terminals(&NodeType::hyperparameter("Scale.factor"));
        assert_eq!(factors.len(), 3);
        assert_eq!(factors[0].name, "Scale.factor=0.5");
        assert_eq!(pset.terminals(&NodeType::Data).len(), 1);
        assert!(pset.terminals(&NodeType::Data)[0].is_data_input());
    }

    #[test]
    fn test_shared_type_is_reused() {
        let pset = sample_pset();
        let users: Vec<_> = pset
            .primitives(&NodeType::Data)
            .iter()
            .chain(pset.primitives(&NodeType::Prediction))
            .filter(|p| p.args.contains(&NodeType::hyperparameter("shift")))
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(users, vec!["Scale".to_string(), "Offset".to_string()]);
    }

    #[test]
    fn test_param_check_stored_out_of_band() {
        let pset = sample_pset();
        assert!(pset.parameter_check("Linear").is_some());
        assert!(pset.parameter_check("Scale").is_none());
        // Predicates never become terminals.
        assert!(pset
            .terminals(&NodeType::hyperparameter("Linear.param_check"))
            .is_empty());
    }

    #[test]
    fn test_argument_name_extraction() {
        let private = Terminal {
            name: "Linear.slope=0.5".into(),
            ret: NodeType::hyperparameter("Linear.slope"),
            value: Some(Value::Float(0.5)),
        };
        let shared = Terminal {
            name: "shift=1.5".into(),
            ret: NodeType::hyperparameter("shift"),
            value: Some(Value::Float(1.5)),
        };
        assert_eq!(private.argument_name(), "slope");
        assert_eq!(shared.argument_name(), "shift");
    }

    #[test]
    fn test_text_values_with_separators_bind_by_name() {
        let text = Terminal {
            name: "Encode.mode='a=b'".into(),
            ret: NodeType::hyperparameter("Encode.mode"),
            value: Some(Value::Text("a=b".into())),
        };
        assert_eq!(text.argument_name(), "mode");

        let mut catalog = sample_catalog();
        catalog.register(
            OperatorSpec::new("Encode", Capability::ProducesData, noop_factory("Encode"))
                .with_values("mode", ["a=b", "x.y=z", "plain"]),
        );
        let pset = PrimitiveSet::from_catalog(&catalog).unwrap();
        let terminals = pset.terminals(&NodeType::hyperparameter("Encode.mode"));
        assert_eq!(terminals.len(), 3);
        assert!(terminals.iter().all(|t| t.argument_name() == "mode"));
    }

    #[test]
    fn test_unknown_shared_hyperparameter_rejected() {
        let mut catalog = sample_catalog();
        catalog.register(
            OperatorSpec::new("Broken", Capability::ProducesData, noop_factory("Broken"))
                .with_shared("missing"),
        );
        assert!(matches!(
            PrimitiveSet::from_catalog(&catalog),
            Err(PipevoError::Catalog(_))
        ));
    }

    #[test]
    fn test_catalog_without_predictor_rejected() {
        let mut catalog = OperatorCatalog::new();
        catalog.register(
            OperatorSpec::new("Scale", Capability::ProducesData, noop_factory("Scale"))
                .with_values("factor", [1.0, 2.0]),
        );
        assert!(PrimitiveSet::from_catalog(&catalog).is_err());
    }
}
