use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::types::Value;

/// Keyword arguments bound to an operator at compile time.
pub type Params = BTreeMap<String, Value>;

/// Validity predicate over the bound arguments of one operator.
pub type ParamCheck = Arc<dyn Fn(&Params) -> bool + Send + Sync>;

/// An instantiated pipeline step.
///
/// The search never looks inside a component; evaluators downcast through
/// `as_any` to the concrete types their catalog produces.
pub trait Component: Send + Sync + fmt::Debug {
    /// Name of the operator this component was built from.
    fn operator(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// Builds a component from bound hyperparameters.
pub trait OperatorFactory: Send + Sync {
    fn instantiate(&self, params: &Params) -> anyhow::Result<Arc<dyn Component>>;
}

impl<F> OperatorFactory for F
where
    F: Fn(&Params) -> anyhow::Result<Arc<dyn Component>> + Send + Sync,
{
    fn instantiate(&self, params: &Params) -> anyhow::Result<Arc<dyn Component>> {
        self(params)
    }
}
