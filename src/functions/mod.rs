pub mod numeric;
pub mod primitives;
pub mod registry;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use numeric::{negative_mse, numeric_catalog, predict, NumericOp, NumericStep};
pub use primitives::{Primitive, PrimitiveSet, Terminal, DATA_INPUT};
pub use registry::{Domain, HyperparameterSpec, OperatorCatalog, OperatorSpec};
pub use traits::{Component, OperatorFactory, ParamCheck, Params};
