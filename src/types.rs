use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What an operator produces, declared by the catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ProducesData,
    ProducesPrediction,
}

impl Capability {
    /// Return type of a primitive built from an operator with this capability.
    pub fn return_type(self) -> NodeType {
        match self {
            Capability::ProducesData => NodeType::Data,
            Capability::ProducesPrediction => NodeType::Prediction,
        }
    }
}

/// Nominal type of a genome node.
///
/// Hyperparameter types are keyed by name: `Operator.param` for private
/// hyperparameters, the bare parameter name for shared ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Data,
    Prediction,
    Hyperparameter(Arc<str>),
}

impl NodeType {
    pub fn hyperparameter(key: &str) -> Self {
        NodeType::Hyperparameter(Arc::from(key))
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Data => write!(f, "Data"),
            NodeType::Prediction => write!(f, "Predictions"),
            NodeType::Hyperparameter(key) => write!(f, "{}", key),
        }
    }
}

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

// Text is quoted so that terminal names stay unambiguous in canonical strings.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Text(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
