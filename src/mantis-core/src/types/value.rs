//! Runtime scalar values.

use common_error::{MantisError, MantisResult};
use serde::{Deserialize, Serialize};

use super::ValueType;

/// A scalar literal or scalar result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Double(f64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
}

impl ScalarValue {
    /// Value type of this scalar.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::Boolean(_) => ValueType::Boolean,
            Self::String(_) => ValueType::String,
        }
    }

    /// Numeric view of this scalar. Booleans map to 0/1.
    pub fn as_f64(&self) -> MantisResult<f64> {
        match self {
            Self::Int(v) => Ok(*v as f64),
            Self::Double(v) => Ok(*v),
            Self::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::String(s) => Err(MantisError::type_error(format!(
                "expected numeric scalar, got string '{s}'"
            ))),
        }
    }

    /// Integer view of this scalar; doubles are truncated.
    pub fn as_i64(&self) -> MantisResult<i64> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Double(v) => Ok(*v as i64),
            Self::Boolean(b) => Ok(i64::from(*b)),
            Self::String(s) => Err(MantisError::type_error(format!(
                "expected integer scalar, got string '{s}'"
            ))),
        }
    }

    /// Boolean view of this scalar; numbers are true when non-zero.
    pub fn as_bool(&self) -> MantisResult<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            Self::Int(v) => Ok(*v != 0),
            Self::Double(v) => Ok(*v != 0.0),
            Self::String(s) => Err(MantisError::type_error(format!(
                "expected boolean scalar, got string '{s}'"
            ))),
        }
    }

    /// Convert a numeric result into a scalar of the given value type.
    pub fn from_f64(value: f64, value_type: ValueType) -> Self {
        match value_type {
            ValueType::Int => Self::Int(value as i64),
            ValueType::Boolean => Self::Boolean(value != 0.0),
            ValueType::Double | ValueType::String => Self::Double(value),
        }
    }

    /// Stable textual key, used for hashing literals.
    pub fn key(&self) -> String {
        match self {
            Self::Int(v) => format!("i:{v}"),
            Self::Double(v) => format!("d:{:016x}", v.to_bits()),
            Self::Boolean(b) => format!("b:{b}"),
            Self::String(s) => format!("s:{s}"),
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
