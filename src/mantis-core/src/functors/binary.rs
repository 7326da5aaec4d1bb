//! Binary value functions.

use common_error::{MantisError, MantisResult};
use serde::{Deserialize, Serialize};

use crate::types::{ScalarValue, ValueType};

/// A stateless cell-wise binary operator.
///
/// Value functions are plain `Copy` values; every plan node and instruction
/// that needs one stores its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueFunction {
    Plus,
    Minus,
    Multiply,
    Divide,
    Power,
    Modulus,
    IntDivide,
    Min,
    Max,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    And,
    Or,
}

impl ValueFunction {
    /// Instruction opcode for this function.
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Power => "^",
            Self::Modulus => "%%",
            Self::IntDivide => "%/%",
            Self::Min => "min",
            Self::Max => "max",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessThanEqual => "<=",
            Self::GreaterThanEqual => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Parse an opcode.
    pub fn from_opcode(opcode: &str) -> MantisResult<Self> {
        Ok(match opcode {
            "+" => Self::Plus,
            "-" => Self::Minus,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            "^" => Self::Power,
            "%%" => Self::Modulus,
            "%/%" => Self::IntDivide,
            "min" => Self::Min,
            "max" => Self::Max,
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "<" => Self::LessThan,
            ">" => Self::GreaterThan,
            "<=" => Self::LessThanEqual,
            ">=" => Self::GreaterThanEqual,
            "&&" => Self::And,
            "||" => Self::Or,
            other => {
                return Err(MantisError::invalid_parameter(format!(
                    "unknown binary opcode '{other}'"
                )));
            }
        })
    }

    /// Check if this function produces a boolean.
    pub const fn is_predicate(&self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::GreaterThan
                | Self::LessThanEqual
                | Self::GreaterThanEqual
                | Self::And
                | Self::Or
        )
    }

    /// Check if `f(0, 0) == 0`, which lets sparse-safe kernels skip zeros.
    pub const fn is_sparse_safe(&self) -> bool {
        matches!(
            self,
            Self::Plus | Self::Minus | Self::Multiply | Self::Min | Self::Max | Self::And | Self::Or
        )
    }

    /// Apply to two doubles.
    ///
    /// Division follows IEEE semantics: `x / 0` is infinite or NaN.
    pub fn execute(&self, a: f64, b: f64) -> f64 {
        match self {
            Self::Plus => a + b,
            Self::Minus => a - b,
            Self::Multiply => a * b,
            Self::Divide => a / b,
            Self::Power => a.powf(b),
            Self::Modulus => {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a - (a / b).floor() * b
                }
            }
            Self::IntDivide => (a / b).floor(),
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Equal => bool_to_f64(a == b),
            Self::NotEqual => bool_to_f64(a != b),
            Self::LessThan => bool_to_f64(a < b),
            Self::GreaterThan => bool_to_f64(a > b),
            Self::LessThanEqual => bool_to_f64(a <= b),
            Self::GreaterThanEqual => bool_to_f64(a >= b),
            Self::And => bool_to_f64(a != 0.0 && b != 0.0),
            Self::Or => bool_to_f64(a != 0.0 || b != 0.0),
        }
    }

    /// Output value type for the given operand value types.
    pub fn result_type(&self, left: ValueType, right: ValueType) -> ValueType {
        if self.is_predicate() {
            return ValueType::Boolean;
        }
        match (self, left, right) {
            (Self::Plus, ValueType::String, _) | (Self::Plus, _, ValueType::String) => {
                ValueType::String
            }
            (Self::Divide | Self::Power, _, _) => ValueType::Double,
            (_, ValueType::Int, ValueType::Int) => ValueType::Int,
            (_, ValueType::Boolean, ValueType::Int)
            | (_, ValueType::Int, ValueType::Boolean)
            | (_, ValueType::Boolean, ValueType::Boolean) => ValueType::Int,
            _ => ValueType::Double,
        }
    }

    /// Apply to two scalars.
    ///
    /// `Plus` concatenates when either side is a string. Integer inputs keep
    /// an integer result where the function is closed over integers.
    pub fn execute_scalar(&self, a: &ScalarValue, b: &ScalarValue) -> MantisResult<ScalarValue> {
        if let (Self::Plus, ScalarValue::String(_), _) | (Self::Plus, _, ScalarValue::String(_)) =
            (self, a, b)
        {
            return Ok(ScalarValue::String(format!("{a}{b}")));
        }
        let out_type = self.result_type(a.value_type(), b.value_type());
        if out_type == ValueType::Int {
            if let (Ok(x), Ok(y)) = (a.as_i64(), b.as_i64()) {
                if let Some(v) = self.execute_int(x, y) {
                    return Ok(ScalarValue::Int(v));
                }
            }
        }
        let value = self.execute(a.as_f64()?, b.as_f64()?);
        Ok(ScalarValue::from_f64(value, out_type))
    }

    fn execute_int(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            Self::Plus => a.checked_add(b),
            Self::Minus => a.checked_sub(b),
            Self::Multiply => a.checked_mul(b),
            Self::Min => Some(a.min(b)),
            Self::Max => Some(a.max(b)),
            Self::Modulus if b != 0 => Some(a.rem_euclid(b)),
            Self::IntDivide if b != 0 => Some(a.div_euclid(b)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.opcode())
    }
}

#[inline]
fn bool_to_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}
