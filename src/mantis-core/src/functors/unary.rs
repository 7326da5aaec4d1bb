//! Unary builtin functions.

use common_error::{MantisError, MantisResult};
use serde::{Deserialize, Serialize};

/// A stateless cell-wise unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryFunction {
    Sqrt,
    Abs,
    Exp,
    Log,
    Round,
    Floor,
    Ceil,
    Negate,
    Not,
}

impl UnaryFunction {
    /// Instruction opcode.
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Negate => "uminus",
            Self::Not => "!",
        }
    }

    /// Parse an opcode.
    pub fn from_opcode(opcode: &str) -> MantisResult<Self> {
        Ok(match opcode {
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "uminus" => Self::Negate,
            "!" => Self::Not,
            other => {
                return Err(MantisError::invalid_parameter(format!(
                    "unknown unary opcode '{other}'"
                )));
            }
        })
    }

    /// Check if `f(0) == 0`.
    pub const fn is_sparse_safe(&self) -> bool {
        matches!(
            self,
            Self::Sqrt | Self::Abs | Self::Round | Self::Floor | Self::Ceil | Self::Negate
        )
    }

    /// Check if the function keeps integer inputs integral.
    pub const fn preserves_int(&self) -> bool {
        matches!(
            self,
            Self::Abs | Self::Round | Self::Floor | Self::Ceil | Self::Negate
        )
    }

    /// Apply to one value.
    ///
    /// With `strict` set, inputs outside the function's domain fail with a
    /// `DomainError` instead of yielding NaN.
    pub fn execute(&self, v: f64, strict: bool) -> MantisResult<f64> {
        let out = match self {
            Self::Sqrt => {
                if strict && v < 0.0 {
                    return Err(MantisError::domain(format!("sqrt of negative value {v}")));
                }
                v.sqrt()
            }
            Self::Log => {
                if strict && v < 0.0 {
                    return Err(MantisError::domain(format!("log of negative value {v}")));
                }
                v.ln()
            }
            Self::Abs => v.abs(),
            Self::Exp => v.exp(),
            Self::Round => v.round(),
            Self::Floor => v.floor(),
            Self::Ceil => v.ceil(),
            Self::Negate => -v,
            Self::Not => {
                if v == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        Ok(out)
    }
}

impl std::fmt::Display for UnaryFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.opcode())
    }
}
