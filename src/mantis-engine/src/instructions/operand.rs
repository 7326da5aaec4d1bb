//! Typed instruction operands.

use mantis_core::{DataType, ScalarValue, ValueType};
use serde::{Deserialize, Serialize};

/// Prefix of compiler-generated temporaries.
pub const TEMP_PREFIX: &str = "_mVar";

/// A named, typed instruction operand, or an inlined literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    pub name: String,
    pub data_type: DataType,
    pub value_type: ValueType,
    pub literal: Option<ScalarValue>,
}

impl Operand {
    pub fn variable(name: impl Into<String>, data_type: DataType, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            data_type,
            value_type,
            literal: None,
        }
    }

    pub fn literal(value: ScalarValue) -> Self {
        Self {
            name: value.to_string(),
            data_type: DataType::Scalar,
            value_type: value.value_type(),
            literal: Some(value),
        }
    }

    /// Compiler temporary number `n`.
    pub fn temp(n: usize, data_type: DataType, value_type: ValueType) -> Self {
        Self::variable(format!("{TEMP_PREFIX}{n}"), data_type, value_type)
    }

    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    pub fn is_temp(&self) -> bool {
        !self.is_literal() && self.name.starts_with(TEMP_PREFIX)
    }

    pub fn is_matrix(&self) -> bool {
        self.data_type.is_matrix()
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.name,
            self.data_type.code(),
            self.value_type.code()
        )?;
        if self.is_literal() {
            write!(f, ".true")?;
        }
        Ok(())
    }
}
