//! Data, value and execution type tags.

use serde::{Deserialize, Serialize};

/// Shape class of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// A single scalar value.
    Scalar,
    /// A two-dimensional matrix.
    Matrix,
}

impl DataType {
    /// Check if this is a matrix.
    pub const fn is_matrix(&self) -> bool {
        matches!(self, Self::Matrix)
    }

    /// Check if this is a scalar.
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar)
    }

    /// Short code used in serialized operands.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Scalar => "SCALAR",
            Self::Matrix => "MATRIX",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Cell value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Double,
    /// Boolean.
    Boolean,
    /// UTF-8 string (scalars only).
    String,
}

impl ValueType {
    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Double)
    }

    /// Short code used in serialized operands.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Double => "DOUBLE",
            Self::Boolean => "BOOLEAN",
            Self::String => "STRING",
        }
    }

    /// Size in bytes of one cell of this type in a dense block.
    pub const fn cell_size(&self) -> usize {
        8
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Where an operator executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecType {
    /// In-process control program.
    ControlProgram,
    /// Map/shuffle/reduce style distributed job.
    MapReduce,
    /// Collection-processing style distributed job.
    Collection,
}

impl ExecType {
    /// All exec types, in a fixed order.
    pub const ALL: [ExecType; 3] = [Self::ControlProgram, Self::MapReduce, Self::Collection];

    /// Check if this exec type runs on the distributed backend.
    pub const fn is_distributed(&self) -> bool {
        !matches!(self, Self::ControlProgram)
    }

    /// Short code used as instruction prefix.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ControlProgram => "CP",
            Self::MapReduce => "MR",
            Self::Collection => "CL",
        }
    }
}

impl std::fmt::Display for ExecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControlProgram => write!(f, "ControlProgram"),
            Self::MapReduce => write!(f, "MapReduce"),
            Self::Collection => write!(f, "Collection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_type_distributed() {
        assert!(!ExecType::ControlProgram.is_distributed());
        assert!(ExecType::MapReduce.is_distributed());
        assert!(ExecType::Collection.is_distributed());
        assert_eq!(ExecType::Collection.to_string(), "Collection");
    }

    #[test]
    fn test_codes() {
        assert_eq!(DataType::Matrix.code(), "MATRIX");
        assert_eq!(ValueType::Double.code(), "DOUBLE");
        assert_eq!(ExecType::ControlProgram.code(), "CP");
    }
}
