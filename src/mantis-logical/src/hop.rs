//! Logical operators (HOPs).

use mantis_core::{
    AggregateDirection, AggregateFunction, DataType, ExecType, MatrixCharacteristics, ScalarValue,
    UnaryFunction, ValueFunction, ValueType,
};
use serde::{Deserialize, Serialize};

/// Handle of a node inside a [`HopDag`](crate::HopDag) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HopId(pub usize);

impl std::fmt::Display for HopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Kind of a data operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataOpKind {
    /// Read a variable bound by an earlier block.
    TransientRead,
    /// Bind a variable for later blocks.
    TransientWrite,
    /// Read a program input.
    PersistentRead,
}

/// Reorganization operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReorgOp {
    Transpose,
    Diag,
}

impl ReorgOp {
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::Transpose => "r'",
            Self::Diag => "rdiag",
        }
    }
}

/// Append direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppendKind {
    CBind,
    RBind,
}

impl AppendKind {
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::CBind => "cbind",
            Self::RBind => "rbind",
        }
    }

    /// The same append over transposed inputs.
    pub const fn dual(&self) -> Self {
        match self {
            Self::CBind => Self::RBind,
            Self::RBind => Self::CBind,
        }
    }
}

/// Dimension built-ins over a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionOp {
    Nrow,
    Ncol,
    /// Number of cells.
    Length,
}

impl DimensionOp {
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::Nrow => "nrow",
            Self::Ncol => "ncol",
            Self::Length => "length",
        }
    }

    /// Result for a `rows x cols` matrix, `None` while either extent is unknown.
    pub fn evaluate(&self, rows: i64, cols: i64) -> Option<i64> {
        match self {
            Self::Nrow if rows >= 0 => Some(rows),
            Self::Ncol if cols >= 0 => Some(cols),
            Self::Length if rows >= 0 && cols >= 0 => Some(rows * cols),
            _ => None,
        }
    }
}

/// Logical operator kind and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HopKind {
    Data { op: DataOpKind, name: String },
    Literal(ScalarValue),
    Unary(UnaryFunction),
    Binary(ValueFunction),
    Aggregate {
        func: AggregateFunction,
        direction: AggregateDirection,
    },
    /// Matrix multiplication.
    AggregateBinary,
    /// Range indexing; inputs are `[matrix, rl, ru, cl, cu]`.
    Indexing,
    Reorg(ReorgOp),
    Append(AppendKind),
    /// Uniform random matrix; scalar inputs are
    /// `[rows, cols, min, max, sparsity, seed]`.
    DataGen,
    /// Scalar dimension of a matrix input.
    Dimension(DimensionOp),
}

impl HopKind {
    /// Short operator name used in plans and error messages.
    pub fn name(&self) -> String {
        match self {
            Self::Data { op, name } => match op {
                DataOpKind::TransientRead => format!("TRead {name}"),
                DataOpKind::TransientWrite => format!("TWrite {name}"),
                DataOpKind::PersistentRead => format!("PRead {name}"),
            },
            Self::Literal(v) => format!("Lit {v}"),
            Self::Unary(f) => format!("u({f})"),
            Self::Binary(f) => format!("b({f})"),
            Self::Aggregate { func, direction } => format!("ua({func:?},{direction:?})"),
            Self::AggregateBinary => "ba(+*)".to_string(),
            Self::Indexing => "rix".to_string(),
            Self::Reorg(r) => format!("r({})", r.opcode()),
            Self::Append(a) => a.opcode().to_string(),
            Self::DataGen => "rand".to_string(),
            Self::Dimension(d) => d.opcode().to_string(),
        }
    }

    /// Number of inputs this kind takes.
    pub const fn arity(&self) -> usize {
        match self {
            Self::Data {
                op: DataOpKind::TransientWrite,
                ..
            } => 1,
            Self::Data { .. } | Self::Literal(_) => 0,
            Self::Unary(_) | Self::Aggregate { .. } | Self::Reorg(_) | Self::Dimension(_) => 1,
            Self::Binary(_) | Self::AggregateBinary | Self::Append(_) => 2,
            Self::Indexing => 5,
            Self::DataGen => 6,
        }
    }

    /// Check if this kind can only be implemented on distributed backends.
    pub const fn is_distributed_only(&self) -> bool {
        matches!(self, Self::Indexing)
    }

    /// Check if this kind only runs in-process even though it reads a matrix.
    pub const fn is_control_program_only(&self) -> bool {
        matches!(self, Self::Dimension(_))
    }

    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub const fn is_transient_write(&self) -> bool {
        matches!(
            self,
            Self::Data {
                op: DataOpKind::TransientWrite,
                ..
            }
        )
    }
}

/// A node of the logical plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub id: HopId,
    pub kind: HopKind,
    pub data_type: DataType,
    pub value_type: ValueType,
    pub chars: MatrixCharacteristics,
    /// Estimated sparsity used by the cost model when `nnz` is unknown.
    pub sparsity: f64,
    /// Ordered inputs.
    pub inputs: Vec<HopId>,
    /// Consumers; mirror of other nodes' `inputs`.
    pub parents: Vec<HopId>,
    /// Backend chosen by exec-type selection.
    pub exec_type: Option<ExecType>,
    /// Backend requested by the program.
    pub forced_exec_type: Option<ExecType>,
    /// Memory estimate in bytes from the last cost pass, `None` if unbounded.
    pub memory_estimate: Option<u64>,
}

impl Hop {
    pub fn name(&self) -> String {
        self.kind.name()
    }

    pub fn is_matrix(&self) -> bool {
        self.data_type.is_matrix()
    }

    pub fn is_scalar(&self) -> bool {
        self.data_type.is_scalar()
    }

    /// Literal payload, if this is a literal.
    pub fn literal(&self) -> Option<&ScalarValue> {
        match &self.kind {
            HopKind::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Estimated size of this node's output in bytes.
    pub fn output_size(&self) -> Option<u64> {
        if self.is_scalar() {
            return Some(8);
        }
        self.chars.estimate_size(self.chars.sparsity_or(self.sparsity))
    }
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.id.0, self.name())?;
        if !self.inputs.is_empty() {
            let ids: Vec<_> = self.inputs.iter().map(|i| i.0.to_string()).collect();
            write!(f, " ({})", ids.join(","))?;
        }
        if self.is_matrix() {
            write!(f, " [{},{}]", self.chars.rows, self.chars.cols)?;
        }
        if let Some(et) = self.exec_type {
            write!(f, " {}", et.code())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert_eq!(HopKind::Indexing.arity(), 5);
        assert_eq!(HopKind::DataGen.arity(), 6);
        assert_eq!(HopKind::Binary(ValueFunction::Plus).arity(), 2);
        assert_eq!(
            HopKind::Data {
                op: DataOpKind::TransientWrite,
                name: "x".into()
            }
            .arity(),
            1
        );
    }

    #[test]
    fn test_append_dual() {
        assert_eq!(AppendKind::CBind.dual(), AppendKind::RBind);
        assert_eq!(AppendKind::RBind.dual().dual(), AppendKind::RBind);
    }

    #[test]
    fn test_names() {
        assert_eq!(HopKind::Reorg(ReorgOp::Transpose).name(), "r(r')");
        assert_eq!(HopKind::Indexing.name(), "rix");
    }

    #[test]
    fn test_dimension_evaluate() {
        assert_eq!(DimensionOp::Nrow.evaluate(3, -1), Some(3));
        assert_eq!(DimensionOp::Ncol.evaluate(3, -1), None);
        assert_eq!(DimensionOp::Length.evaluate(0, 5), Some(0));
        assert!(HopKind::Dimension(DimensionOp::Nrow).is_control_program_only());
    }
}
