//! Compute operators carried by physical operators, instructions and job steps.

use mantis_core::{AggregateDirection, AggregateFunction, UnaryFunction, ValueFunction};
use mantis_logical::{AppendKind, DimensionOp, ReorgOp};
use serde::{Deserialize, Serialize};

/// A stateless computation with its functor payload.
///
/// The same value travels from the physical plan into CP instructions and
/// serialized job descriptors, so every backend dispatches on one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Unary(UnaryFunction),
    Binary(ValueFunction),
    Reorg(ReorgOp),
    Append(AppendKind),
    /// In-process unary aggregate.
    AggregateUnary {
        func: AggregateFunction,
        direction: AggregateDirection,
    },
    /// Map-side aggregate producing keyed partial states.
    PartialAggregate {
        func: AggregateFunction,
        direction: AggregateDirection,
    },
    /// Shuffle partial states by output key.
    Group,
    /// Reduce-side merge of grouped partial states.
    Aggregate { func: AggregateFunction },
    /// In-process matrix multiply.
    MatMult,
    /// Cross-product matrix multiply, partitioned on the common dimension.
    Cpmm,
    /// Matrix multiply with the right operand broadcast to every partition.
    MapMult,
    /// `t(X) %*% Y` over row-aligned `X` and `Y`.
    ZipMult,
    /// Range re-indexing; operands are `[X, rl, ru, cl, cu]`, 1-based inclusive.
    RangeReIndex,
    /// `1 x 1` matrix to scalar.
    CastToScalar,
    /// Uniform random matrix; operands are `[rows, cols, min, max, sparsity, seed]`.
    DataGen,
    /// `nrow`, `ncol` or `length` of a matrix.
    Dimension(DimensionOp),
}

impl Operator {
    /// Instruction opcode.
    pub fn opcode(&self) -> String {
        match self {
            Self::Unary(f) => f.opcode().to_string(),
            Self::Binary(f) => f.opcode().to_string(),
            Self::Reorg(r) => r.opcode().to_string(),
            Self::Append(a) => a.opcode().to_string(),
            Self::AggregateUnary { func, direction }
            | Self::PartialAggregate { func, direction } => func
                .opcode(*direction)
                .unwrap_or_else(|_| format!("ua{func:?}")),
            Self::Group => "group".to_string(),
            Self::Aggregate { func } => match func {
                AggregateFunction::Sum => "ak+",
                AggregateFunction::Min => "amin",
                AggregateFunction::Max => "amax",
                AggregateFunction::Mean => "amean",
            }
            .to_string(),
            Self::MatMult => "ba+*".to_string(),
            Self::Cpmm => "cpmm".to_string(),
            Self::MapMult => "mapmm".to_string(),
            Self::ZipMult => "zipmm".to_string(),
            Self::RangeReIndex => "rangeReIndex".to_string(),
            Self::CastToScalar => "castdts".to_string(),
            Self::DataGen => "rand".to_string(),
            Self::Dimension(d) => d.opcode().to_string(),
        }
    }

    /// Number of operands.
    pub const fn arity(&self) -> usize {
        match self {
            Self::Unary(_)
            | Self::Reorg(_)
            | Self::AggregateUnary { .. }
            | Self::PartialAggregate { .. }
            | Self::Group
            | Self::Aggregate { .. }
            | Self::CastToScalar
            | Self::Dimension(_) => 1,
            Self::Binary(_)
            | Self::Append(_)
            | Self::MatMult
            | Self::Cpmm
            | Self::MapMult
            | Self::ZipMult => 2,
            Self::RangeReIndex => 5,
            Self::DataGen => 6,
        }
    }

    /// Operators that work on each row partition independently.
    pub const fn is_row_local(&self) -> bool {
        matches!(
            self,
            Self::Unary(_) | Self::Binary(_) | Self::MapMult | Self::PartialAggregate { .. }
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.opcode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        let row_sums = Operator::PartialAggregate {
            func: AggregateFunction::Sum,
            direction: AggregateDirection::Row,
        };
        assert_eq!(row_sums.opcode(), "uark+");
        assert_eq!(Operator::Binary(ValueFunction::Plus).opcode(), "+");
        assert_eq!(Operator::Reorg(ReorgOp::Transpose).opcode(), "r'");
        assert_eq!(Operator::RangeReIndex.arity(), 5);
        assert_eq!(Operator::DataGen.opcode(), "rand");
        assert_eq!(Operator::Dimension(DimensionOp::Ncol).opcode(), "ncol");
    }

    #[test]
    fn test_serde_round_trip() {
        let op = Operator::Aggregate {
            func: AggregateFunction::Mean,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(serde_json::from_str::<Operator>(&json).unwrap(), op);
    }
}
