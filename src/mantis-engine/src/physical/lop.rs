//! Physical operators (LOPs).

use mantis_core::{
    AggregateDirection, AggregateFunction, DataType, ExecType, MatrixCharacteristics, ScalarValue,
    UnaryFunction, ValueFunction, ValueType,
};
use mantis_logical::{AppendKind, DataOpKind, DimensionOp, HopId, ReorgOp};

use super::operator::Operator;
use super::properties::LopProperties;

/// Handle of a node inside a [`LopDag`](super::LopDag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LopId(pub usize);

impl std::fmt::Display for LopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Physical operator kind and its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum LopKind {
    Data { op: DataOpKind, name: String },
    Literal(ScalarValue),
    Unary(UnaryFunction),
    Binary(ValueFunction),
    /// Transpose or diag.
    Transform(ReorgOp),
    Append(AppendKind),
    PartialAggregate {
        func: AggregateFunction,
        direction: AggregateDirection,
    },
    Group,
    Aggregate { func: AggregateFunction },
    AggregateUnaryCp {
        func: AggregateFunction,
        direction: AggregateDirection,
    },
    MatMult,
    Cpmm,
    MapMult,
    ZipMult,
    RangeReIndex,
    CastToScalar,
    DataGen,
    Dimension(DimensionOp),
}

impl LopKind {
    /// The computation this operator performs, `None` for data and literals.
    pub fn operator(&self) -> Option<Operator> {
        Some(match self {
            Self::Data { .. } | Self::Literal(_) => return None,
            Self::Unary(f) => Operator::Unary(*f),
            Self::Binary(f) => Operator::Binary(*f),
            Self::Transform(r) => Operator::Reorg(*r),
            Self::Append(a) => Operator::Append(*a),
            Self::PartialAggregate { func, direction } => Operator::PartialAggregate {
                func: *func,
                direction: *direction,
            },
            Self::Group => Operator::Group,
            Self::Aggregate { func } => Operator::Aggregate { func: *func },
            Self::AggregateUnaryCp { func, direction } => Operator::AggregateUnary {
                func: *func,
                direction: *direction,
            },
            Self::MatMult => Operator::MatMult,
            Self::Cpmm => Operator::Cpmm,
            Self::MapMult => Operator::MapMult,
            Self::ZipMult => Operator::ZipMult,
            Self::RangeReIndex => Operator::RangeReIndex,
            Self::CastToScalar => Operator::CastToScalar,
            Self::DataGen => Operator::DataGen,
            Self::Dimension(d) => Operator::Dimension(*d),
        })
    }

    pub fn name(&self) -> String {
        match self {
            Self::Data { op, name } => match op {
                DataOpKind::TransientRead => format!("TRead {name}"),
                DataOpKind::TransientWrite => format!("TWrite {name}"),
                DataOpKind::PersistentRead => format!("PRead {name}"),
            },
            Self::Literal(v) => format!("Lit {v}"),
            other => other
                .operator()
                .map_or_else(|| format!("{other:?}"), |op| op.opcode()),
        }
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

    /// Data reads and literals: values that already exist when a block starts.
    pub const fn is_source(&self) -> bool {
        matches!(
            self,
            Self::Literal(_)
                | Self::Data {
                    op: DataOpKind::TransientRead | DataOpKind::PersistentRead,
                    ..
                }
        )
    }
}

/// A node of the physical plan.
#[derive(Debug, Clone)]
pub struct Lop {
    pub id: LopId,
    pub kind: LopKind,
    pub data_type: DataType,
    pub value_type: ValueType,
    pub chars: MatrixCharacteristics,
    /// Ordered inputs.
    pub inputs: Vec<LopId>,
    /// Consumers; mirror of other nodes' `inputs`.
    pub outputs: Vec<LopId>,
    pub exec_type: ExecType,
    pub properties: LopProperties,
    /// The logical operator this node implements.
    pub hop: Option<HopId>,
}

impl Lop {
    pub fn name(&self) -> String {
        self.kind.name()
    }

    pub fn is_distributed(&self) -> bool {
        self.properties.is_distributed()
    }
}

impl std::fmt::Display for Lop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}) {}", self.id.0, self.name())?;
        if !self.inputs.is_empty() {
            let ids: Vec<_> = self.inputs.iter().map(|i| i.0.to_string()).collect();
            write!(f, " ({})", ids.join(","))?;
        }
        if self.data_type.is_matrix() {
            write!(f, " [{},{}]", self.chars.rows, self.chars.cols)?;
        }
        write!(f, " {} {}", self.exec_type.code(), self.properties.location)?;
        if self.properties.defines_job {
            write!(f, " !job")?;
        }
        Ok(())
    }
}
