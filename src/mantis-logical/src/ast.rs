//! Front-end program representation.
//!
//! The parser lives outside this crate. It hands over a [`ProgramAst`] whose
//! expressions already carry their inferred [`DataType`] and [`ValueType`];
//! that is the only input the compiler needs besides its configuration.

use mantis_core::{
    AggregateDirection, AggregateFunction, DataType, ExecType, ScalarValue, UnaryFunction,
    ValueFunction, ValueType,
};
use serde::{Deserialize, Serialize};

use crate::hop::{AppendKind, DimensionOp, ReorgOp};

/// A parsed program: a sequence of statement blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramAst {
    pub blocks: Vec<StatementBlock>,
}

impl ProgramAst {
    pub fn new(blocks: Vec<StatementBlock>) -> Self {
        Self { blocks }
    }

    /// Program consisting of a single straight-line block.
    pub fn straight_line(statements: Vec<Statement>) -> Self {
        Self {
            blocks: vec![StatementBlock::Basic(statements)],
        }
    }
}

/// A control-flow block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementBlock {
    /// Straight-line statements compiled into one logical DAG.
    Basic(Vec<Statement>),
    If {
        predicate: Expr,
        then_blocks: Vec<StatementBlock>,
        else_blocks: Vec<StatementBlock>,
    },
    While {
        predicate: Expr,
        body: Vec<StatementBlock>,
    },
    /// `for (var in from:to)`, both bounds inclusive.
    For {
        var: String,
        from: Expr,
        to: Expr,
        body: Vec<StatementBlock>,
    },
}

impl StatementBlock {
    /// Names assigned anywhere inside this block, including nested blocks.
    pub fn assigned_variables(&self, out: &mut Vec<String>) {
        let mut push = |name: &str| {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        };
        match self {
            Self::Basic(statements) => {
                for s in statements {
                    push(&s.target);
                }
            }
            Self::If {
                then_blocks,
                else_blocks,
                ..
            } => {
                for b in then_blocks.iter().chain(else_blocks) {
                    b.assigned_variables(out);
                }
            }
            Self::While { body, .. } => {
                for b in body {
                    b.assigned_variables(out);
                }
            }
            Self::For { var, body, .. } => {
                push(var);
                for b in body {
                    b.assigned_variables(out);
                }
            }
        }
    }
}

/// `target = expr`, optionally pinned to an execution backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub target: String,
    pub expr: Expr,
    /// Forces every operator of this statement onto the given backend.
    pub exec_hint: Option<ExecType>,
}

impl Statement {
    pub fn assign(target: impl Into<String>, expr: Expr) -> Self {
        Self {
            target: target.into(),
            expr,
            exec_hint: None,
        }
    }

    #[must_use]
    pub fn with_exec_hint(mut self, exec_type: ExecType) -> Self {
        self.exec_hint = Some(exec_type);
        self
    }
}

/// A typed expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub data_type: DataType,
    pub value_type: ValueType,
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(ScalarValue),
    Variable(String),
    /// Program input bound by the caller under `name`, with declared metadata.
    Read {
        name: String,
        rows: i64,
        cols: i64,
        sparsity: f64,
    },
    Binary {
        op: ValueFunction,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryFunction,
        input: Box<Expr>,
    },
    Aggregate {
        func: AggregateFunction,
        direction: AggregateDirection,
        input: Box<Expr>,
    },
    MatMult {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Reorg {
        op: ReorgOp,
        input: Box<Expr>,
    },
    Append {
        kind: AppendKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `input[rl:ru, cl:cu]` with 1-based inclusive bounds.
    Index {
        input: Box<Expr>,
        row_lower: Box<Expr>,
        row_upper: Box<Expr>,
        col_lower: Box<Expr>,
        col_upper: Box<Expr>,
    },
    /// `rand(rows, cols, min, max, sparsity, seed)` with scalar arguments.
    DataGen {
        rows: Box<Expr>,
        cols: Box<Expr>,
        min: Box<Expr>,
        max: Box<Expr>,
        sparsity: Box<Expr>,
        seed: Box<Expr>,
    },
    Dimension {
        op: DimensionOp,
        input: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, data_type: DataType, value_type: ValueType) -> Self {
        Self {
            kind,
            data_type,
            value_type,
        }
    }

    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        let value = value.into();
        let vt = value.value_type();
        Self::new(ExprKind::Literal(value), DataType::Scalar, vt)
    }

    /// Reference to a double matrix variable.
    pub fn matrix(name: impl Into<String>) -> Self {
        Self::new(
            ExprKind::Variable(name.into()),
            DataType::Matrix,
            ValueType::Double,
        )
    }

    /// Reference to a scalar variable.
    pub fn scalar(name: impl Into<String>, value_type: ValueType) -> Self {
        Self::new(ExprKind::Variable(name.into()), DataType::Scalar, value_type)
    }

    /// Dense double input matrix.
    pub fn read(name: impl Into<String>, rows: i64, cols: i64) -> Self {
        Self::read_sparse(name, rows, cols, 1.0)
    }

    pub fn read_sparse(name: impl Into<String>, rows: i64, cols: i64, sparsity: f64) -> Self {
        Self::new(
            ExprKind::Read {
                name: name.into(),
                rows,
                cols,
                sparsity,
            },
            DataType::Matrix,
            ValueType::Double,
        )
    }

    pub fn binary(op: ValueFunction, left: Expr, right: Expr) -> Self {
        let data_type = if left.data_type.is_matrix() || right.data_type.is_matrix() {
            DataType::Matrix
        } else {
            DataType::Scalar
        };
        let value_type = if data_type.is_matrix() {
            ValueType::Double
        } else {
            op.result_type(left.value_type, right.value_type)
        };
        Self::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            data_type,
            value_type,
        )
    }

    pub fn unary(op: UnaryFunction, input: Expr) -> Self {
        let data_type = input.data_type;
        let value_type = if data_type.is_scalar() && op == UnaryFunction::Not {
            ValueType::Boolean
        } else if data_type.is_scalar() && op.preserves_int() {
            input.value_type
        } else {
            ValueType::Double
        };
        Self::new(
            ExprKind::Unary {
                op,
                input: Box::new(input),
            },
            data_type,
            value_type,
        )
    }

    pub fn aggregate(func: AggregateFunction, direction: AggregateDirection, input: Expr) -> Self {
        let data_type = if direction.yields_scalar() {
            DataType::Scalar
        } else {
            DataType::Matrix
        };
        Self::new(
            ExprKind::Aggregate {
                func,
                direction,
                input: Box::new(input),
            },
            data_type,
            ValueType::Double,
        )
    }

    pub fn sum(input: Expr) -> Self {
        Self::aggregate(AggregateFunction::Sum, AggregateDirection::All, input)
    }

    pub fn matmult(left: Expr, right: Expr) -> Self {
        Self::new(
            ExprKind::MatMult {
                left: Box::new(left),
                right: Box::new(right),
            },
            DataType::Matrix,
            ValueType::Double,
        )
    }

    pub fn transpose(input: Expr) -> Self {
        Self::reorg(ReorgOp::Transpose, input)
    }

    pub fn diag(input: Expr) -> Self {
        Self::reorg(ReorgOp::Diag, input)
    }

    fn reorg(op: ReorgOp, input: Expr) -> Self {
        Self::new(
            ExprKind::Reorg {
                op,
                input: Box::new(input),
            },
            DataType::Matrix,
            ValueType::Double,
        )
    }

    pub fn cbind(left: Expr, right: Expr) -> Self {
        Self::append(AppendKind::CBind, left, right)
    }

    pub fn rbind(left: Expr, right: Expr) -> Self {
        Self::append(AppendKind::RBind, left, right)
    }

    fn append(kind: AppendKind, left: Expr, right: Expr) -> Self {
        Self::new(
            ExprKind::Append {
                kind,
                left: Box::new(left),
                right: Box::new(right),
            },
            DataType::Matrix,
            ValueType::Double,
        )
    }

    /// Range indexing with 1-based inclusive integer bounds.
    pub fn index(input: Expr, rows: (i64, i64), cols: (i64, i64)) -> Self {
        Self::index_expr(
            input,
            Expr::literal(rows.0),
            Expr::literal(rows.1),
            Expr::literal(cols.0),
            Expr::literal(cols.1),
        )
    }

    pub fn index_expr(input: Expr, rl: Expr, ru: Expr, cl: Expr, cu: Expr) -> Self {
        Self::new(
            ExprKind::Index {
                input: Box::new(input),
                row_lower: Box::new(rl),
                row_upper: Box::new(ru),
                col_lower: Box::new(cl),
                col_upper: Box::new(cu),
            },
            DataType::Matrix,
            ValueType::Double,
        )
    }

    /// Uniform random matrix in `[min, max)`.
    ///
    /// A negative seed asks for a fresh seed at runtime.
    pub fn rand(rows: Expr, cols: Expr, min: f64, max: f64, sparsity: f64, seed: Expr) -> Self {
        Self::new(
            ExprKind::DataGen {
                rows: Box::new(rows),
                cols: Box::new(cols),
                min: Box::new(Expr::literal(min)),
                max: Box::new(Expr::literal(max)),
                sparsity: Box::new(Expr::literal(sparsity)),
                seed: Box::new(seed),
            },
            DataType::Matrix,
            ValueType::Double,
        )
    }

    pub fn nrow(input: Expr) -> Self {
        Self::dimension(DimensionOp::Nrow, input)
    }

    pub fn ncol(input: Expr) -> Self {
        Self::dimension(DimensionOp::Ncol, input)
    }

    pub fn length(input: Expr) -> Self {
        Self::dimension(DimensionOp::Length, input)
    }

    fn dimension(op: DimensionOp, input: Expr) -> Self {
        Self::new(
            ExprKind::Dimension {
                op,
                input: Box::new(input),
            },
            DataType::Scalar,
            ValueType::Int,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_typing() {
        let e = Expr::binary(ValueFunction::Plus, Expr::matrix("A"), Expr::literal(1i64));
        assert_eq!(e.data_type, DataType::Matrix);

        let e = Expr::binary(ValueFunction::Plus, Expr::literal(1i64), Expr::literal(2i64));
        assert_eq!((e.data_type, e.value_type), (DataType::Scalar, ValueType::Int));

        let e = Expr::binary(ValueFunction::LessThan, Expr::literal(1i64), Expr::literal(2.0));
        assert_eq!(e.value_type, ValueType::Boolean);
    }

    #[test]
    fn test_aggregate_typing() {
        assert_eq!(Expr::sum(Expr::matrix("A")).data_type, DataType::Scalar);
        let rs = Expr::aggregate(
            AggregateFunction::Sum,
            AggregateDirection::Row,
            Expr::matrix("A"),
        );
        assert_eq!(rs.data_type, DataType::Matrix);
    }

    #[test]
    fn test_builtin_typing() {
        let r = Expr::rand(
            Expr::literal(3i64),
            Expr::literal(4i64),
            0.0,
            1.0,
            1.0,
            Expr::scalar("seed", ValueType::Int),
        );
        assert_eq!(r.data_type, DataType::Matrix);
        let n = Expr::length(r);
        assert_eq!((n.data_type, n.value_type), (DataType::Scalar, ValueType::Int));
    }

    #[test]
    fn test_assigned_variables() {
        let block = StatementBlock::For {
            var: "i".into(),
            from: Expr::literal(1i64),
            to: Expr::literal(3i64),
            body: vec![StatementBlock::Basic(vec![
                Statement::assign("x", Expr::literal(1.0)),
                Statement::assign("x", Expr::literal(2.0)),
            ])],
        };
        let mut names = Vec::new();
        block.assigned_variables(&mut names);
        assert_eq!(names, vec!["i".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_ast_serde() {
        let ast = ProgramAst::straight_line(vec![Statement::assign(
            "C",
            Expr::binary(ValueFunction::Plus, Expr::read("A", 3, 3), Expr::read("B", 3, 3)),
        )]);
        let json = serde_json::to_string(&ast).unwrap();
        let back: ProgramAst = serde_json::from_str(&json).unwrap();
        assert_eq!(ast, back);
    }
}
