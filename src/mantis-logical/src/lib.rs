//! Logical planning layer for Mantis.
//!
//! `mantis-logical` turns the front-end program into a DAG of logical
//! operators (HOPs) per straight-line block:
//!
//! - **AST interface**: [`ast`] is the typed program handed over by the parser
//! - **HOP DAG**: [`HopDag`] is an arena of [`Hop`] nodes with mutual
//!   input/parent edges; shared nodes denote common subexpressions
//! - **Traversal**: [`VisitState`] keeps visit status outside the nodes
//! - **Inference**: bottom-up dimension and sparsity propagation
//! - **Validation**: structural checks and the operator/backend capability matrix
//!
//! # Example
//!
//! ```rust
//! use mantis_core::ValueFunction;
//! use mantis_logical::ast::{Expr, ProgramAst, Statement};
//! use mantis_logical::ProgramBuilder;
//!
//! let ast = ProgramAst::straight_line(vec![Statement::assign(
//!     "C",
//!     Expr::binary(ValueFunction::Plus, Expr::read("A", 3, 3), Expr::read("B", 3, 3)),
//! )]);
//! let program = ProgramBuilder::new(1000).build(&ast).unwrap();
//! println!("{}", program.explain());
//! ```

pub mod ast;
mod builder;
pub mod capability;
mod dag;
mod hop;
pub mod inference;
mod program;
mod traversal;
pub mod validation;

pub use builder::{ProgramBuilder, VariableInfo};
pub use capability::{check_capability, is_matrix_operator, supported_exec_types};
pub use dag::HopDag;
pub use hop::{AppendKind, DataOpKind, DimensionOp, Hop, HopId, HopKind, ReorgOp};
pub use inference::propagate_characteristics;
pub use program::{LogicalBlock, LogicalProgram};
pub use traversal::{VisitState, VisitStatus};
pub use validation::{StructuralValidator, validate_dag};
