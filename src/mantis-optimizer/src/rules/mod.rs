//! Rewrite rules for HOP DAGs.
//!
//! # Rule categories
//!
//! - **Dimension propagation**: bottom-up size inference to a fixed point
//! - **Constant folding**: evaluate scalar expressions over literals
//! - **Transpose simplification**: `t(t(X))` and transposed appends of transposes
//! - **Common subexpression elimination**: compute shared results once
//! - **Exec-type selection**: cost-based backend assignment, run once at the end
//!
//! # Rewrite safety
//!
//! A rewrite is legal only if every `TransientWrite` root binds the same
//! value afterwards and the input/parent edges stay mutual.

mod constant_folding;
mod cse;
mod dimension_propagation;
mod exec_type_selection;
mod optimizer;
mod rule;
mod transpose_rewrites;

pub use constant_folding::ConstantFolding;
pub use cse::CommonSubexpressionElimination;
pub use dimension_propagation::DimensionPropagation;
pub use exec_type_selection::{ExecTypeSelection, distributed_exec_type, memory_estimate};
pub use optimizer::{Optimizer, OptimizerConfig};
pub use rule::{OptimizedDag, RewriteRule, RuleTrace, Transformed};
pub use transpose_rewrites::{RemoveDoubleTranspose, TransposeAppendPushdown};
