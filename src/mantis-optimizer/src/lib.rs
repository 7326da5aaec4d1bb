//! Rewrite and backend-assignment engine for Mantis logical plans.

mod rules;

pub use rules::{
    CommonSubexpressionElimination, ConstantFolding, DimensionPropagation, ExecTypeSelection,
    OptimizedDag, Optimizer, OptimizerConfig, RemoveDoubleTranspose, RewriteRule, RuleTrace,
    Transformed, TransposeAppendPushdown, distributed_exec_type, memory_estimate,
};

use common_config::CompilerConfig;
use common_error::MantisResult;
use mantis_logical::LogicalProgram;

/// Optimize every DAG of a program with the standard pipeline.
pub fn optimize(program: &mut LogicalProgram, config: &CompilerConfig) -> MantisResult<usize> {
    Optimizer::for_config(config).optimize_program(program)
}
