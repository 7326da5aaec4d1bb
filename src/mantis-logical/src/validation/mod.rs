//! Validation layer for logical DAGs.

mod structural;

pub use structural::{
    StructuralValidationError, StructuralValidator, dag_depth, is_dag, operator_count,
};

use common_error::{MantisError, MantisResult};

use crate::dag::HopDag;

/// Validate a DAG, folding all findings into one structural error.
pub fn validate_dag(dag: &HopDag) -> MantisResult<()> {
    StructuralValidator::validate(dag).map_err(|errors| {
        let messages: Vec<_> = errors.iter().map(ToString::to_string).collect();
        MantisError::structural(messages.join("; "))
    })
}
