//! Which backends can implement which logical operators.
//!
//! | kind                                                   | CP  | MR  | CL  |
//! |--------------------------------------------------------|-----|-----|-----|
//! | data, literals, scalar-only operators                  | yes | no  | no  |
//! | nrow, ncol, length                                     | yes | no  | no  |
//! | unary, binary, aggregate, reorg, append, matmult, rand | yes | yes | yes |
//! | range indexing                                         | no  | yes | yes |

use common_error::{MantisError, MantisResult};
use mantis_core::ExecType;

use crate::dag::HopDag;
use crate::hop::{HopId, HopKind};

const CP_ONLY: &[ExecType] = &[ExecType::ControlProgram];
const ALL: &[ExecType] = &ExecType::ALL;
const DISTRIBUTED_ONLY: &[ExecType] = &[ExecType::MapReduce, ExecType::Collection];

/// Check if a node touches matrix data, as output or as input.
pub fn is_matrix_operator(dag: &HopDag, id: HopId) -> bool {
    let hop = &dag[id];
    !hop.kind.is_data()
        && !matches!(hop.kind, HopKind::Literal(_))
        && (hop.is_matrix() || hop.inputs.iter().any(|i| dag[*i].is_matrix()))
}

/// Backends able to execute the node.
pub fn supported_exec_types(dag: &HopDag, id: HopId) -> &'static [ExecType] {
    if !is_matrix_operator(dag, id) || dag[id].kind.is_control_program_only() {
        CP_ONLY
    } else if dag[id].kind.is_distributed_only() {
        DISTRIBUTED_ONLY
    } else {
        ALL
    }
}

/// Fail with a capability error if `exec_type` cannot run the node.
pub fn check_capability(dag: &HopDag, id: HopId, exec_type: ExecType) -> MantisResult<()> {
    if supported_exec_types(dag, id).contains(&exec_type) {
        Ok(())
    } else {
        Err(MantisError::capability(dag[id].name(), exec_type.to_string()))
    }
}
