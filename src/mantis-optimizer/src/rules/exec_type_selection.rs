//! Cost-based execution-type selection.
//!
//! Runs once after the rewrite fixpoint. Each node's footprint is its output
//! plus its matrix inputs, `rows * cols * sparsity * 8` bytes per matrix and
//! 8 bytes per scalar. Under the hybrid platform a node runs in-process when
//! that footprint is known and fits the local budget, and on the distributed
//! backend otherwise. Unknown dimensions count as unbounded.

use common_config::{CompilerConfig, DistributedBackendKind, ExecutionPlatform};
use common_error::MantisResult;
use log::{debug, info};
use mantis_core::ExecType;
use mantis_logical::{HopDag, HopId, is_matrix_operator, supported_exec_types};

use super::rule::{RewriteRule, Transformed};

/// Assign an [`ExecType`] to every node.
pub struct ExecTypeSelection {
    platform: ExecutionPlatform,
    backend: ExecType,
    local_budget: u64,
}

impl ExecTypeSelection {
    pub fn new(platform: ExecutionPlatform, backend: DistributedBackendKind, local_budget: u64) -> Self {
        Self {
            platform,
            backend: distributed_exec_type(backend),
            local_budget,
        }
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(
            config.platform,
            config.distributed_backend,
            config.local_memory_budget as u64,
        )
    }

    fn select(&self, dag: &HopDag, id: HopId, estimate: Option<u64>) -> ExecType {
        let hop = &dag[id];
        if !is_matrix_operator(dag, id) || hop.kind.is_control_program_only() {
            return ExecType::ControlProgram;
        }
        if let Some(forced) = hop.forced_exec_type {
            return forced;
        }
        match self.platform {
            ExecutionPlatform::SingleNode => ExecType::ControlProgram,
            ExecutionPlatform::Distributed => self.backend,
            ExecutionPlatform::Hybrid => {
                let fits = estimate.is_some_and(|m| m <= self.local_budget);
                if fits && supported_exec_types(dag, id).contains(&ExecType::ControlProgram) {
                    ExecType::ControlProgram
                } else {
                    self.backend
                }
            }
        }
    }
}

/// The exec type emitted for a distributed backend flavor.
pub fn distributed_exec_type(backend: DistributedBackendKind) -> ExecType {
    match backend {
        DistributedBackendKind::MapReduce => ExecType::MapReduce,
        DistributedBackendKind::Collection => ExecType::Collection,
    }
}

/// Output plus matrix input footprint, `None` if any part is unbounded.
pub fn memory_estimate(dag: &HopDag, id: HopId) -> Option<u64> {
    let hop = &dag[id];
    let mut total = hop.output_size()?;
    for input in &hop.inputs {
        let input = &dag[*input];
        if input.is_matrix() {
            total = total.saturating_add(input.output_size()?);
        }
    }
    Some(total)
}

impl RewriteRule for ExecTypeSelection {
    fn name(&self) -> &'static str {
        "ExecTypeSelection"
    }

    fn description(&self) -> &'static str {
        "Assign each operator to the in-process or distributed backend"
    }

    fn apply(&self, mut dag: HopDag) -> MantisResult<Transformed> {
        let mut changed = false;
        for id in dag.topo_order()? {
            let estimate = memory_estimate(&dag, id);
            let exec_type = self.select(&dag, id, estimate);
            let hop = &mut dag[id];
            if hop.is_matrix() && exec_type.is_distributed() {
                match estimate {
                    Some(m) => info!(
                        "{} ({}) needs {m} bytes, budget {}; assigned {}",
                        hop.name(),
                        hop.id,
                        self.local_budget,
                        exec_type
                    ),
                    None => info!(
                        "{} ({}) has unknown size; assigned {}",
                        hop.name(),
                        hop.id,
                        exec_type
                    ),
                }
            } else {
                debug!("{} ({}) assigned {}", hop.name(), hop.id, exec_type);
            }
            changed |= hop.exec_type != Some(exec_type) || hop.memory_estimate != estimate;
            hop.exec_type = Some(exec_type);
            hop.memory_estimate = estimate;
        }
        Ok(Transformed::new(dag, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantis_core::{DataType, MatrixCharacteristics, ValueFunction, ValueType};
    use mantis_logical::{DataOpKind, DimensionOp, HopKind, propagate_characteristics};

    fn plus_dag(rows: i64, cols: i64) -> (HopDag, HopId) {
        let mut dag = HopDag::new();
        let mut reads = Vec::new();
        for name in ["A", "B"] {
            let id = dag.add_hop(
                HopKind::Data {
                    op: DataOpKind::PersistentRead,
                    name: name.into(),
                },
                DataType::Matrix,
                ValueType::Double,
                vec![],
            );
            dag[id].chars = MatrixCharacteristics::new(rows, cols, 1000, 1000);
            reads.push(id);
        }
        let plus = dag.add_hop(
            HopKind::Binary(ValueFunction::Plus),
            DataType::Matrix,
            ValueType::Double,
            reads,
        );
        dag.add_root(plus);
        propagate_characteristics(&mut dag, 1000).unwrap();
        (dag, plus)
    }

    #[test]
    fn test_small_runs_in_process() {
        let (dag, plus) = plus_dag(3, 3);
        let rule = ExecTypeSelection::new(
            ExecutionPlatform::Hybrid,
            DistributedBackendKind::Collection,
            1 << 20,
        );
        let dag = rule.apply(dag).unwrap().dag;
        assert_eq!(dag[plus].exec_type, Some(ExecType::ControlProgram));
        assert_eq!(dag[plus].memory_estimate, Some(3 * (9 * 8 + 64)));
    }

    #[test]
    fn test_over_budget_goes_distributed() {
        let (dag, plus) = plus_dag(1000, 1000);
        let rule = ExecTypeSelection::new(
            ExecutionPlatform::Hybrid,
            DistributedBackendKind::MapReduce,
            1 << 20,
        );
        let dag = rule.apply(dag).unwrap().dag;
        assert_eq!(dag[plus].exec_type, Some(ExecType::MapReduce));
        // Reads are data operators and stay in-process.
        for input in &dag[plus].inputs {
            assert_eq!(dag[*input].exec_type, Some(ExecType::ControlProgram));
        }
    }

    #[test]
    fn test_unknown_dims_go_distributed() {
        let (mut dag, plus) = plus_dag(3, 3);
        let a = dag[plus].inputs[0];
        dag[a].chars = MatrixCharacteristics::unknown();
        dag[plus].chars = MatrixCharacteristics::unknown();
        let rule = ExecTypeSelection::new(
            ExecutionPlatform::Hybrid,
            DistributedBackendKind::Collection,
            u64::MAX,
        );
        let dag = rule.apply(dag).unwrap().dag;
        assert_eq!(dag[plus].exec_type, Some(ExecType::Collection));
        assert_eq!(dag[plus].memory_estimate, None);
    }

    #[test]
    fn test_platform_and_forced_types() {
        let (mut dag, plus) = plus_dag(1000, 1000);
        let single = ExecTypeSelection::new(
            ExecutionPlatform::SingleNode,
            DistributedBackendKind::Collection,
            0,
        );
        dag = single.apply(dag).unwrap().dag;
        assert_eq!(dag[plus].exec_type, Some(ExecType::ControlProgram));

        dag[plus].forced_exec_type = Some(ExecType::MapReduce);
        let result = single.apply(dag).unwrap();
        assert!(result.changed);
        assert_eq!(result.dag[plus].exec_type, Some(ExecType::MapReduce));
    }

    #[test]
    fn test_dimension_of_unknown_matrix_stays_in_process() {
        let (mut dag, plus) = plus_dag(3, 3);
        let a = dag[plus].inputs[0];
        dag[a].chars = MatrixCharacteristics::unknown();
        let nrow = dag.add_hop(
            HopKind::Dimension(DimensionOp::Nrow),
            DataType::Scalar,
            ValueType::Int,
            vec![a],
        );
        dag[nrow].forced_exec_type = Some(ExecType::Collection);
        dag.add_root(nrow);
        let rule = ExecTypeSelection::new(
            ExecutionPlatform::Distributed,
            DistributedBackendKind::Collection,
            0,
        );
        let dag = rule.apply(dag).unwrap().dag;
        assert_eq!(dag[nrow].exec_type, Some(ExecType::ControlProgram));
        assert_eq!(dag[plus].exec_type, Some(ExecType::Collection));
    }
}
