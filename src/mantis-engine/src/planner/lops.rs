//! HOP DAG to LOP DAG translation.

use std::collections::HashMap;

use common_config::CompilerConfig;
use common_error::{MantisError, MantisResult};
use log::debug;
use mantis_core::{AggregateFunction, DataType, ExecType, MatrixCharacteristics, ValueType};
use mantis_logical::{HopDag, HopId, HopKind, ReorgOp, check_capability};

use crate::physical::{ExecLocation, JobType, LopDag, LopId, LopKind, LopProperties};

/// Builds the physical operators for one HOP DAG.
///
/// Each HOP is translated exactly once; shared HOPs map to shared LOPs.
/// The assigned exec type is re-checked against the capability matrix, so a
/// forced or misassigned backend surfaces as a capability error here.
#[derive(Debug)]
pub struct LopPlanner {
    local_memory_budget: u64,
}

impl LopPlanner {
    pub fn new(config: &CompilerConfig) -> Self {
        Self {
            local_memory_budget: config.local_memory_budget as u64,
        }
    }

    pub fn plan(&self, hops: &HopDag) -> MantisResult<LopDag> {
        let mut ctx = PlanContext {
            hops,
            lops: LopDag::new(),
            memo: HashMap::new(),
        };
        for id in hops.topo_order()? {
            let lop = self.plan_hop(&mut ctx, id)?;
            ctx.memo.insert(id, lop);
        }
        for root in hops.roots() {
            let lop = ctx.lookup(*root)?;
            ctx.lops.add_root(lop);
        }
        let pruned = ctx.lops.prune_unreachable()?;
        if pruned > 0 {
            debug!("Pruned {pruned} unreachable physical operators");
        }
        ctx.lops.validate()?;
        Ok(ctx.lops)
    }

    fn plan_hop(&self, ctx: &mut PlanContext<'_>, id: HopId) -> MantisResult<LopId> {
        let hops = ctx.hops;
        let hop = &hops[id];
        let exec_type = hop
            .exec_type
            .or(hop.forced_exec_type)
            .unwrap_or(ExecType::ControlProgram);
        check_capability(hops, id, exec_type)?;

        let inputs = hop
            .inputs
            .iter()
            .map(|i| ctx.lookup(*i))
            .collect::<MantisResult<Vec<_>>>()?;
        let distributed = exec_type.is_distributed();
        let compute = |location: ExecLocation| {
            if distributed {
                LopProperties::distributed(location)
            } else {
                LopProperties::control_program()
            }
        };

        let lop = match &hop.kind {
            HopKind::Data { op, name } => ctx.emit(
                id,
                LopKind::Data {
                    op: *op,
                    name: name.clone(),
                },
                exec_type,
                LopProperties::data(),
                inputs,
            ),
            HopKind::Literal(v) => ctx.emit(
                id,
                LopKind::Literal(v.clone()),
                exec_type,
                LopProperties::data(),
                inputs,
            ),
            HopKind::Unary(f) => ctx.emit(
                id,
                LopKind::Unary(*f),
                exec_type,
                compute(ExecLocation::MapOrReduce),
                inputs,
            ),
            HopKind::Binary(f) => ctx.emit(
                id,
                LopKind::Binary(*f),
                exec_type,
                compute(ExecLocation::MapOrReduce),
                inputs,
            ),
            HopKind::Reorg(r) => ctx.emit(
                id,
                LopKind::Transform(*r),
                exec_type,
                compute(ExecLocation::MapOrReduce).with_breaks_alignment_if(distributed),
                inputs,
            ),
            HopKind::Append(a) => ctx.emit(
                id,
                LopKind::Append(*a),
                exec_type,
                compute(ExecLocation::MapOrReduce).with_breaks_alignment_if(distributed),
                inputs,
            ),
            HopKind::Aggregate { func, direction } => {
                if distributed {
                    let partial = ctx.emit_internal(
                        id,
                        LopKind::PartialAggregate {
                            func: *func,
                            direction: *direction,
                        },
                        exec_type,
                        LopProperties::distributed(ExecLocation::Map),
                        inputs,
                    );
                    let agg = ctx.group_aggregate(id, exec_type, partial, *func, false);
                    if hop.is_scalar() {
                        ctx.emit(
                            id,
                            LopKind::CastToScalar,
                            ExecType::ControlProgram,
                            LopProperties::control_program(),
                            vec![agg],
                        )
                    } else {
                        agg
                    }
                } else {
                    ctx.emit(
                        id,
                        LopKind::AggregateUnaryCp {
                            func: *func,
                            direction: *direction,
                        },
                        exec_type,
                        LopProperties::control_program(),
                        inputs,
                    )
                }
            }
            HopKind::AggregateBinary => {
                if distributed {
                    self.plan_distributed_matmult(ctx, id, exec_type)?
                } else {
                    ctx.emit(
                        id,
                        LopKind::MatMult,
                        exec_type,
                        LopProperties::control_program(),
                        inputs,
                    )
                }
            }
            HopKind::Indexing => {
                let reindex = ctx.emit_internal(
                    id,
                    LopKind::RangeReIndex,
                    exec_type,
                    LopProperties::distributed(ExecLocation::Map).with_breaks_alignment(),
                    inputs,
                );
                ctx.group_aggregate(id, exec_type, reindex, AggregateFunction::Sum, true)
            }
            HopKind::DataGen => ctx.emit(
                id,
                LopKind::DataGen,
                exec_type,
                compute(ExecLocation::Map),
                inputs,
            ),
            HopKind::Dimension(d) => ctx.emit(
                id,
                LopKind::Dimension(*d),
                exec_type,
                LopProperties::control_program(),
                inputs,
            ),
        };
        Ok(lop)
    }

    /// Pick among zip, broadcast and cross-product multiply.
    fn plan_distributed_matmult(
        &self,
        ctx: &mut PlanContext<'_>,
        id: HopId,
        exec_type: ExecType,
    ) -> MantisResult<LopId> {
        let hops = ctx.hops;
        let hop = &hops[id];
        let (left, right) = (hop.inputs[0], hop.inputs[1]);
        let left_hop = &hops[left];

        if exec_type == ExecType::Collection
            && left_hop.kind == HopKind::Reorg(ReorgOp::Transpose)
        {
            let x = ctx.lookup(left_hop.inputs[0])?;
            let y = ctx.lookup(right)?;
            let zip = ctx.emit_internal(
                id,
                LopKind::ZipMult,
                exec_type,
                LopProperties::distributed(ExecLocation::Map),
                vec![x, y],
            );
            return Ok(ctx.group_aggregate(id, exec_type, zip, AggregateFunction::Sum, false));
        }

        let inputs = vec![ctx.lookup(left)?, ctx.lookup(right)?];
        let broadcast_fits = hops[right]
            .output_size()
            .is_some_and(|size| size <= self.local_memory_budget);
        if broadcast_fits {
            return Ok(ctx.emit(
                id,
                LopKind::MapMult,
                exec_type,
                LopProperties::distributed(ExecLocation::Map),
                inputs,
            ));
        }

        let cpmm = ctx.emit_internal(
            id,
            LopKind::Cpmm,
            exec_type,
            LopProperties::distributed(ExecLocation::MapAndReduce)
                .with_defines_job()
                .with_jobs(&[JobType::CrossProduct]),
            inputs,
        );
        Ok(ctx.group_aggregate(id, exec_type, cpmm, AggregateFunction::Sum, false))
    }
}

struct PlanContext<'a> {
    hops: &'a HopDag,
    lops: LopDag,
    memo: HashMap<HopId, LopId>,
}

impl PlanContext<'_> {
    fn lookup(&self, hop: HopId) -> MantisResult<LopId> {
        self.memo.get(&hop).copied().ok_or_else(|| {
            MantisError::internal(format!("no physical operator for input {hop}"))
        })
    }

    /// Emit the operator producing the HOP's value.
    fn emit(
        &mut self,
        hop: HopId,
        kind: LopKind,
        exec_type: ExecType,
        properties: LopProperties,
        inputs: Vec<LopId>,
    ) -> LopId {
        let h = &self.hops[hop];
        self.lops.add_lop(
            kind,
            h.data_type,
            h.value_type,
            h.chars,
            exec_type,
            properties,
            inputs,
            Some(hop),
        )
    }

    /// Emit a matrix-valued helper operator on the way to the HOP's value.
    fn emit_internal(
        &mut self,
        hop: HopId,
        kind: LopKind,
        exec_type: ExecType,
        properties: LopProperties,
        inputs: Vec<LopId>,
    ) -> LopId {
        let h = &self.hops[hop];
        let chars = if h.is_matrix() {
            h.chars
        } else {
            MatrixCharacteristics::unknown()
                .with_dims(1, 1)
                .with_blocking(h.chars.rows_per_block, h.chars.cols_per_block)
        };
        self.lops.add_lop(
            kind,
            DataType::Matrix,
            ValueType::Double,
            chars,
            exec_type,
            properties,
            inputs,
            Some(hop),
        )
    }

    /// Append `Group -> Aggregate` after a partial-result operator.
    ///
    /// With `is_output` set the aggregate carries the HOP's own types.
    fn group_aggregate(
        &mut self,
        hop: HopId,
        exec_type: ExecType,
        source: LopId,
        func: AggregateFunction,
        is_output: bool,
    ) -> LopId {
        let shuffle = &[JobType::Generic, JobType::CrossProduct];
        let group = self.emit_internal(
            hop,
            LopKind::Group,
            exec_type,
            LopProperties::distributed(ExecLocation::MapAndReduce).with_jobs(shuffle),
            vec![source],
        );
        let properties = LopProperties::distributed(ExecLocation::Reduce).with_jobs(shuffle);
        let kind = LopKind::Aggregate { func };
        if is_output || self.hops[hop].is_matrix() {
            self.emit(hop, kind, exec_type, properties, vec![group])
        } else {
            self.emit_internal(hop, kind, exec_type, properties, vec![group])
        }
    }
}

trait PropertiesExt {
    fn with_breaks_alignment_if(self, cond: bool) -> Self;
}

impl PropertiesExt for LopProperties {
    fn with_breaks_alignment_if(self, cond: bool) -> Self {
        if cond {
            self.with_breaks_alignment()
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_error::ErrorKind;
    use mantis_core::{AggregateDirection, ValueFunction};
    use mantis_logical::DataOpKind;

    fn matrix_read(dag: &mut HopDag, name: &str, rows: i64, cols: i64, et: ExecType) -> HopId {
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
        dag[id].exec_type = Some(et);
        id
    }

    fn tag(dag: &mut HopDag, id: HopId, rows: i64, cols: i64, et: ExecType) {
        dag[id].chars = MatrixCharacteristics::new(rows, cols, 1000, 1000);
        dag[id].exec_type = Some(et);
    }

    fn write(dag: &mut HopDag, name: &str, input: HopId) -> HopId {
        let dt = dag[input].data_type;
        let w = dag.add_hop(
            HopKind::Data {
                op: DataOpKind::TransientWrite,
                name: name.into(),
            },
            dt,
            ValueType::Double,
            vec![input],
        );
        dag[w].chars = dag[input].chars;
        dag[w].exec_type = Some(ExecType::ControlProgram);
        dag.add_root(w);
        w
    }

    #[test]
    fn test_distributed_sum_uses_group_aggregate() {
        let cp = ExecType::ControlProgram;
        let mut dag = HopDag::new();
        let a = matrix_read(&mut dag, "A", 100, 10, cp);
        let s = dag.add_hop(
            HopKind::Aggregate {
                func: AggregateFunction::Sum,
                direction: AggregateDirection::All,
            },
            DataType::Scalar,
            ValueType::Double,
            vec![a],
        );
        dag[s].exec_type = Some(ExecType::MapReduce);
        write(&mut dag, "s", s);

        let lops = LopPlanner::new(&CompilerConfig::default()).plan(&dag).unwrap();
        let names: Vec<_> = lops
            .topo_order()
            .unwrap()
            .into_iter()
            .map(|id| lops[id].name())
            .collect();
        assert_eq!(
            names,
            vec!["PRead A", "uak+", "group", "ak+", "castdts", "TWrite s"]
        );
        lops.validate().unwrap();
    }

    #[test]
    fn test_matmult_strategy() {
        let cl = ExecType::Collection;
        let mut dag = HopDag::new();
        let x = matrix_read(&mut dag, "X", 1000, 1000, cl);
        let y = matrix_read(&mut dag, "Y", 1000, 1000, cl);
        let mm = dag.add_hop(
            HopKind::AggregateBinary,
            DataType::Matrix,
            ValueType::Double,
            vec![x, y],
        );
        tag(&mut dag, mm, 1000, 1000, cl);
        write(&mut dag, "Z", mm);

        let tight = CompilerConfig::default().with_local_memory_budget(1024);
        let lops = LopPlanner::new(&tight).plan(&dag).unwrap();
        assert_eq!(lops.job_boundaries().len(), 1);
        assert!(lops.lops().any(|l| l.kind == LopKind::Cpmm));

        let lops = LopPlanner::new(&CompilerConfig::default()).plan(&dag).unwrap();
        assert!(lops.lops().any(|l| l.kind == LopKind::MapMult));
        assert!(lops.job_boundaries().is_empty());
    }

    #[test]
    fn test_zip_mult_drops_transpose() {
        let cl = ExecType::Collection;
        let mut dag = HopDag::new();
        let x = matrix_read(&mut dag, "X", 500, 20, cl);
        let y = matrix_read(&mut dag, "Y", 500, 30, cl);
        let t = dag.add_hop(
            HopKind::Reorg(ReorgOp::Transpose),
            DataType::Matrix,
            ValueType::Double,
            vec![x],
        );
        tag(&mut dag, t, 20, 500, cl);
        let mm = dag.add_hop(
            HopKind::AggregateBinary,
            DataType::Matrix,
            ValueType::Double,
            vec![t, y],
        );
        tag(&mut dag, mm, 20, 30, cl);
        write(&mut dag, "Z", mm);

        let lops = LopPlanner::new(&CompilerConfig::default()).plan(&dag).unwrap();
        assert!(lops.lops().any(|l| l.kind == LopKind::ZipMult));
        assert!(!lops.lops().any(|l| matches!(l.kind, LopKind::Transform(_))));
    }

    #[test]
    fn test_indexing_on_control_program_is_rejected() {
        let cp = ExecType::ControlProgram;
        let mut dag = HopDag::new();
        let x = matrix_read(&mut dag, "X", 10, 10, cp);
        let bound = |dag: &mut HopDag, v: i64| {
            let id = dag.add_hop(
                HopKind::Literal(v.into()),
                DataType::Scalar,
                ValueType::Int,
                vec![],
            );
            dag[id].exec_type = Some(cp);
            id
        };
        let bounds: Vec<_> = [1, 2, 1, 10].into_iter().map(|v| bound(&mut dag, v)).collect();
        let mut inputs = vec![x];
        inputs.extend(bounds);
        let ix = dag.add_hop(HopKind::Indexing, DataType::Matrix, ValueType::Double, inputs);
        tag(&mut dag, ix, 2, 10, cp);
        write(&mut dag, "B", ix);

        let err = LopPlanner::new(&CompilerConfig::default())
            .plan(&dag)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);

        dag[ix].exec_type = Some(ExecType::MapReduce);
        let lops = LopPlanner::new(&CompilerConfig::default()).plan(&dag).unwrap();
        let reindex = lops.lops().find(|l| l.kind == LopKind::RangeReIndex).unwrap();
        assert_eq!(reindex.inputs.len(), 5);
        assert!(reindex.properties.breaks_alignment);
    }

    #[test]
    fn test_shared_hop_planned_once() {
        let cp = ExecType::ControlProgram;
        let mut dag = HopDag::new();
        let a = matrix_read(&mut dag, "A", 3, 3, cp);
        let plus = dag.add_hop(
            HopKind::Binary(ValueFunction::Plus),
            DataType::Matrix,
            ValueType::Double,
            vec![a, a],
        );
        tag(&mut dag, plus, 3, 3, cp);
        write(&mut dag, "B", plus);
        write(&mut dag, "C", plus);

        let lops = LopPlanner::new(&CompilerConfig::default()).plan(&dag).unwrap();
        assert_eq!(lops.len(), 4);
        let plus_lop = lops
            .lops()
            .find(|l| l.kind == LopKind::Binary(ValueFunction::Plus))
            .unwrap();
        assert_eq!(plus_lop.outputs.len(), 2);
    }
}
