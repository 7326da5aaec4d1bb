//! Arena-backed physical DAG.

use std::ops::{Index, IndexMut};

use common_error::{MantisError, MantisResult};
use mantis_core::{DataType, ExecType, MatrixCharacteristics, ValueType};
use mantis_logical::{HopId, VisitState, VisitStatus};

use super::lop::{Lop, LopId, LopKind};
use super::properties::LopProperties;

/// The physical operators of one statement block or predicate.
#[derive(Debug, Clone, Default)]
pub struct LopDag {
    nodes: Vec<Option<Lop>>,
    roots: Vec<LopId>,
}

impl LopDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, wiring output back-edges on every input.
    #[allow(clippy::too_many_arguments)]
    pub fn add_lop(
        &mut self,
        kind: LopKind,
        data_type: DataType,
        value_type: ValueType,
        chars: MatrixCharacteristics,
        exec_type: ExecType,
        properties: LopProperties,
        inputs: Vec<LopId>,
        hop: Option<HopId>,
    ) -> LopId {
        let id = LopId(self.nodes.len());
        for input in &inputs {
            self[*input].outputs.push(id);
        }
        self.nodes.push(Some(Lop {
            id,
            kind,
            data_type,
            value_type,
            chars,
            inputs,
            outputs: Vec::new(),
            exec_type,
            properties,
            hop,
        }));
        id
    }

    pub fn get(&self, id: LopId) -> Option<&Lop> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: LopId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lops(&self) -> impl Iterator<Item = &Lop> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn roots(&self) -> &[LopId] {
        &self.roots
    }

    pub fn add_root(&mut self, id: LopId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// Drop every node not reachable from a root.
    ///
    /// Returns the number of nodes removed.
    pub fn prune_unreachable(&mut self) -> MantisResult<usize> {
        let live: std::collections::HashSet<LopId> = self.topo_order()?.into_iter().collect();
        let dead: Vec<LopId> = self
            .lops()
            .map(|l| l.id)
            .filter(|id| !live.contains(id))
            .collect();
        for id in &dead {
            self.nodes[id.0] = None;
        }
        for lop in self.nodes.iter_mut().flatten() {
            lop.outputs.retain(|o| live.contains(o));
        }
        Ok(dead.len())
    }

    /// Reachable nodes in dependency order (inputs first).
    pub fn topo_order(&self) -> MantisResult<Vec<LopId>> {
        let mut state = VisitState::new();
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.visit(*root, &mut state, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        id: LopId,
        state: &mut VisitState<LopId>,
        out: &mut Vec<LopId>,
    ) -> MantisResult<()> {
        match state.status(id) {
            VisitStatus::Done => return Ok(()),
            VisitStatus::Visited => {
                return Err(MantisError::structural(format!(
                    "cycle detected in physical plan at {id}"
                )));
            }
            VisitStatus::NotVisited => {}
        }
        let lop = self
            .get(id)
            .ok_or_else(|| MantisError::internal(format!("dangling lop reference {id}")))?;
        state.enter(id);
        for input in &lop.inputs {
            self.visit(*input, state, out)?;
        }
        state.finish(id);
        out.push(id);
        Ok(())
    }

    /// Operators that force a job boundary.
    pub fn job_boundaries(&self) -> Vec<LopId> {
        self.lops()
            .filter(|l| l.is_distributed() && l.properties.defines_job)
            .map(|l| l.id)
            .collect()
    }

    /// Check edge symmetry and that exec types agree with the job flags.
    pub fn validate(&self) -> MantisResult<()> {
        for lop in self.lops() {
            let distributed_type = lop.exec_type.is_distributed();
            if distributed_type != lop.is_distributed() {
                return Err(MantisError::internal(format!(
                    "{} ({}) runs on {} but its job flags say otherwise",
                    lop.name(),
                    lop.id,
                    lop.exec_type
                )));
            }
            for input in &lop.inputs {
                let Some(src) = self.get(*input) else {
                    return Err(MantisError::internal(format!(
                        "{} references missing input {input}",
                        lop.id
                    )));
                };
                let as_input = lop.inputs.iter().filter(|i| *i == input).count();
                let as_output = src.outputs.iter().filter(|o| **o == lop.id).count();
                if as_input != as_output {
                    return Err(MantisError::internal(format!(
                        "asymmetric edge {input} -> {}",
                        lop.id
                    )));
                }
            }
        }
        self.topo_order().map(|_| ())
    }

    /// One line per node in dependency order.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        if let Ok(order) = self.topo_order() {
            for id in order {
                out.push_str(&format!("{}\n", self[id]));
            }
        }
        out
    }
}

impl Index<LopId> for LopDag {
    type Output = Lop;

    fn index(&self, id: LopId) -> &Lop {
        match self.get(id) {
            Some(lop) => lop,
            None => panic!("invalid lop id {id}"),
        }
    }
}

impl IndexMut<LopId> for LopDag {
    fn index_mut(&mut self, id: LopId) -> &mut Lop {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(lop) => lop,
            None => panic!("invalid lop id {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::{ExecLocation, JobType};
    use mantis_core::ValueFunction;
    use mantis_logical::DataOpKind;

    fn read(dag: &mut LopDag, name: &str) -> LopId {
        dag.add_lop(
            LopKind::Data {
                op: DataOpKind::PersistentRead,
                name: name.into(),
            },
            DataType::Matrix,
            ValueType::Double,
            MatrixCharacteristics::new(2, 2, 1000, 1000),
            ExecType::ControlProgram,
            LopProperties::data(),
            vec![],
            None,
        )
    }

    #[test]
    fn test_prune_and_order() {
        let mut dag = LopDag::new();
        let a = read(&mut dag, "A");
        let b = read(&mut dag, "B");
        let plus = dag.add_lop(
            LopKind::Binary(ValueFunction::Plus),
            DataType::Matrix,
            ValueType::Double,
            MatrixCharacteristics::new(2, 2, 1000, 1000),
            ExecType::Collection,
            LopProperties::distributed(ExecLocation::MapOrReduce),
            vec![a, a],
            None,
        );
        dag.add_root(plus);

        assert_eq!(dag.prune_unreachable().unwrap(), 1);
        assert!(!dag.contains(b));
        assert_eq!(dag.topo_order().unwrap(), vec![a, plus]);
        assert_eq!(dag[a].outputs, vec![plus, plus]);
        dag.validate().unwrap();
        assert!(dag.job_boundaries().is_empty());
    }

    #[test]
    fn test_validate_rejects_inconsistent_flags() {
        let mut dag = LopDag::new();
        let a = read(&mut dag, "A");
        let cpmm = dag.add_lop(
            LopKind::Cpmm,
            DataType::Matrix,
            ValueType::Double,
            MatrixCharacteristics::unknown(),
            ExecType::ControlProgram,
            LopProperties::distributed(ExecLocation::MapAndReduce)
                .with_defines_job()
                .with_jobs(&[JobType::CrossProduct]),
            vec![a, a],
            None,
        );
        dag.add_root(cpmm);
        assert!(dag.validate().is_err());
        assert_eq!(dag.job_boundaries(), vec![cpmm]);
    }
}
