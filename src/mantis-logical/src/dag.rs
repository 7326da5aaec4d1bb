//! Arena-backed logical DAG.
//!
//! The arena owns every [`Hop`]. Nodes refer to each other by [`HopId`]:
//! `inputs` is the owning direction, `parents` is a lookup mirror kept in
//! sync by every mutation here. Dropping the DAG drops all nodes at once.

use std::ops::{Index, IndexMut};

use common_error::{MantisError, MantisResult};
use mantis_core::{DataType, MatrixCharacteristics, ValueType};

use crate::hop::{Hop, HopId, HopKind};
use crate::traversal::{VisitState, VisitStatus};

/// A DAG of logical operators for one statement block or predicate.
#[derive(Debug, Clone, Default)]
pub struct HopDag {
    nodes: Vec<Option<Hop>>,
    roots: Vec<HopId>,
}

impl HopDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, wiring parent back-edges on every input.
    pub fn add_hop(
        &mut self,
        kind: HopKind,
        data_type: DataType,
        value_type: ValueType,
        inputs: Vec<HopId>,
    ) -> HopId {
        let id = HopId(self.nodes.len());
        for input in &inputs {
            self[*input].parents.push(id);
        }
        let chars = if data_type.is_scalar() {
            MatrixCharacteristics::scalar()
        } else {
            MatrixCharacteristics::unknown()
        };
        self.nodes.push(Some(Hop {
            id,
            kind,
            data_type,
            value_type,
            chars,
            sparsity: 1.0,
            inputs,
            parents: Vec::new(),
            exec_type: None,
            forced_exec_type: None,
            memory_estimate: None,
        }));
        id
    }

    pub fn get(&self, id: HopId) -> Option<&Hop> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: HopId) -> Option<&mut Hop> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: HopId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live nodes in id order.
    pub fn hops(&self) -> impl Iterator<Item = &Hop> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn hops_mut(&mut self) -> impl Iterator<Item = &mut Hop> {
        self.nodes.iter_mut().filter_map(Option::as_mut)
    }

    pub fn ids(&self) -> Vec<HopId> {
        self.hops().map(|h| h.id).collect()
    }

    pub fn roots(&self) -> &[HopId] {
        &self.roots
    }

    pub fn add_root(&mut self, id: HopId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    /// The `i`-th input of `id`.
    pub fn input(&self, id: HopId, i: usize) -> &Hop {
        &self[self[id].inputs[i]]
    }

    /// Rewire every edge `parent -> old` to `parent -> new`.
    pub fn replace_input(&mut self, parent: HopId, old: HopId, new: HopId) {
        if old == new {
            return;
        }
        let mut count = 0;
        for input in &mut self[parent].inputs {
            if *input == old {
                *input = new;
                count += 1;
            }
        }
        self[old].parents.retain(|p| *p != parent);
        for _ in 0..count {
            self[new].parents.push(parent);
        }
    }

    /// Redirect all consumers and root references of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: HopId, new: HopId) {
        if old == new {
            return;
        }
        let mut parents = self[old].parents.clone();
        parents.sort_unstable();
        parents.dedup();
        for parent in parents {
            self.replace_input(parent, old, new);
        }
        let mut roots = Vec::with_capacity(self.roots.len());
        for root in std::mem::take(&mut self.roots) {
            let root = if root == old { new } else { root };
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        self.roots = roots;
    }

    /// Remove `id` if nothing consumes it, then cascade into its inputs.
    ///
    /// Returns the number of nodes removed.
    pub fn remove_if_dead(&mut self, id: HopId) -> usize {
        let Some(hop) = self.get(id) else {
            return 0;
        };
        if !hop.parents.is_empty() || self.roots.contains(&id) {
            return 0;
        }
        let mut inputs = hop.inputs.clone();
        self.nodes[id.0] = None;
        inputs.sort_unstable();
        inputs.dedup();
        let mut removed = 1;
        for input in &inputs {
            if let Some(h) = self.get_mut(*input) {
                h.parents.retain(|p| *p != id);
            }
        }
        for input in inputs {
            removed += self.remove_if_dead(input);
        }
        removed
    }

    /// Nodes reachable from the roots in post order (inputs first).
    ///
    /// Uses and leaves `state` populated; callers reset it before reuse.
    /// Shared nodes are emitted once. A back edge to a node still in
    /// progress is reported as a structural error.
    pub fn post_order(&self, state: &mut VisitState<HopId>) -> MantisResult<Vec<HopId>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.visit(*root, state, &mut out)?;
        }
        Ok(out)
    }

    /// Topological order from a fresh traversal.
    pub fn topo_order(&self) -> MantisResult<Vec<HopId>> {
        let mut state = VisitState::new();
        self.post_order(&mut state)
    }

    fn visit(
        &self,
        id: HopId,
        state: &mut VisitState<HopId>,
        out: &mut Vec<HopId>,
    ) -> MantisResult<()> {
        match state.status(id) {
            VisitStatus::Done => return Ok(()),
            VisitStatus::Visited => {
                return Err(MantisError::structural(format!(
                    "cycle detected at {}",
                    self.describe(id)
                )));
            }
            VisitStatus::NotVisited => {}
        }
        let hop = self
            .get(id)
            .ok_or_else(|| MantisError::internal(format!("dangling hop reference {id}")))?;
        state.enter(id);
        for input in &hop.inputs {
            self.visit(*input, state, out)?;
        }
        state.finish(id);
        out.push(id);
        Ok(())
    }

    fn describe(&self, id: HopId) -> String {
        self.get(id)
            .map_or_else(|| id.to_string(), |h| format!("{} ({})", h.name(), id))
    }

    /// Indented plan listing, one line per node, roots first.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let mut state = VisitState::new();
        for root in &self.roots {
            self.explain_node(*root, 0, &mut state, &mut out);
        }
        out
    }

    fn explain_node(
        &self,
        id: HopId,
        depth: usize,
        state: &mut VisitState<HopId>,
        out: &mut String,
    ) {
        let Some(hop) = self.get(id) else {
            return;
        };
        let indent = "  ".repeat(depth);
        if state.is_done(id) {
            out.push_str(&format!("{indent}^({})\n", id.0));
            return;
        }
        state.enter(id);
        state.finish(id);
        out.push_str(&format!("{indent}{hop}\n"));
        for input in &hop.inputs {
            self.explain_node(*input, depth + 1, state, out);
        }
    }
}

impl Index<HopId> for HopDag {
    type Output = Hop;

    fn index(&self, id: HopId) -> &Hop {
        match self.nodes.get(id.0).and_then(Option::as_ref) {
            Some(hop) => hop,
            None => panic!("invalid hop id {id}"),
        }
    }
}

impl IndexMut<HopId> for HopDag {
    fn index_mut(&mut self, id: HopId) -> &mut Hop {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(hop) => hop,
            None => panic!("invalid hop id {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantis_core::ValueFunction;

    use crate::hop::DataOpKind;

    fn read(dag: &mut HopDag, name: &str) -> HopId {
        dag.add_hop(
            HopKind::Data {
                op: DataOpKind::PersistentRead,
                name: name.into(),
            },
            DataType::Matrix,
            ValueType::Double,
            vec![],
        )
    }

    fn plus(dag: &mut HopDag, a: HopId, b: HopId) -> HopId {
        dag.add_hop(
            HopKind::Binary(ValueFunction::Plus),
            DataType::Matrix,
            ValueType::Double,
            vec![a, b],
        )
    }

    #[test]
    fn test_edges_are_mutual() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let s = plus(&mut dag, a, a);
        assert_eq!(dag[a].parents, vec![s, s]);
        assert_eq!(dag[s].inputs, vec![a, a]);
    }

    #[test]
    fn test_shared_node_visited_once() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let b = plus(&mut dag, a, a);
        let c = plus(&mut dag, a, b);
        dag.add_root(c);

        let mut state = VisitState::new();
        let order = dag.post_order(&mut state).unwrap();
        assert_eq!(order, vec![a, b, c]);
        assert_eq!(state.visits(), 3);

        state.reset();
        assert!(dag.ids().iter().all(|id| state.status(*id) == VisitStatus::NotVisited));
    }

    #[test]
    fn test_replace_and_remove() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let b = read(&mut dag, "B");
        let s = plus(&mut dag, a, a);
        dag.add_root(s);

        dag.replace_input(s, a, b);
        assert_eq!(dag[s].inputs, vec![b, b]);
        assert!(dag[a].parents.is_empty());
        assert_eq!(dag[b].parents.len(), 2);

        assert_eq!(dag.remove_if_dead(a), 1);
        assert!(!dag.contains(a));
        assert_eq!(dag.len(), 2);
    }

    #[test]
    fn test_remove_cascades() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let s = plus(&mut dag, a, a);
        let t = plus(&mut dag, s, s);
        assert_eq!(dag.remove_if_dead(t), 3);
        assert!(dag.is_empty());
    }

    #[test]
    fn test_cycle_is_structural_error() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let b = read(&mut dag, "B");
        let s = plus(&mut dag, a, b);
        let t = plus(&mut dag, s, b);
        dag.add_root(t);
        dag.replace_input(s, a, t);

        let err = dag.topo_order().unwrap_err();
        assert_eq!(err.kind(), common_error::ErrorKind::Structural);
    }
}
