//! Algebraic simplifications around transpose.

use common_error::MantisResult;
use log::debug;
use mantis_logical::{HopDag, HopId, HopKind, ReorgOp};

use super::rule::{RewriteRule, Transformed};

fn is_transpose(dag: &HopDag, id: HopId) -> bool {
    matches!(dag[id].kind, HopKind::Reorg(ReorgOp::Transpose))
}

/// `t(t(X)) -> X`.
pub struct RemoveDoubleTranspose;

impl RewriteRule for RemoveDoubleTranspose {
    fn name(&self) -> &'static str {
        "RemoveDoubleTranspose"
    }

    fn description(&self) -> &'static str {
        "Remove pairs of directly nested transposes"
    }

    fn apply(&self, mut dag: HopDag) -> MantisResult<Transformed> {
        let mut changed = false;
        for id in dag.topo_order()? {
            if !dag.contains(id) || !is_transpose(&dag, id) {
                continue;
            }
            let inner = dag[id].inputs[0];
            if !is_transpose(&dag, inner) {
                continue;
            }
            let x = dag[inner].inputs[0];
            debug!("Removing double transpose over {}", dag[x].name());
            dag.replace_all_uses(id, x);
            dag.remove_if_dead(id);
            changed = true;
        }
        Ok(Transformed::new(dag, changed))
    }
}

/// `t(cbind(t(A), t(B))) -> rbind(A, B)` and `t(rbind(t(A), t(B))) -> cbind(A, B)`.
pub struct TransposeAppendPushdown;

impl RewriteRule for TransposeAppendPushdown {
    fn name(&self) -> &'static str {
        "TransposeAppendPushdown"
    }

    fn description(&self) -> &'static str {
        "Replace a transposed append of transposes by the dual append"
    }

    fn apply(&self, mut dag: HopDag) -> MantisResult<Transformed> {
        let mut changed = false;
        for id in dag.topo_order()? {
            if !dag.contains(id) || !is_transpose(&dag, id) {
                continue;
            }
            let append = dag[id].inputs[0];
            let HopKind::Append(kind) = dag[append].kind else {
                continue;
            };
            let (left, right) = (dag[append].inputs[0], dag[append].inputs[1]);
            if !is_transpose(&dag, left) || !is_transpose(&dag, right) {
                continue;
            }
            let (a, b) = (dag[left].inputs[0], dag[right].inputs[0]);
            let (data_type, value_type) = (dag[id].data_type, dag[id].value_type);
            let (chars, forced) = (dag[id].chars, dag[id].forced_exec_type);

            let dual = dag.add_hop(HopKind::Append(kind.dual()), data_type, value_type, vec![a, b]);
            dag[dual].chars = chars;
            dag[dual].forced_exec_type = forced;
            debug!(
                "Rewrote t({}(t, t)) to {}",
                kind.opcode(),
                kind.dual().opcode()
            );
            dag.replace_all_uses(id, dual);
            dag.remove_if_dead(id);
            changed = true;
        }
        Ok(Transformed::new(dag, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantis_core::{DataType, MatrixCharacteristics, ValueType};
    use mantis_logical::{AppendKind, DataOpKind, validate_dag};

    fn read(dag: &mut HopDag, name: &str) -> HopId {
        let id = dag.add_hop(
            HopKind::Data {
                op: DataOpKind::PersistentRead,
                name: name.into(),
            },
            DataType::Matrix,
            ValueType::Double,
            vec![],
        );
        dag[id].chars = MatrixCharacteristics::new(2, 3, 1000, 1000);
        id
    }

    fn unary(dag: &mut HopDag, kind: HopKind, input: HopId) -> HopId {
        dag.add_hop(kind, DataType::Matrix, ValueType::Double, vec![input])
    }

    fn write(dag: &mut HopDag, input: HopId) {
        let w = dag.add_hop(
            HopKind::Data {
                op: DataOpKind::TransientWrite,
                name: "R".into(),
            },
            DataType::Matrix,
            ValueType::Double,
            vec![input],
        );
        dag.add_root(w);
    }

    #[test]
    fn test_remove_double_transpose() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let t1 = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), a);
        let t2 = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), t1);
        write(&mut dag, t2);

        let result = RemoveDoubleTranspose.apply(dag).unwrap();
        assert!(result.changed);
        assert_eq!(result.dag.len(), 2);
        validate_dag(&result.dag).unwrap();
    }

    #[test]
    fn test_transpose_cbind_becomes_rbind() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let b = read(&mut dag, "B");
        let ta = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), a);
        let tb = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), b);
        let cb = dag.add_hop(
            HopKind::Append(AppendKind::CBind),
            DataType::Matrix,
            ValueType::Double,
            vec![ta, tb],
        );
        let t = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), cb);
        write(&mut dag, t);

        let result = TransposeAppendPushdown.apply(dag).unwrap();
        assert!(result.changed);
        let dag = result.dag;
        validate_dag(&dag).unwrap();
        let rb = dag
            .hops()
            .find(|h| h.kind == HopKind::Append(AppendKind::RBind))
            .unwrap();
        assert_eq!(rb.inputs, vec![a, b]);
        assert!(!dag.hops().any(|h| matches!(h.kind, HopKind::Reorg(_))));
        assert_eq!(dag.len(), 4);
    }

    #[test]
    fn test_shared_transpose_kept() {
        let mut dag = HopDag::new();
        let a = read(&mut dag, "A");
        let t1 = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), a);
        let t2 = unary(&mut dag, HopKind::Reorg(ReorgOp::Transpose), t1);
        write(&mut dag, t2);
        write(&mut dag, t1);

        let dag = RemoveDoubleTranspose.apply(dag).unwrap().dag;
        assert!(dag.contains(t1));
        assert!(!dag.contains(t2));
        validate_dag(&dag).unwrap();
    }
}
