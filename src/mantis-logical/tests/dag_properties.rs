//! Property tests for traversal and inference over random DAGs.

use std::collections::HashSet;

use mantis_core::{DataType, MatrixCharacteristics, ValueFunction, ValueType};
use mantis_logical::{
    DataOpKind, HopDag, HopId, HopKind, ReorgOp, StructuralValidator, VisitState, VisitStatus,
    propagate_characteristics,
};
use proptest::prelude::*;

/// Each entry after the leaves picks one or two earlier nodes as inputs.
fn arb_shape() -> impl Strategy<Value = Vec<(bool, usize, usize)>> {
    prop::collection::vec((any::<bool>(), any::<usize>(), any::<usize>()), 1..40)
}

/// Square matrices only, so every random combination is conformable.
fn build(shape: &[(bool, usize, usize)]) -> HopDag {
    let mut dag = HopDag::new();
    let mut ids: Vec<HopId> = Vec::new();
    for name in ["A", "B"] {
        let id = dag.add_hop(
            HopKind::Data {
                op: DataOpKind::PersistentRead,
                name: name.to_string(),
            },
            DataType::Matrix,
            ValueType::Double,
            vec![],
        );
        dag[id].chars = MatrixCharacteristics::new(8, 8, 1000, 1000);
        ids.push(id);
    }
    for (binary, x, y) in shape {
        let a = ids[x % ids.len()];
        let id = if *binary {
            let b = ids[y % ids.len()];
            dag.add_hop(
                HopKind::Binary(ValueFunction::Plus),
                DataType::Matrix,
                ValueType::Double,
                vec![a, b],
            )
        } else {
            dag.add_hop(
                HopKind::Reorg(ReorgOp::Transpose),
                DataType::Matrix,
                ValueType::Double,
                vec![a],
            )
        };
        ids.push(id);
    }
    for id in ids {
        if dag[id].parents.is_empty() {
            dag.add_root(id);
        }
    }
    dag
}

proptest! {
    #[test]
    fn test_shared_nodes_visited_once(shape in arb_shape()) {
        let dag = build(&shape);
        let mut state = VisitState::new();

        let order = dag.post_order(&mut state).unwrap();
        let unique: HashSet<_> = order.iter().copied().collect();
        prop_assert_eq!(unique.len(), order.len());
        prop_assert_eq!(state.visits(), order.len());
        prop_assert_eq!(order.len(), dag.len());

        // Inputs always precede their consumers.
        for (pos, id) in order.iter().enumerate() {
            for input in &dag[*id].inputs {
                let input_pos = order.iter().position(|x| x == input).unwrap();
                prop_assert!(input_pos < pos);
            }
        }

        state.reset();
        for id in dag.ids() {
            prop_assert_eq!(state.status(id), VisitStatus::NotVisited);
        }
        // A reset state yields the same traversal again.
        prop_assert_eq!(dag.post_order(&mut state).unwrap(), order);
    }

    #[test]
    fn test_inference_is_monotone_fixed_point(shape in arb_shape()) {
        let mut dag = build(&shape);
        prop_assert!(StructuralValidator::validate(&dag).is_ok());

        propagate_characteristics(&mut dag, 1000).unwrap();
        let first: Vec<_> = dag.hops().map(|h| h.chars).collect();
        prop_assert!(dag.hops().all(|h| h.chars.dims_known()));

        let changed = propagate_characteristics(&mut dag, 1000).unwrap();
        prop_assert!(!changed);
        let second: Vec<_> = dag.hops().map(|h| h.chars).collect();
        prop_assert_eq!(first, second);
    }
}
