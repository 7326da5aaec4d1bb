//! Integration tests for mantis-core.
//!
//! Cross-module behavior of blocks, functors and characteristics.

use mantis_core::*;
use proptest::prelude::*;

fn arb_block(max: usize) -> impl Strategy<Value = MatrixBlock> {
    (1..=max, 1..=max).prop_flat_map(|(r, c)| {
        prop::collection::vec(-1000i32..1000, r * c)
            .prop_map(move |v| {
                MatrixBlock::from_vec(r, c, v.into_iter().map(f64::from).collect()).unwrap()
            })
    })
}

#[test]
fn test_characteristics_match_block() {
    let block = MatrixBlock::from_rows(&[vec![1.0, 0.0], vec![0.0, 3.0]]).unwrap();
    let mc = MatrixCharacteristics::new(2, 2, 1000, 1000).with_nnz(block.nnz() as i64);
    assert_eq!(mc.sparsity_or(1.0), 0.5);
    assert_eq!(
        mc.estimate_size(1.0).unwrap() as usize,
        block.in_memory_size()
    );
}

#[test]
fn test_index_function_agrees_with_aggregate_shape() {
    let block = MatrixBlock::filled(3, 5, 1.0);
    for dir in [
        AggregateDirection::All,
        AggregateDirection::Row,
        AggregateDirection::Col,
    ] {
        let out = block.aggregate(AggregateFunction::Sum, dir).unwrap();
        let (r, c) = dir.index_function().compute_dimension(3, 5);
        assert_eq!((out.rows() as i64, out.cols() as i64), (r, c));
    }
}

#[test]
fn test_partial_aggregates_merge_to_full() {
    let block = MatrixBlock::from_rows(&[
        vec![1.0, 2.0],
        vec![3.0, 4.0],
        vec![5.0, 6.0],
    ])
    .unwrap();
    let top = block.slice(0..1, 0..2).unwrap();
    let bottom = block.slice(1..3, 0..2).unwrap();

    let mut merged = std::collections::BTreeMap::new();
    for (part, offset) in [(&top, 0), (&bottom, 1)] {
        for (key, state) in
            part.partial_aggregate(AggregateFunction::Sum, IndexFunction::ReduceRow, offset, 0)
        {
            merged
                .entry(key)
                .and_modify(|s: &mut AggState| s.merge(&state))
                .or_insert(state);
        }
    }
    let full = block
        .aggregate(AggregateFunction::Sum, AggregateDirection::Col)
        .unwrap();
    assert_eq!(merged[&(0, 0)].finish(), full.get(0, 0));
    assert_eq!(merged[&(0, 1)].finish(), full.get(0, 1));
}

proptest! {
    #[test]
    fn test_transpose_is_involution(block in arb_block(6)) {
        prop_assert_eq!(block.transpose().transpose(), block);
    }

    #[test]
    fn test_plus_commutes(a in arb_block(4)) {
        let b = a.scalar_op(2.0, ValueFunction::Multiply, false);
        prop_assert_eq!(
            a.binary(&b, ValueFunction::Plus).unwrap(),
            b.binary(&a, ValueFunction::Plus).unwrap()
        );
    }

    #[test]
    fn test_rbind_via_transposed_cbind(a in arb_block(5)) {
        let b = a.scalar_op(1.0, ValueFunction::Plus, false);
        let lhs = a.transpose().cbind(&b.transpose()).unwrap().transpose();
        prop_assert_eq!(lhs, a.rbind(&b).unwrap());
    }
}
