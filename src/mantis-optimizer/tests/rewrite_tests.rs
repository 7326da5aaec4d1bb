//! Pipeline tests over programs built from the front-end AST.

use common_config::{CompilerConfig, ExecutionPlatform};
use common_error::ErrorKind;
use mantis_core::{
    DataType, ExecType, MatrixCharacteristics, ScalarValue, ValueFunction, ValueType,
};
use mantis_logical::{
    DataOpKind, HopDag, HopKind, LogicalBlock, LogicalProgram, ProgramBuilder,
    ast::{Expr, ProgramAst, Statement},
};
use mantis_optimizer::{Optimizer, optimize};
use proptest::prelude::*;

fn build(statements: Vec<Statement>) -> LogicalProgram {
    ProgramBuilder::new(1000)
        .build(&ProgramAst::straight_line(statements))
        .unwrap()
}

fn only_dag(program: &LogicalProgram) -> &HopDag {
    match &program.blocks[0] {
        LogicalBlock::Basic(dag) => dag,
        other => panic!("expected a basic block, got {other:?}"),
    }
}

/// Operator names with their shapes, independent of node ids.
fn signature(dag: &HopDag) -> Vec<String> {
    let mut sig: Vec<String> = dag
        .hops()
        .map(|h| format!("{} [{},{}] {:?}", h.name(), h.chars.rows, h.chars.cols, h.exec_type))
        .collect();
    sig.sort();
    sig
}

#[test]
fn test_transposed_cbind_matches_rbind() {
    let config = CompilerConfig::default();
    let mut rewritten = build(vec![Statement::assign(
        "C",
        Expr::transpose(Expr::cbind(
            Expr::transpose(Expr::read("A", 4, 3)),
            Expr::transpose(Expr::read("B", 5, 3)),
        )),
    )]);
    let mut direct = build(vec![Statement::assign(
        "C",
        Expr::rbind(Expr::read("A", 4, 3), Expr::read("B", 5, 3)),
    )]);
    optimize(&mut rewritten, &config).unwrap();
    optimize(&mut direct, &config).unwrap();

    let dag = only_dag(&rewritten);
    assert_eq!(signature(dag), signature(only_dag(&direct)));
    let root = dag.roots()[0];
    assert_eq!(dag[root].chars.rows, 9);
    assert_eq!(dag[root].chars.cols, 3);
}

#[test]
fn test_non_conformable_binary_is_structural() {
    let mut dag = HopDag::new();
    let mut reads = Vec::new();
    for (name, n) in [("A", 3), ("B", 4)] {
        let id = dag.add_hop(
            HopKind::Data {
                op: DataOpKind::PersistentRead,
                name: name.into(),
            },
            DataType::Matrix,
            ValueType::Double,
            vec![],
        );
        dag[id].chars = MatrixCharacteristics::new(n, n, 1000, 1000);
        reads.push(id);
    }
    let plus = dag.add_hop(
        HopKind::Binary(ValueFunction::Plus),
        DataType::Matrix,
        ValueType::Double,
        reads,
    );
    dag.add_root(plus);

    let err = Optimizer::default().optimize(dag).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn test_budget_decides_backend() {
    let statements = vec![Statement::assign(
        "C",
        Expr::binary(
            ValueFunction::Plus,
            Expr::read("A", 2000, 2000),
            Expr::read("B", 2000, 2000),
        ),
    )];
    let small = CompilerConfig::default().with_local_memory_budget(1 << 20);
    let mut program = build(statements.clone());
    optimize(&mut program, &small).unwrap();
    let dag = only_dag(&program);
    let plus = dag.hops().find(|h| h.name() == "b(+)").unwrap();
    assert_eq!(plus.exec_type, Some(ExecType::Collection));

    let single = small.with_platform(ExecutionPlatform::SingleNode);
    let mut program = build(statements);
    optimize(&mut program, &single).unwrap();
    let plus = only_dag(&program).hops().find(|h| h.name() == "b(+)").unwrap();
    assert_eq!(plus.exec_type, Some(ExecType::ControlProgram));
}

#[test]
fn test_scalar_statements_fold() {
    let mut program = build(vec![Statement::assign(
        "x",
        Expr::binary(ValueFunction::Plus, Expr::literal(2i64), Expr::literal(3i64)),
    )]);
    let applied = Optimizer::default().optimize_program(&mut program).unwrap();
    assert!(applied > 0);
    let dag = only_dag(&program);
    assert_eq!(dag.len(), 2);
    let root = dag.roots()[0];
    assert_eq!(dag.input(root, 0).literal(), Some(&ScalarValue::Int(5)));
}

proptest! {
    #[test]
    fn test_optimizing_twice_is_stable(rows in 1i64..50, cols in 1i64..50) {
        let mut program = build(vec![
            Statement::assign("T", Expr::transpose(Expr::transpose(Expr::read("A", rows, cols)))),
            Statement::assign(
                "C",
                Expr::binary(ValueFunction::Multiply, Expr::matrix("T"), Expr::matrix("T")),
            ),
        ]);
        let config = CompilerConfig::default();
        optimize(&mut program, &config).unwrap();
        let first = signature(only_dag(&program));
        let applied = optimize(&mut program, &config).unwrap();
        prop_assert_eq!(applied, 0);
        prop_assert_eq!(first, signature(only_dag(&program)));
    }
}
