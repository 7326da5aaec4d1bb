//! Constant folding rule.
//!
//! Evaluate scalar operators over literal inputs at compile time, and
//! dimension built-ins over matrices whose shape is already known.

use common_error::MantisResult;
use log::debug;
use mantis_core::{DataType, ScalarValue};
use mantis_logical::{HopDag, HopId, HopKind};

use super::rule::{RewriteRule, Transformed};

/// Constant folding rule.
///
/// # Legal When
///
/// - The operator is scalar-in, scalar-out
/// - Every input is a literal, or the operator is `nrow`, `ncol` or `length`
///   and the extent it asks for is known
/// - Evaluation succeeds; out-of-domain inputs are left for runtime so the
///   failure surfaces at the statement that causes it
pub struct ConstantFolding;

impl RewriteRule for ConstantFolding {
    fn name(&self) -> &'static str {
        "ConstantFolding"
    }

    fn description(&self) -> &'static str {
        "Evaluate constant scalar expressions at compile time"
    }

    fn apply(&self, mut dag: HopDag) -> MantisResult<Transformed> {
        let mut changed = false;
        for id in dag.topo_order()? {
            if !dag.contains(id) {
                continue;
            }
            if let Some(value) = fold(&dag, id) {
                debug!("Folded {} to literal {value}", dag[id].name());
                let lit = dag.add_hop(
                    HopKind::Literal(value.clone()),
                    DataType::Scalar,
                    value.value_type(),
                    vec![],
                );
                dag.replace_all_uses(id, lit);
                dag.remove_if_dead(id);
                changed = true;
            }
        }
        Ok(Transformed::new(dag, changed))
    }
}

fn fold(dag: &HopDag, id: HopId) -> Option<ScalarValue> {
    let hop = &dag[id];
    if !hop.is_scalar() {
        return None;
    }
    if let HopKind::Dimension(op) = hop.kind {
        let chars = dag.input(id, 0).chars;
        return op.evaluate(chars.rows, chars.cols).map(ScalarValue::Int);
    }
    let literals: Option<Vec<&ScalarValue>> = hop.inputs.iter().map(|i| dag[*i].literal()).collect();
    let literals = literals?;
    match (&hop.kind, literals.as_slice()) {
        (HopKind::Binary(f), [a, b]) => f.execute_scalar(a, b).ok(),
        (HopKind::Unary(f), [a]) => {
            let v = a.as_f64().ok()?;
            let out = f.execute(v, true).ok()?;
            Some(ScalarValue::from_f64(out, hop.value_type))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantis_core::{MatrixCharacteristics, UNKNOWN, UnaryFunction, ValueFunction, ValueType};
    use mantis_logical::{DataOpKind, DimensionOp};

    fn lit(dag: &mut HopDag, v: ScalarValue) -> HopId {
        let vt = v.value_type();
        dag.add_hop(HopKind::Literal(v), DataType::Scalar, vt, vec![])
    }

    #[test]
    fn test_fold_nested() {
        let mut dag = HopDag::new();
        let a = lit(&mut dag, ScalarValue::Int(2));
        let b = lit(&mut dag, ScalarValue::Int(3));
        let p = dag.add_hop(
            HopKind::Binary(ValueFunction::Multiply),
            DataType::Scalar,
            ValueType::Int,
            vec![a, b],
        );
        let n = dag.add_hop(
            HopKind::Unary(UnaryFunction::Negate),
            DataType::Scalar,
            ValueType::Int,
            vec![p],
        );
        dag.add_root(n);

        let result = ConstantFolding.apply(dag).unwrap();
        assert!(result.changed);
        let root = result.dag.roots()[0];
        assert_eq!(result.dag[root].literal(), Some(&ScalarValue::Int(-6)));
        assert_eq!(result.dag.len(), 1);
    }

    fn matrix(dag: &mut HopDag, rows: i64, cols: i64) -> HopId {
        let id = dag.add_hop(
            HopKind::Data {
                op: DataOpKind::PersistentRead,
                name: "A".into(),
            },
            DataType::Matrix,
            ValueType::Double,
            vec![],
        );
        dag[id].chars = MatrixCharacteristics::new(rows, cols, 1000, 1000);
        id
    }

    #[test]
    fn test_fold_known_dimensions() {
        let mut dag = HopDag::new();
        let a = matrix(&mut dag, 3, 4);
        let len = dag.add_hop(
            HopKind::Dimension(DimensionOp::Length),
            DataType::Scalar,
            ValueType::Int,
            vec![a],
        );
        dag.add_root(len);

        let result = ConstantFolding.apply(dag).unwrap();
        assert!(result.changed);
        let root = result.dag.roots()[0];
        assert_eq!(result.dag[root].literal(), Some(&ScalarValue::Int(12)));
    }

    #[test]
    fn test_unknown_rows_left_for_runtime() {
        let mut dag = HopDag::new();
        let a = matrix(&mut dag, UNKNOWN, 4);
        let mut dims = Vec::new();
        for op in [DimensionOp::Nrow, DimensionOp::Ncol] {
            let d = dag.add_hop(HopKind::Dimension(op), DataType::Scalar, ValueType::Int, vec![a]);
            dag.add_root(d);
            dims.push(d);
        }

        let result = ConstantFolding.apply(dag).unwrap();
        assert!(result.changed);
        let roots = result.dag.roots();
        assert_eq!(result.dag[roots[0]].kind, HopKind::Dimension(DimensionOp::Nrow));
        assert_eq!(result.dag[roots[1]].literal(), Some(&ScalarValue::Int(4)));
    }

    #[test]
    fn test_domain_error_not_folded() {
        let mut dag = HopDag::new();
        let a = lit(&mut dag, ScalarValue::Double(-4.0));
        let s = dag.add_hop(
            HopKind::Unary(UnaryFunction::Sqrt),
            DataType::Scalar,
            ValueType::Double,
            vec![a],
        );
        dag.add_root(s);

        let result = ConstantFolding.apply(dag).unwrap();
        assert!(!result.changed);
        assert_eq!(result.dag.len(), 2);
    }
}
