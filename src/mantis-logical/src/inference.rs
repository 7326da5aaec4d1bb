//! Bottom-up size inference over a [`HopDag`].
//!
//! A node's dimensions are derived from its inputs once those are known.
//! Propagation only ever fills unknown fields, so repeated runs reach a
//! fixed point and never change a dimension that is already known.

use common_error::{MantisError, MantisResult};
use mantis_core::{AggregateDirection, MatrixCharacteristics, UNKNOWN, ValueFunction};

use crate::dag::HopDag;
use crate::hop::{AppendKind, DataOpKind, Hop, HopId, HopKind, ReorgOp};

/// Run inference over every reachable node. Returns whether anything changed.
pub fn propagate_characteristics(dag: &mut HopDag, block_size: i64) -> MantisResult<bool> {
    let mut changed = false;
    for id in dag.topo_order()? {
        let (inferred, sparsity) = infer(dag, id, block_size)?;
        let hop = &mut dag[id];
        changed |= merge(hop, inferred)?;
        if (hop.sparsity - sparsity).abs() > f64::EPSILON && !hop.kind.is_data() {
            hop.sparsity = sparsity;
        }
    }
    Ok(changed)
}

/// Characteristics and sparsity estimate for one node from its inputs.
pub fn infer(
    dag: &HopDag,
    id: HopId,
    block_size: i64,
) -> MantisResult<(MatrixCharacteristics, f64)> {
    let hop = &dag[id];
    if hop.is_scalar() {
        return Ok((MatrixCharacteristics::scalar(), 1.0));
    }
    let input = |i: usize| dag.input(id, i);
    let blocked = |rows: i64, cols: i64| MatrixCharacteristics::new(rows, cols, block_size, block_size);

    let out = match &hop.kind {
        HopKind::Data { op, .. } => match op {
            DataOpKind::TransientWrite => {
                let src = input(0);
                (src.chars, src.sparsity)
            }
            DataOpKind::TransientRead | DataOpKind::PersistentRead => (hop.chars, hop.sparsity),
        },
        HopKind::Literal(_) => (MatrixCharacteristics::scalar(), 1.0),
        HopKind::Unary(f) => {
            let src = input(0);
            let mut mc = src.chars;
            if f.is_sparse_safe() {
                (mc, src.sparsity)
            } else {
                mc.nnz = UNKNOWN;
                (mc, 1.0)
            }
        }
        HopKind::Binary(f) => infer_binary(hop, input(0), input(1), *f, block_size)?,
        HopKind::Aggregate { direction, .. } => {
            let src = input(0);
            let (r, c) = (src.chars.rows, src.chars.cols);
            if *direction == AggregateDirection::Diag && r >= 0 && c >= 0 && r != c {
                return Err(MantisError::structural(format!(
                    "trace requires a square matrix, got {r} x {c}"
                )));
            }
            let (rows, cols) = direction.index_function().compute_dimension(r, c);
            (blocked(rows, cols), 1.0)
        }
        HopKind::AggregateBinary => {
            let (a, b) = (input(0), input(1));
            if a.chars.cols_known() && b.chars.rows_known() && a.chars.cols != b.chars.rows {
                return Err(MantisError::structural(format!(
                    "non-conformable matrix multiply: {} x {} %*% {} x {}",
                    a.chars.rows, a.chars.cols, b.chars.rows, b.chars.cols
                )));
            }
            let common = a.chars.cols.max(1) as f64;
            let sparsity = (a.sparsity * b.sparsity * common).min(1.0);
            (blocked(a.chars.rows, b.chars.cols), sparsity)
        }
        HopKind::Indexing => infer_indexing(dag, id, block_size)?,
        HopKind::DataGen => infer_datagen(dag, id, block_size)?,
        // Scalar valued, handled above.
        HopKind::Dimension(_) => (MatrixCharacteristics::scalar(), 1.0),
        HopKind::Reorg(ReorgOp::Transpose) => {
            let src = input(0);
            let mc = blocked(src.chars.cols, src.chars.rows).with_nnz(src.chars.nnz);
            (mc, src.sparsity)
        }
        HopKind::Reorg(ReorgOp::Diag) => {
            let src = input(0);
            let (r, c) = (src.chars.rows, src.chars.cols);
            if c == 1 {
                (blocked(r, r), 1.0 / (r.max(1) as f64))
            } else if r >= 0 && r == c {
                (blocked(r, 1), 1.0)
            } else if r >= 0 && c >= 0 {
                return Err(MantisError::structural(format!(
                    "diag requires a column vector or square matrix, got {r} x {c}"
                )));
            } else {
                (MatrixCharacteristics::unknown(), 1.0)
            }
        }
        HopKind::Append(kind) => {
            let (a, b) = (input(0), input(1));
            let (same_a, same_b, sum_a, sum_b) = match kind {
                AppendKind::CBind => (a.chars.rows, b.chars.rows, a.chars.cols, b.chars.cols),
                AppendKind::RBind => (a.chars.cols, b.chars.cols, a.chars.rows, b.chars.rows),
            };
            if same_a >= 0 && same_b >= 0 && same_a != same_b {
                return Err(MantisError::structural(format!(
                    "{} dimension mismatch: {same_a} vs {same_b}",
                    kind.opcode()
                )));
            }
            let same = same_a.max(same_b);
            let sum = if sum_a >= 0 && sum_b >= 0 {
                sum_a + sum_b
            } else {
                UNKNOWN
            };
            let mc = match kind {
                AppendKind::CBind => blocked(same, sum),
                AppendKind::RBind => blocked(sum, same),
            };
            let nnz = if a.chars.nnz_known() && b.chars.nnz_known() {
                a.chars.nnz + b.chars.nnz
            } else {
                UNKNOWN
            };
            (mc.with_nnz(nnz), a.sparsity.max(b.sparsity))
        }
    };
    Ok(out)
}

fn infer_binary(
    hop: &Hop,
    a: &Hop,
    b: &Hop,
    f: ValueFunction,
    block_size: i64,
) -> MantisResult<(MatrixCharacteristics, f64)> {
    let sparsity = match f {
        ValueFunction::Multiply | ValueFunction::And => a.sparsity.min(b.sparsity),
        ValueFunction::Plus | ValueFunction::Minus | ValueFunction::Or => {
            (a.sparsity + b.sparsity).min(1.0)
        }
        _ => 1.0,
    };
    match (a.is_matrix(), b.is_matrix()) {
        (true, true) => {
            let rows = conform(a.chars.rows, b.chars.rows);
            let cols = conform(a.chars.cols, b.chars.cols);
            match (rows, cols) {
                (Some(r), Some(c)) => Ok((
                    MatrixCharacteristics::new(r, c, block_size, block_size),
                    sparsity,
                )),
                _ => Err(MantisError::structural(format!(
                    "non-conformable operands for {}: {} x {} and {} x {}",
                    hop.name(),
                    a.chars.rows,
                    a.chars.cols,
                    b.chars.rows,
                    b.chars.cols
                ))),
            }
        }
        (true, false) => Ok((a.chars.with_nnz(UNKNOWN), scalar_sparsity(f, a.sparsity))),
        (false, true) => Ok((b.chars.with_nnz(UNKNOWN), scalar_sparsity(f, b.sparsity))),
        (false, false) => Ok((MatrixCharacteristics::scalar(), 1.0)),
    }
}

fn scalar_sparsity(f: ValueFunction, matrix_sparsity: f64) -> f64 {
    if matches!(f, ValueFunction::Multiply | ValueFunction::Divide) {
        matrix_sparsity
    } else {
        1.0
    }
}

/// Output extent of one dimension under broadcasting. `None` if non-conformable.
fn conform(x: i64, y: i64) -> Option<i64> {
    if x < 0 || y < 0 {
        // One side unknown: take the known non-vector side if any.
        return Some(if x > 1 { x } else if y > 1 { y } else { UNKNOWN });
    }
    if x == y {
        Some(x)
    } else if x == 1 {
        Some(y)
    } else if y == 1 {
        Some(x)
    } else {
        None
    }
}

fn infer_indexing(
    dag: &HopDag,
    id: HopId,
    block_size: i64,
) -> MantisResult<(MatrixCharacteristics, f64)> {
    let src = dag.input(id, 0);
    let bound = |i: usize| -> MantisResult<Option<i64>> {
        match dag.input(id, i).literal() {
            Some(v) => v.as_i64().map(Some),
            None => Ok(None),
        }
    };
    let (rl, ru, cl, cu) = (bound(1)?, bound(2)?, bound(3)?, bound(4)?);
    let extent = |lo: Option<i64>, hi: Option<i64>, max: i64, what: &str| -> MantisResult<i64> {
        match (lo, hi) {
            (Some(lo), Some(hi)) => {
                if lo < 1 || hi < lo || (max >= 0 && hi > max) {
                    return Err(MantisError::structural(format!(
                        "{what} index range [{lo}:{hi}] out of bounds for extent {max}"
                    )));
                }
                Ok(hi - lo + 1)
            }
            _ => Ok(UNKNOWN),
        }
    };
    let rows = extent(rl, ru, src.chars.rows, "row")?;
    let cols = extent(cl, cu, src.chars.cols, "column")?;
    Ok((
        MatrixCharacteristics::new(rows, cols, block_size, block_size),
        src.sparsity,
    ))
}

fn infer_datagen(
    dag: &HopDag,
    id: HopId,
    block_size: i64,
) -> MantisResult<(MatrixCharacteristics, f64)> {
    let extent = |i: usize, what: &str| -> MantisResult<i64> {
        match dag.input(id, i).literal() {
            Some(v) => {
                let n = v.as_i64()?;
                if n < 0 {
                    return Err(MantisError::structural(format!(
                        "rand with negative {what} {n}"
                    )));
                }
                Ok(n)
            }
            None => Ok(UNKNOWN),
        }
    };
    let (rows, cols) = (extent(0, "rows")?, extent(1, "cols")?);
    let sparsity = match dag.input(id, 4).literal() {
        Some(v) => v.as_f64()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    let nnz = if rows >= 0 && cols >= 0 {
        (rows as f64 * cols as f64 * sparsity).round() as i64
    } else {
        UNKNOWN
    };
    Ok((
        MatrixCharacteristics::new(rows, cols, block_size, block_size).with_nnz(nnz),
        sparsity,
    ))
}

/// Fill unknown fields of `hop.chars` from `inferred`.
fn merge(hop: &mut Hop, inferred: MatrixCharacteristics) -> MantisResult<bool> {
    let mc = &mut hop.chars;
    let mut changed = false;
    for (current, new, what) in [
        (&mut mc.rows, inferred.rows, "rows"),
        (&mut mc.cols, inferred.cols, "cols"),
    ] {
        if *current < 0 && new >= 0 {
            *current = new;
            changed = true;
        } else if *current >= 0 && new >= 0 && *current != new {
            return Err(MantisError::structural(format!(
                "inconsistent {what} for {}: {} vs inferred {}",
                hop.kind.name(),
                current,
                new
            )));
        }
    }
    for (current, new) in [
        (&mut mc.rows_per_block, inferred.rows_per_block),
        (&mut mc.cols_per_block, inferred.cols_per_block),
        (&mut mc.nnz, inferred.nnz),
    ] {
        if *current < 0 && new >= 0 {
            *current = new;
            changed = true;
        }
    }
    Ok(changed)
}
