//! Index functions: how an input cell position maps to an output position.

use serde::{Deserialize, Serialize};

/// Maps input cell coordinates to output coordinates.
///
/// Aggregations pair one of these with an [`AggregateFunction`](super::AggregateFunction);
/// reorganizations use [`IndexFunction::SwapIndex`] alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexFunction {
    /// Every cell maps to `(0, 0)`.
    ReduceAll,
    /// Collapse rows: cell `(i, j)` maps to `(0, j)`. Output is `1 x cols`.
    ReduceRow,
    /// Collapse columns: cell `(i, j)` maps to `(i, 0)`. Output is `rows x 1`.
    ReduceCol,
    /// Keep only the diagonal and collapse it to `(0, 0)`. Output is `1 x 1`.
    ReduceDiag,
    /// Transpose: `(i, j)` maps to `(j, i)`.
    SwapIndex,
}

impl IndexFunction {
    /// Output dimensions for an input of `rows x cols`.
    ///
    /// Unknown (negative) input dimensions propagate where the output depends
    /// on them.
    pub const fn compute_dimension(&self, rows: i64, cols: i64) -> (i64, i64) {
        match self {
            Self::ReduceAll | Self::ReduceDiag => (1, 1),
            Self::ReduceRow => (1, cols),
            Self::ReduceCol => (rows, 1),
            Self::SwapIndex => (cols, rows),
        }
    }

    /// Map one cell. Returns `None` when the cell does not contribute.
    pub const fn map_cell(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        match self {
            Self::ReduceAll => Some((0, 0)),
            Self::ReduceRow => Some((0, col)),
            Self::ReduceCol => Some((row, 0)),
            Self::ReduceDiag => {
                if row == col {
                    Some((0, 0))
                } else {
                    None
                }
            }
            Self::SwapIndex => Some((col, row)),
        }
    }
}
