//! Dense in-memory matrix blocks and the cell kernels that operate on them.

use common_error::{MantisError, MantisResult};
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::ops::Range;

use crate::functors::{
    AggState, AggregateDirection, AggregateFunction, IndexFunction, UnaryFunction, ValueFunction,
};

/// Fixed bookkeeping overhead added to every in-memory size estimate.
const BLOCK_OVERHEAD: usize = 64;

/// A dense, row-major matrix of doubles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixBlock {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) values: Vec<f64>,
}

impl MatrixBlock {
    /// All-zero matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Matrix with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            values: vec![value; rows * cols],
        }
    }

    /// Wrap row-major values.
    pub fn from_vec(rows: usize, cols: usize, values: Vec<f64>) -> MantisResult<Self> {
        if values.len() != rows * cols {
            return Err(MantisError::value_error(format!(
                "expected {} values for a {rows} x {cols} matrix, got {}",
                rows * cols,
                values.len()
            )));
        }
        Ok(Self { rows, cols, values })
    }

    /// Build from nested rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> MantisResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(MantisError::value_error(format!(
                    "row {i} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major cell values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Consume the block, returning its row-major values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Cell value. Panics on out-of-range coordinates.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// Set a cell. Panics on out-of-range coordinates.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.cols + col] = value;
    }

    /// Number of non-zero cells.
    pub fn nnz(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }

    /// In-memory footprint in bytes.
    pub fn in_memory_size(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>() + BLOCK_OVERHEAD
    }

    /// Row-major rows as nested vectors.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.values.chunks(self.cols).map(<[f64]>::to_vec).collect()
    }

    /// Check if both blocks hold bit-identical cells.
    pub fn bit_eq(&self, other: &MatrixBlock) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    // ------------------------------------------------------------------
    // Kernels
    // ------------------------------------------------------------------

    /// Cell-wise binary operation between two matrices of equal shape.
    ///
    /// A `1 x 1` operand, a single row or a single column is broadcast.
    pub fn binary(&self, other: &MatrixBlock, f: ValueFunction) -> MantisResult<MatrixBlock> {
        let (rows, cols) = broadcast_shape(self, other)?;
        let mut out = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                out.push(f.execute(self.broadcast_get(i, j), other.broadcast_get(i, j)));
            }
        }
        Ok(MatrixBlock {
            rows,
            cols,
            values: out,
        })
    }

    /// Matrix-scalar operation. With `scalar_left` the scalar is the left operand.
    pub fn scalar_op(&self, scalar: f64, f: ValueFunction, scalar_left: bool) -> MatrixBlock {
        let values = self
            .values
            .iter()
            .map(|v| {
                if scalar_left {
                    f.execute(scalar, *v)
                } else {
                    f.execute(*v, scalar)
                }
            })
            .collect();
        MatrixBlock {
            rows: self.rows,
            cols: self.cols,
            values,
        }
    }

    /// Cell-wise unary operation.
    pub fn unary(&self, f: UnaryFunction, strict: bool) -> MantisResult<MatrixBlock> {
        let values = self
            .values
            .iter()
            .map(|v| f.execute(*v, strict))
            .collect::<MantisResult<Vec<_>>>()?;
        Ok(MatrixBlock {
            rows: self.rows,
            cols: self.cols,
            values,
        })
    }

    /// Unary aggregate along `direction`.
    ///
    /// Returns the aggregated block; scalar directions yield `1 x 1`.
    pub fn aggregate(
        &self,
        func: AggregateFunction,
        direction: AggregateDirection,
    ) -> MantisResult<MatrixBlock> {
        if direction == AggregateDirection::Diag && self.rows != self.cols {
            return Err(MantisError::structural(format!(
                "trace requires a square matrix, got {} x {}",
                self.rows, self.cols
            )));
        }
        let index = direction.index_function();
        let partials = self.partial_aggregate(func, index, 0, 0);
        let (rows, cols) = index.compute_dimension(self.rows as i64, self.cols as i64);
        let (rows, cols) = (rows as usize, cols as usize);
        let mut out = MatrixBlock::new(rows, cols);
        for ((i, j), state) in partials {
            out.set(i, j, state.finish());
        }
        Ok(out)
    }

    /// Per-output-cell accumulator states, keyed by output coordinates.
    ///
    /// `row_offset`/`col_offset` place this block inside a larger matrix so
    /// partials from several blocks can be merged.
    pub fn partial_aggregate(
        &self,
        func: AggregateFunction,
        index: IndexFunction,
        row_offset: usize,
        col_offset: usize,
    ) -> Vec<((usize, usize), AggState)> {
        let mut map: BTreeMap<(usize, usize), AggState> = BTreeMap::new();
        for i in 0..self.rows {
            for j in 0..self.cols {
                if let Some(key) = index.map_cell(i + row_offset, j + col_offset) {
                    map.entry(key)
                        .or_insert_with(|| func.init())
                        .accumulate(self.get(i, j));
                }
            }
        }
        map.into_iter().collect()
    }

    /// Matrix multiplication.
    pub fn matmult(&self, other: &MatrixBlock) -> MantisResult<MatrixBlock> {
        if self.cols != other.rows {
            return Err(MantisError::structural(format!(
                "non-conformable matrix multiply: {} x {} %*% {} x {}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = MatrixBlock::new(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out.values[i * other.cols + j] += a * other.get(k, j);
                }
            }
        }
        Ok(out)
    }

    /// `t(self) %*% other` without materializing the transpose.
    pub fn transpose_self_matmult(&self, other: &MatrixBlock) -> MantisResult<MatrixBlock> {
        if self.rows != other.rows {
            return Err(MantisError::structural(format!(
                "non-conformable zip multiply: t({} x {}) %*% {} x {}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = MatrixBlock::new(self.cols, other.cols);
        for k in 0..self.rows {
            for i in 0..self.cols {
                let a = self.get(k, i);
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out.values[i * other.cols + j] += a * other.get(k, j);
                }
            }
        }
        Ok(out)
    }

    /// Transpose.
    pub fn transpose(&self) -> MatrixBlock {
        let mut out = MatrixBlock::new(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.set(j, i, self.get(i, j));
            }
        }
        out
    }

    /// `diag`: a column vector becomes a diagonal matrix, a square matrix
    /// yields its diagonal as a column vector.
    pub fn diag(&self) -> MantisResult<MatrixBlock> {
        if self.cols == 1 {
            let n = self.rows;
            let mut out = MatrixBlock::new(n, n);
            for i in 0..n {
                out.set(i, i, self.get(i, 0));
            }
            Ok(out)
        } else if self.rows == self.cols {
            let values = (0..self.rows).map(|i| self.get(i, i)).collect();
            Ok(MatrixBlock {
                rows: self.rows,
                cols: 1,
                values,
            })
        } else {
            Err(MantisError::structural(format!(
                "diag requires a column vector or square matrix, got {} x {}",
                self.rows, self.cols
            )))
        }
    }

    /// Column-wise append.
    pub fn cbind(&self, other: &MatrixBlock) -> MantisResult<MatrixBlock> {
        if self.rows != other.rows {
            return Err(MantisError::structural(format!(
                "cbind row mismatch: {} vs {}",
                self.rows, other.rows
            )));
        }
        let cols = self.cols + other.cols;
        let mut values = Vec::with_capacity(self.rows * cols);
        for i in 0..self.rows {
            values.extend_from_slice(&self.values[i * self.cols..(i + 1) * self.cols]);
            values.extend_from_slice(&other.values[i * other.cols..(i + 1) * other.cols]);
        }
        Ok(MatrixBlock {
            rows: self.rows,
            cols,
            values,
        })
    }

    /// Row-wise append.
    pub fn rbind(&self, other: &MatrixBlock) -> MantisResult<MatrixBlock> {
        if self.cols != other.cols {
            return Err(MantisError::structural(format!(
                "rbind column mismatch: {} vs {}",
                self.cols, other.cols
            )));
        }
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Ok(MatrixBlock {
            rows: self.rows + other.rows,
            cols: self.cols,
            values,
        })
    }

    /// Zero-based, end-exclusive sub-matrix.
    pub fn slice(&self, rows: Range<usize>, cols: Range<usize>) -> MantisResult<MatrixBlock> {
        if rows.end > self.rows
            || cols.end > self.cols
            || rows.start > rows.end
            || cols.start > cols.end
        {
            return Err(MantisError::value_error(format!(
                "slice [{}..{}, {}..{}] out of bounds for {} x {}",
                rows.start, rows.end, cols.start, cols.end, self.rows, self.cols
            )));
        }
        let out_cols = cols.len();
        let mut values = Vec::with_capacity(rows.len() * out_cols);
        for i in rows.clone() {
            let base = i * self.cols;
            values.extend_from_slice(&self.values[base + cols.start..base + cols.end]);
        }
        Ok(MatrixBlock {
            rows: rows.len(),
            cols: out_cols,
            values,
        })
    }

    /// Copy `block` into this matrix starting at `(row, col)`.
    pub fn copy_from(&mut self, row: usize, col: usize, block: &MatrixBlock) -> MantisResult<()> {
        if row + block.rows > self.rows || col + block.cols > self.cols {
            return Err(MantisError::value_error(format!(
                "{} x {} block at ({row}, {col}) exceeds {} x {}",
                block.rows, block.cols, self.rows, self.cols
            )));
        }
        for i in 0..block.rows {
            let dst = (row + i) * self.cols + col;
            self.values[dst..dst + block.cols]
                .copy_from_slice(&block.values[i * block.cols..(i + 1) * block.cols]);
        }
        Ok(())
    }

    #[inline]
    fn broadcast_get(&self, i: usize, j: usize) -> f64 {
        let r = if self.rows == 1 { 0 } else { i };
        let c = if self.cols == 1 { 0 } else { j };
        self.get(r, c)
    }
}

fn broadcast_shape(a: &MatrixBlock, b: &MatrixBlock) -> MantisResult<(usize, usize)> {
    let dim = |x: usize, y: usize| -> Option<usize> {
        if x == y {
            Some(x)
        } else if x == 1 {
            Some(y)
        } else if y == 1 {
            Some(x)
        } else {
            None
        }
    };
    match (dim(a.rows, b.rows), dim(a.cols, b.cols)) {
        (Some(r), Some(c)) => Ok((r, c)),
        _ => Err(MantisError::structural(format!(
            "non-conformable operands: {} x {} and {} x {}",
            a.rows, a.cols, b.rows, b.cols
        ))),
    }
}

impl std::fmt::Display for MatrixBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.rows {
            for j in 0..self.cols {
                if j > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", self.get(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
