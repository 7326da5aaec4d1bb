//! Matrix characteristics: dimensions, block sizes and non-zero counts.

use serde::{Deserialize, Serialize};

/// Sentinel for a dimension or count that is not known at compile time.
pub const UNKNOWN: i64 = -1;

/// Fixed per-block overhead assumed by the size estimates.
const BLOCK_HEADER_BYTES: u64 = 64;

/// Dimensions, blocking and sparsity metadata of a matrix.
///
/// Any field may be [`UNKNOWN`]. Scalars are described as `0 x 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixCharacteristics {
    /// Number of rows.
    pub rows: i64,
    /// Number of columns.
    pub cols: i64,
    /// Rows per block.
    pub rows_per_block: i64,
    /// Columns per block.
    pub cols_per_block: i64,
    /// Number of non-zero cells.
    pub nnz: i64,
}

impl MatrixCharacteristics {
    /// Characteristics with known dimensions and unknown non-zeros.
    pub const fn new(rows: i64, cols: i64, rows_per_block: i64, cols_per_block: i64) -> Self {
        Self {
            rows,
            cols,
            rows_per_block,
            cols_per_block,
            nnz: UNKNOWN,
        }
    }

    /// Fully unknown characteristics.
    pub const fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN, UNKNOWN)
    }

    /// Characteristics of a scalar.
    pub const fn scalar() -> Self {
        Self {
            rows: 0,
            cols: 0,
            rows_per_block: 0,
            cols_per_block: 0,
            nnz: 0,
        }
    }

    /// Set the non-zero count.
    #[must_use]
    pub const fn with_nnz(mut self, nnz: i64) -> Self {
        self.nnz = nnz;
        self
    }

    /// Set dimensions, keeping blocking.
    #[must_use]
    pub const fn with_dims(mut self, rows: i64, cols: i64) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    /// Set the block size.
    #[must_use]
    pub const fn with_blocking(mut self, rows_per_block: i64, cols_per_block: i64) -> Self {
        self.rows_per_block = rows_per_block;
        self.cols_per_block = cols_per_block;
        self
    }

    /// Check if both dimensions are known.
    pub const fn dims_known(&self) -> bool {
        self.rows >= 0 && self.cols >= 0
    }

    /// Check if the row count is known.
    pub const fn rows_known(&self) -> bool {
        self.rows >= 0
    }

    /// Check if the column count is known.
    pub const fn cols_known(&self) -> bool {
        self.cols >= 0
    }

    /// Check if the non-zero count is known.
    pub const fn nnz_known(&self) -> bool {
        self.nnz >= 0
    }

    /// Number of cells, if known.
    pub fn cells(&self) -> Option<u64> {
        if self.dims_known() {
            Some(self.rows as u64 * self.cols as u64)
        } else {
            None
        }
    }

    /// Sparsity from the non-zero count, falling back to `default`.
    pub fn sparsity_or(&self, default: f64) -> f64 {
        match self.cells() {
            Some(cells) if cells > 0 && self.nnz_known() => self.nnz as f64 / cells as f64,
            _ => default,
        }
    }

    /// Estimated in-memory size in bytes, or `None` if dimensions are unknown.
    pub fn estimate_size(&self, sparsity: f64) -> Option<u64> {
        let cells = self.cells()?;
        let data = (cells as f64 * sparsity.clamp(0.0, 1.0) * 8.0).ceil() as u64;
        Some(data + BLOCK_HEADER_BYTES)
    }

    /// Number of row blocks, if known.
    pub fn num_row_blocks(&self) -> Option<i64> {
        if self.rows_known() && self.rows_per_block > 0 {
            Some((self.rows + self.rows_per_block - 1) / self.rows_per_block)
        } else {
            None
        }
    }

    /// Number of column blocks, if known.
    pub fn num_col_blocks(&self) -> Option<i64> {
        if self.cols_known() && self.cols_per_block > 0 {
            Some((self.cols + self.cols_per_block - 1) / self.cols_per_block)
        } else {
            None
        }
    }
}

impl Default for MatrixCharacteristics {
    fn default() -> Self {
        Self::unknown()
    }
}

impl std::fmt::Display for MatrixCharacteristics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} x {}, blk {} x {}, nnz={}]",
            self.rows, self.cols, self.rows_per_block, self.cols_per_block, self.nnz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_dims() {
        let mc = MatrixCharacteristics::unknown();
        assert!(!mc.dims_known());
        assert_eq!(mc.cells(), None);
        assert_eq!(mc.estimate_size(1.0), None);
    }

    #[test]
    fn test_estimate_size() {
        let mc = MatrixCharacteristics::new(1000, 1000, 1000, 1000);
        assert_eq!(mc.estimate_size(1.0), Some(8_000_000 + 64));
        assert_eq!(mc.estimate_size(0.5), Some(4_000_000 + 64));
    }

    #[test]
    fn test_block_counts() {
        let mc = MatrixCharacteristics::new(2500, 999, 1000, 1000);
        assert_eq!(mc.num_row_blocks(), Some(3));
        assert_eq!(mc.num_col_blocks(), Some(1));
    }

    #[test]
    fn test_sparsity() {
        let mc = MatrixCharacteristics::new(10, 10, 10, 10).with_nnz(25);
        assert!((mc.sparsity_or(1.0) - 0.25).abs() < 1e-12);
        assert!((MatrixCharacteristics::new(10, 10, 10, 10).sparsity_or(0.7) - 0.7).abs() < 1e-12);
    }
}
