//! Seeded uniform random matrices.
//!
//! Every cell is drawn from a counter-based generator keyed by the seed and
//! the cell's global row-major position, so any row range of a matrix can be
//! generated on its own and still match the whole matrix cell for cell.

use std::ops::Range;

use common_error::{MantisError, MantisResult};
use serde::{Deserialize, Serialize};

use crate::block::MatrixBlock;

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Parameters of a uniform random matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandSpec {
    pub min: f64,
    pub max: f64,
    /// Fraction of cells that are non-zero, in `[0, 1]`.
    pub sparsity: f64,
    pub seed: u64,
}

impl RandSpec {
    pub fn new(min: f64, max: f64, sparsity: f64, seed: u64) -> MantisResult<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(MantisError::value_error(format!(
                "rand requires min <= max, got min={min} max={max}"
            )));
        }
        if !(0.0..=1.0).contains(&sparsity) {
            return Err(MantisError::value_error(format!(
                "rand sparsity must be in [0, 1], got {sparsity}"
            )));
        }
        Ok(Self {
            min,
            max,
            sparsity,
            seed,
        })
    }

    /// Value of the cell at global row-major position `index`.
    pub fn cell(&self, index: u64) -> f64 {
        let state = self.seed ^ mix(index.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA));
        if self.sparsity < 1.0 && unit(mix(state ^ GOLDEN_GAMMA)) >= self.sparsity {
            return 0.0;
        }
        self.min + (self.max - self.min) * unit(mix(state))
    }
}

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Top 53 bits as a double in `[0, 1)`.
fn unit(bits: u64) -> f64 {
    (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

impl MatrixBlock {
    /// Rows `rows` of a random matrix with `cols` columns.
    pub fn rand(rows: Range<usize>, cols: usize, spec: &RandSpec) -> MatrixBlock {
        let n = rows.len();
        let values = rows
            .flat_map(|i| (0..cols).map(move |j| (i * cols + j) as u64))
            .map(|index| spec.cell(index))
            .collect();
        MatrixBlock {
            rows: n,
            cols,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_matrix() {
        let spec = RandSpec::new(0.0, 1.0, 1.0, 7).unwrap();
        let a = MatrixBlock::rand(0..3, 100, &spec);
        let b = MatrixBlock::rand(0..3, 100, &spec);
        assert!(a.bit_eq(&b));
        assert!(a.values().iter().all(|v| (0.0..1.0).contains(v)));

        let other = MatrixBlock::rand(0..3, 100, &RandSpec { seed: 8, ..spec });
        assert!(!a.bit_eq(&other));
    }

    #[test]
    fn test_row_ranges_match_whole_matrix() {
        let spec = RandSpec::new(-2.0, 5.0, 0.5, 42).unwrap();
        let whole = MatrixBlock::rand(0..7, 4, &spec);
        let top = MatrixBlock::rand(0..3, 4, &spec);
        let bottom = MatrixBlock::rand(3..7, 4, &spec);
        assert!(top.rbind(&bottom).unwrap().bit_eq(&whole));
    }

    #[test]
    fn test_sparsity_and_bounds() {
        let spec = RandSpec::new(1.0, 2.0, 0.3, 3).unwrap();
        let m = MatrixBlock::rand(0..100, 100, &spec);
        let fraction = m.nnz() as f64 / 10_000.0;
        assert!((fraction - 0.3).abs() < 0.05, "{fraction}");
        assert!(m.values().iter().all(|v| *v == 0.0 || (1.0..2.0).contains(v)));

        let empty = RandSpec::new(1.0, 2.0, 0.0, 3).unwrap();
        assert_eq!(MatrixBlock::rand(0..5, 5, &empty).nnz(), 0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RandSpec::new(1.0, 0.0, 1.0, 0).is_err());
        assert!(RandSpec::new(0.0, 1.0, 1.5, 0).is_err());
        assert!(RandSpec::new(0.0, f64::NAN, 1.0, 0).is_err());
    }
}
