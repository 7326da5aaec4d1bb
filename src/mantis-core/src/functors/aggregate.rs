//! Aggregate functions and their accumulator state.

use common_error::{MantisError, MantisResult};
use serde::{Deserialize, Serialize};

use super::IndexFunction;

/// Aggregation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// Kahan-compensated sum.
    Sum,
    Min,
    Max,
    Mean,
}

/// Which axis an aggregate collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateDirection {
    /// Full aggregate to a scalar.
    All,
    /// Per-row aggregate (`rowSums`), output `rows x 1`.
    Row,
    /// Per-column aggregate (`colSums`), output `1 x cols`.
    Col,
    /// Diagonal aggregate (`trace`).
    Diag,
}

impl AggregateDirection {
    /// Index function implementing this direction.
    pub const fn index_function(&self) -> IndexFunction {
        match self {
            Self::All => IndexFunction::ReduceAll,
            Self::Row => IndexFunction::ReduceCol,
            Self::Col => IndexFunction::ReduceRow,
            Self::Diag => IndexFunction::ReduceDiag,
        }
    }

    /// Check if the result is a scalar.
    pub const fn yields_scalar(&self) -> bool {
        matches!(self, Self::All | Self::Diag)
    }
}

impl AggregateFunction {
    /// Opcode for this function along `direction`, e.g. `uark+` for row sums.
    pub fn opcode(&self, direction: AggregateDirection) -> MantisResult<String> {
        let base = match self {
            Self::Sum => "k+",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
        };
        let prefix = match direction {
            AggregateDirection::All => "uak",
            AggregateDirection::Row => "uar",
            AggregateDirection::Col => "uac",
            AggregateDirection::Diag => {
                if *self == Self::Sum {
                    return Ok("uaktrace".to_string());
                }
                return Err(MantisError::not_implemented(format!(
                    "diagonal aggregate of {base}"
                )));
            }
        };
        // "uak" + "k+" collapses to "uak+"; other functions drop the k.
        Ok(match (prefix, base) {
            ("uak", "k+") => "uak+".to_string(),
            ("uak", other) => format!("ua{other}"),
            (p, "k+") => format!("{p}k+"),
            (p, other) => format!("{p}{other}"),
        })
    }

    /// Parse an aggregate opcode into function and direction.
    pub fn from_opcode(opcode: &str) -> MantisResult<(Self, AggregateDirection)> {
        use AggregateDirection::*;
        Ok(match opcode {
            "uak+" => (Self::Sum, All),
            "uark+" => (Self::Sum, Row),
            "uack+" => (Self::Sum, Col),
            "uaktrace" => (Self::Sum, Diag),
            "uamin" => (Self::Min, All),
            "uarmin" => (Self::Min, Row),
            "uacmin" => (Self::Min, Col),
            "uamax" => (Self::Max, All),
            "uarmax" => (Self::Max, Row),
            "uacmax" => (Self::Max, Col),
            "uamean" => (Self::Mean, All),
            "uarmean" => (Self::Mean, Row),
            "uacmean" => (Self::Mean, Col),
            other => {
                return Err(MantisError::invalid_parameter(format!(
                    "unknown aggregate opcode '{other}'"
                )));
            }
        })
    }

    /// Fresh accumulator.
    pub fn init(&self) -> AggState {
        AggState {
            func: *self,
            value: match self {
                Self::Min => f64::INFINITY,
                Self::Max => f64::NEG_INFINITY,
                Self::Sum | Self::Mean => 0.0,
            },
            correction: 0.0,
            count: 0,
        }
    }
}

/// Running accumulator for one output cell.
///
/// Partial states from different partitions combine with [`AggState::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggState {
    pub func: AggregateFunction,
    pub value: f64,
    pub correction: f64,
    pub count: u64,
}

impl AggState {
    /// Fold one input value.
    pub fn accumulate(&mut self, v: f64) {
        match self.func {
            AggregateFunction::Sum | AggregateFunction::Mean => self.kahan_add(v, 0.0),
            AggregateFunction::Min => self.value = self.value.min(v),
            AggregateFunction::Max => self.value = self.value.max(v),
        }
        self.count += 1;
    }

    /// Merge another partial state.
    pub fn merge(&mut self, other: &AggState) {
        match self.func {
            AggregateFunction::Sum | AggregateFunction::Mean => {
                self.kahan_add(other.value, other.correction)
            }
            AggregateFunction::Min => self.value = self.value.min(other.value),
            AggregateFunction::Max => self.value = self.value.max(other.value),
        }
        self.count += other.count;
    }

    /// Final value.
    pub fn finish(&self) -> f64 {
        match self.func {
            AggregateFunction::Mean => {
                if self.count == 0 {
                    f64::NAN
                } else {
                    self.value / self.count as f64
                }
            }
            _ => self.value,
        }
    }

    fn kahan_add(&mut self, v: f64, v_correction: f64) {
        let y = v - (self.correction + v_correction);
        let t = self.value + y;
        self.correction = (t - self.value) - y;
        self.value = t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcodes() {
        let cases = [
            (AggregateFunction::Sum, AggregateDirection::All, "uak+"),
            (AggregateFunction::Sum, AggregateDirection::Row, "uark+"),
            (AggregateFunction::Sum, AggregateDirection::Col, "uack+"),
            (AggregateFunction::Sum, AggregateDirection::Diag, "uaktrace"),
            (AggregateFunction::Min, AggregateDirection::All, "uamin"),
            (AggregateFunction::Mean, AggregateDirection::Row, "uarmean"),
        ];
        for (f, d, op) in cases {
            assert_eq!(f.opcode(d).unwrap(), op);
            assert_eq!(AggregateFunction::from_opcode(op).unwrap(), (f, d));
        }
        assert!(AggregateFunction::Max.opcode(AggregateDirection::Diag).is_err());
    }

    #[test]
    fn test_merge_partials() {
        let mut a = AggregateFunction::Mean.init();
        let mut b = AggregateFunction::Mean.init();
        for v in [1.0, 2.0] {
            a.accumulate(v);
        }
        for v in [3.0, 4.0, 5.0] {
            b.accumulate(v);
        }
        a.merge(&b);
        assert_eq!(a.count, 5);
        assert!((a.finish() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_kahan_sum() {
        let mut s = AggregateFunction::Sum.init();
        s.accumulate(1.0);
        for _ in 0..10 {
            s.accumulate(1e-16);
        }
        // A naive sum stays at exactly 1.0 here.
        assert!(s.finish() > 1.0 + 5e-16);
    }

    #[test]
    fn test_direction_index_functions() {
        assert_eq!(
            AggregateDirection::Row.index_function(),
            IndexFunction::ReduceCol
        );
        assert_eq!(
            AggregateDirection::Diag.index_function(),
            IndexFunction::ReduceDiag
        );
    }
}
