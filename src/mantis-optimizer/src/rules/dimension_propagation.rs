//! Dimension propagation rule.

use common_error::MantisResult;
use mantis_logical::{HopDag, propagate_characteristics};

use super::rule::{RewriteRule, Transformed};

/// Re-run bottom-up size inference so later rules and the cost model see
/// dimensions created by earlier rewrites.
pub struct DimensionPropagation {
    block_size: i64,
}

impl DimensionPropagation {
    pub fn new(block_size: i64) -> Self {
        Self { block_size }
    }
}

impl RewriteRule for DimensionPropagation {
    fn name(&self) -> &'static str {
        "DimensionPropagation"
    }

    fn description(&self) -> &'static str {
        "Propagate matrix dimensions bottom-up to a fixed point"
    }

    fn apply(&self, mut dag: HopDag) -> MantisResult<Transformed> {
        let changed = propagate_characteristics(&mut dag, self.block_size)?;
        Ok(Transformed::new(dag, changed))
    }
}
