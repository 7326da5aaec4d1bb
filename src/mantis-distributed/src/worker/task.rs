//! Partition task execution.

use std::ops::Range;

use common_error::MantisResult;
use mantis_engine::kernels::{self, DataGenParams, IndexRange, StepValue};
use mantis_engine::physical::Operator;

/// One operator applied to one row partition.
#[derive(Debug, Clone)]
pub struct PartitionTask {
    /// Partition index within the job.
    partition_id: usize,
    /// Global rows covered by the partition.
    rows: Range<usize>,
    /// Rows of the partitioned matrices as a whole.
    total_rows: usize,
    op: Operator,
    /// Operands already sliced to this partition.
    operands: Vec<StepValue>,
    strict: bool,
}

impl PartitionTask {
    pub fn new(
        partition_id: usize,
        rows: Range<usize>,
        total_rows: usize,
        op: Operator,
        operands: Vec<StepValue>,
        strict: bool,
    ) -> Self {
        Self {
            partition_id,
            rows,
            total_rows,
            op,
            operands,
            strict,
        }
    }

    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    /// Execute the task.
    ///
    /// Operators keyed by global position place their results relative to
    /// the partition's row offset; everything else is cell- or row-local.
    pub fn execute(self) -> MantisResult<StepValue> {
        let row_offset = self.rows.start;
        match self.op {
            Operator::PartialAggregate { func, direction } => {
                let block = self.operands[0].as_matrix()?;
                Ok(StepValue::Partials(kernels::partial_aggregate(
                    block,
                    func,
                    direction,
                    row_offset,
                    self.total_rows,
                )?))
            }
            Operator::RangeReIndex => {
                let block = self.operands[0].as_matrix()?;
                let range = IndexRange::resolve(&self.operands[1..], self.total_rows, block.cols())?;
                Ok(StepValue::Partials(range.partial(block, row_offset)?))
            }
            Operator::DataGen => {
                let params = DataGenParams::resolve(&self.operands)?;
                Ok(StepValue::matrix(params.generate(self.rows)))
            }
            op => kernels::apply(&op, &self.operands, self.strict),
        }
    }
}
