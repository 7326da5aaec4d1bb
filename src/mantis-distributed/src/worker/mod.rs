//! Partitioned job execution.
//!
//! A job's matrix inputs are split into the row ranges of its
//! [`PartitioningSpec`](mantis_engine::physical::PartitioningSpec). Row-local
//! steps run once per partition on a blocking thread; the grouping steps
//! shuffle partial states and the aggregate step merges them. Random
//! generators produce each partition's rows directly. Steps without a
//! partitioned form gather their operands and run on whole matrices.

mod task;

pub use task::PartitionTask;

use std::ops::Range;
use std::sync::Arc;

use common_error::{MantisError, MantisResult};
use futures::future::try_join_all;
use log::debug;
use mantis_core::MatrixBlock;
use mantis_engine::instructions::{JobDescriptor, StepInput};
use mantis_engine::kernels::{self, DataGenParams, PartialAggregates, StepValue};
use mantis_engine::physical::{Operator, PartitioningSpec};
use tokio::sync::Semaphore;

/// A step result as laid out across partitions.
#[derive(Debug, Clone)]
pub enum Partitioned {
    /// The same value on every partition.
    Broadcast(StepValue),
    /// One row slice per partition.
    Rows(Vec<Arc<MatrixBlock>>),
    /// One set of partial states per partition.
    Partials(Vec<PartialAggregates>),
}

impl Partitioned {
    /// Gather into a single value.
    pub fn gather(&self) -> MantisResult<StepValue> {
        match self {
            Self::Broadcast(v) => Ok(v.clone()),
            Self::Rows(slices) => {
                let mut iter = slices.iter();
                let Some(first) = iter.next() else {
                    return Err(MantisError::internal("no partitions to gather"));
                };
                let mut out = (**first).clone();
                for slice in iter {
                    out = out.rbind(slice)?;
                }
                Ok(StepValue::matrix(out))
            }
            Self::Partials(parts) => {
                let mut iter = parts.iter().cloned();
                let Some(mut merged) = iter.next() else {
                    return Err(MantisError::internal("no partial states to merge"));
                };
                for part in iter {
                    merged.merge(part)?;
                }
                Ok(StepValue::Partials(merged))
            }
        }
    }

    fn is_rows(&self) -> bool {
        matches!(self, Self::Rows(_))
    }

    fn is_scalar(&self) -> bool {
        matches!(self, Self::Broadcast(StepValue::Scalar(_)))
    }
}

/// Runs one job descriptor over row partitions.
#[derive(Debug)]
pub struct JobRunner {
    partitioning: PartitioningSpec,
    ranges: Vec<Range<usize>>,
    total_rows: usize,
    strict: bool,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    /// Partition a job whose matrix inputs have at most `total_rows` rows.
    pub fn new(job: &JobDescriptor, total_rows: usize, permits: Arc<Semaphore>) -> Self {
        Self {
            partitioning: job.partitioning.clone(),
            ranges: job.partitioning.row_ranges(total_rows),
            total_rows,
            strict: job.strict,
            permits,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.ranges.len()
    }

    /// Split a whole value; matrices spanning all rows become row slices.
    pub fn distribute(&self, value: StepValue) -> MantisResult<Partitioned> {
        match value {
            StepValue::Matrix(m) if self.total_rows > 0 && m.rows() == self.total_rows => {
                if self.ranges.len() == 1 {
                    return Ok(Partitioned::Rows(vec![m]));
                }
                let slices = self
                    .ranges
                    .iter()
                    .map(|r| m.slice(r.clone(), 0..m.cols()).map(Arc::new))
                    .collect::<MantisResult<Vec<_>>>()?;
                Ok(Partitioned::Rows(slices))
            }
            StepValue::Partials(p) => Ok(Partitioned::Partials(vec![p])),
            other => Ok(Partitioned::Broadcast(other)),
        }
    }

    /// Run every step and gather the requested outputs.
    pub async fn run(
        &self,
        job: &JobDescriptor,
        inputs: Vec<StepValue>,
    ) -> MantisResult<Vec<MatrixBlock>> {
        let inputs = inputs
            .into_iter()
            .map(|v| self.distribute(v))
            .collect::<MantisResult<Vec<_>>>()?;

        let mut results: Vec<Partitioned> = Vec::with_capacity(job.steps.len());
        for (idx, step) in job.steps.iter().enumerate() {
            let operands = step
                .inputs
                .iter()
                .map(|input| match input {
                    StepInput::Input(i) => inputs.get(*i),
                    StepInput::Step(s) if *s < idx => results.get(*s),
                    StepInput::Step(_) => None,
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    MantisError::internal(format!(
                        "job {} step {idx} has a dangling input",
                        job.job_id
                    ))
                })?;
            let out = self.run_step(&step.op, &operands).await?;
            debug!("Job {} step {idx} ({}) done", job.job_id, step.op.opcode());
            results.push(out);
        }

        job.outputs
            .iter()
            .map(|i| {
                results
                    .get(*i)
                    .ok_or_else(|| MantisError::internal(format!("job output step {i} missing")))?
                    .gather()?
                    .into_matrix()
            })
            .collect()
    }

    async fn run_step(&self, op: &Operator, operands: &[&Partitioned]) -> MantisResult<Partitioned> {
        match (op, operands) {
            (Operator::Group, [p @ Partitioned::Partials(_)]) => Ok((*p).clone()),
            (Operator::Aggregate { .. }, [p @ Partitioned::Partials(_)]) => {
                let merged = p.gather()?;
                self.distribute(kernels::apply(op, &[merged], self.strict)?)
            }
            (Operator::DataGen, _) if operands.iter().all(|p| p.is_scalar()) => {
                let scalars = operands
                    .iter()
                    .map(|p| p.gather())
                    .collect::<MantisResult<Vec<_>>>()?;
                // Resolved once so every partition draws from the same seed.
                let params = DataGenParams::resolve(&scalars)?;
                let aligned = params.rows == self.total_rows;
                let ranges = if aligned {
                    self.ranges.clone()
                } else {
                    self.partitioning.row_ranges(params.rows)
                };
                let per_partition = vec![params.operands(); ranges.len()];
                let out = self.run_partitions(*op, &ranges, per_partition).await?;
                if aligned {
                    Ok(out)
                } else {
                    self.distribute(out.gather()?)
                }
            }
            _ if self.is_partitionable(op, operands) => {
                let per_partition = (0..self.ranges.len())
                    .map(|part| {
                        operands
                            .iter()
                            .map(|p| match p {
                                Partitioned::Rows(slices) => slices
                                    .get(part)
                                    .map(|s| StepValue::Matrix(Arc::clone(s)))
                                    .ok_or_else(|| {
                                        MantisError::internal(format!(
                                            "{op} operand has {} row slices for {} partitions",
                                            slices.len(),
                                            self.ranges.len()
                                        ))
                                    }),
                                Partitioned::Broadcast(v) => Ok(v.clone()),
                                Partitioned::Partials(_) => Err(MantisError::internal(
                                    "partial states cannot feed a partitioned step",
                                )),
                            })
                            .collect::<MantisResult<Vec<_>>>()
                    })
                    .collect::<MantisResult<Vec<_>>>()?;
                self.run_partitions(*op, &self.ranges, per_partition).await
            }
            (Operator::Cpmm, [Partitioned::Broadcast(StepValue::Matrix(a)), Partitioned::Rows(b)])
                if a.cols() == self.total_rows =>
            {
                // Split the left operand on the common dimension.
                let per_partition = self
                    .ranges
                    .iter()
                    .zip(b)
                    .map(|(r, b)| {
                        let a = a.slice(0..a.rows(), r.clone())?;
                        Ok(vec![StepValue::matrix(a), StepValue::Matrix(Arc::clone(b))])
                    })
                    .collect::<MantisResult<Vec<_>>>()?;
                self.run_partitions(*op, &self.ranges, per_partition).await
            }
            _ => {
                let whole = operands
                    .iter()
                    .map(|p| p.gather())
                    .collect::<MantisResult<Vec<_>>>()?;
                let op = *op;
                let strict = self.strict;
                let _permit = self.acquire().await?;
                let out = tokio::task::spawn_blocking(move || kernels::apply(&op, &whole, strict))
                    .await
                    .map_err(|e| MantisError::internal(format!("worker task failed: {e}")))??;
                self.distribute(out)
            }
        }
    }

    /// Whether `op` can run on each partition's slices independently.
    fn is_partitionable(&self, op: &Operator, operands: &[&Partitioned]) -> bool {
        if !operands.iter().any(|p| p.is_rows()) {
            return false;
        }
        match op {
            Operator::Unary(_)
            | Operator::Binary(_)
            | Operator::PartialAggregate { .. }
            | Operator::ZipMult
            | Operator::RangeReIndex => operands.iter().all(|p| p.is_rows() || p.is_scalar()),
            Operator::MapMult => matches!(
                operands,
                [Partitioned::Rows(_), Partitioned::Broadcast(StepValue::Matrix(_))]
            ),
            _ => false,
        }
    }

    async fn run_partitions(
        &self,
        op: Operator,
        ranges: &[Range<usize>],
        per_partition: Vec<Vec<StepValue>>,
    ) -> MantisResult<Partitioned> {
        let tasks = per_partition
            .into_iter()
            .zip(ranges)
            .enumerate()
            .map(|(part, (operands, range))| {
                let task = PartitionTask::new(
                    part,
                    range.clone(),
                    self.total_rows,
                    op,
                    operands,
                    self.strict,
                );
                async move {
                    let _permit = self.acquire().await?;
                    tokio::task::spawn_blocking(move || task.execute())
                        .await
                        .map_err(|e| MantisError::internal(format!("worker task failed: {e}")))?
                }
            });
        let outputs = try_join_all(tasks).await?;

        if outputs.iter().all(|o| matches!(o, StepValue::Partials(_))) {
            let parts = outputs
                .into_iter()
                .filter_map(|o| match o {
                    StepValue::Partials(p) => Some(p),
                    _ => None,
                })
                .collect();
            return Ok(Partitioned::Partials(parts));
        }
        let slices = outputs
            .into_iter()
            .map(|o| match o {
                StepValue::Matrix(m) => Ok(m),
                other => Err(MantisError::internal(format!(
                    "{op} produced {other:?} on a row partition"
                ))),
            })
            .collect::<MantisResult<Vec<_>>>()?;
        Ok(Partitioned::Rows(slices))
    }

    async fn acquire(&self) -> MantisResult<tokio::sync::SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| MantisError::internal("worker pool closed"))
    }
}
