//! Distributed job specifications and the descriptors handed to backends.

use std::path::PathBuf;

use mantis_core::{ExecType, MatrixCharacteristics, ScalarValue, ValueType};
use serde::{Deserialize, Serialize};

use super::operand::Operand;
use crate::physical::{JobType, Operator, PartitioningSpec};

/// Where a job step reads one operand from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepInput {
    /// The job input at this position.
    Input(usize),
    /// The output of an earlier step.
    Step(usize),
}

/// One operator inside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    pub op: Operator,
    pub inputs: Vec<StepInput>,
    /// Output characteristics estimated by the compiler.
    pub chars: MatrixCharacteristics,
}

/// A job output: the producing step and the variable it binds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub step: usize,
    pub operand: Operand,
}

/// A job as compiled, with symbolic operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Program-wide job number.
    pub id: usize,
    pub exec_type: ExecType,
    pub job_type: JobType,
    pub steps: Vec<JobStep>,
    pub inputs: Vec<Operand>,
    pub outputs: Vec<JobOutput>,
    pub partitioning: PartitioningSpec,
}

impl JobSpec {
    pub fn describe(&self) -> String {
        let steps: Vec<_> = self.steps.iter().map(|s| s.op.opcode()).collect();
        format!(
            "{} job {} [{}] steps: {}",
            self.exec_type.code(),
            self.id,
            self.job_type,
            steps.join(",")
        )
    }
}

/// A matrix dataset in the scratch space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub id: String,
    /// Path of the binary cell file; the metadata sidecar sits next to it.
    pub path: PathBuf,
    pub chars: MatrixCharacteristics,
    pub value_type: ValueType,
}

/// A resolved job input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobInput {
    Dataset(DatasetRef),
    Scalar(ScalarValue),
}

/// Everything a backend needs to run one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub exec_type: ExecType,
    pub job_type: JobType,
    pub steps: Vec<JobStep>,
    pub inputs: Vec<JobInput>,
    /// Indexes of the steps whose results are written out, in output order.
    pub outputs: Vec<usize>,
    /// Directory the backend writes output datasets to.
    pub output_dir: PathBuf,
    pub partitioning: PartitioningSpec,
    /// Fail on out-of-domain values instead of producing NaN.
    pub strict: bool,
}

impl JobDescriptor {
    /// File name stem for output `index`.
    pub fn output_name(&self, index: usize) -> String {
        format!("{}_out{index}", self.job_id)
    }
}

/// Completion report of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    /// One dataset per descriptor output, in order.
    pub outputs: Vec<DatasetRef>,
}
