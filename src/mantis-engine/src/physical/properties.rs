//! Physical operator properties used by job clustering.

use serde::{Deserialize, Serialize};

/// Where a physical operator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecLocation {
    /// In the interpreter process.
    ControlProgram,
    /// Variable binding; no computation.
    Data,
    /// Map side only.
    Map,
    /// Either side of a shuffle.
    MapOrReduce,
    /// The shuffle itself: map side emits, reduce side receives.
    MapAndReduce,
    /// Reduce side only.
    Reduce,
}

impl std::fmt::Display for ExecLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ControlProgram => "CP",
            Self::Data => "Data",
            Self::Map => "Map",
            Self::MapOrReduce => "MapOrReduce",
            Self::MapAndReduce => "MapAndReduce",
            Self::Reduce => "Reduce",
        };
        f.write_str(s)
    }
}

/// Job shapes a distributed operator can be merged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobType {
    /// Map, optional shuffle, reduce.
    Generic,
    /// Cross-product matrix multiply and its aggregation.
    CrossProduct,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generic => write!(f, "GMR"),
            Self::CrossProduct => write!(f, "MMCJ"),
        }
    }
}

/// Clustering flags of a physical operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LopProperties {
    pub location: ExecLocation,
    /// Output blocks are re-keyed, so the operator cannot extend a job.
    pub breaks_alignment: bool,
    /// The operator always starts its own job.
    pub defines_job: bool,
    /// Job shapes this operator may join; empty for in-process operators.
    pub compatible_jobs: Vec<JobType>,
}

impl LopProperties {
    /// An in-process operator.
    pub fn control_program() -> Self {
        Self {
            location: ExecLocation::ControlProgram,
            breaks_alignment: false,
            defines_job: false,
            compatible_jobs: Vec::new(),
        }
    }

    /// A variable read, write or literal.
    pub fn data() -> Self {
        Self {
            location: ExecLocation::Data,
            ..Self::control_program()
        }
    }

    /// A distributed operator joinable into generic jobs.
    pub fn distributed(location: ExecLocation) -> Self {
        Self {
            location,
            breaks_alignment: false,
            defines_job: false,
            compatible_jobs: vec![JobType::Generic],
        }
    }

    pub fn with_breaks_alignment(mut self) -> Self {
        self.breaks_alignment = true;
        self
    }

    pub fn with_defines_job(mut self) -> Self {
        self.defines_job = true;
        self
    }

    pub fn with_jobs(mut self, jobs: &[JobType]) -> Self {
        self.compatible_jobs = jobs.to_vec();
        self
    }

    /// Whether this operator runs inside a distributed job.
    pub fn is_distributed(&self) -> bool {
        !self.compatible_jobs.is_empty()
    }

    /// Whether the operator forces a new job when clustered.
    pub fn starts_job(&self) -> bool {
        self.defines_job || self.breaks_alignment
    }

    pub fn is_compatible(&self, job_type: JobType) -> bool {
        self.compatible_jobs.contains(&job_type)
    }
}

/// How a job partitions its matrix inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitioningSpec {
    pub strategy: PartitioningStrategy,
    /// Number of partitions.
    pub num_partitions: usize,
    /// Rows per partition block; `0` lets the backend split evenly.
    pub block_size: usize,
}

impl PartitioningSpec {
    /// A single partition.
    pub fn single() -> Self {
        Self {
            strategy: PartitioningStrategy::Single,
            num_partitions: 1,
            block_size: 0,
        }
    }

    /// Row-block partitioning into `num_partitions` parts.
    pub fn row_blocks(num_partitions: usize, block_size: usize) -> Self {
        Self {
            strategy: PartitioningStrategy::RowBlock,
            num_partitions: num_partitions.max(1),
            block_size,
        }
    }

    pub const fn is_single(&self) -> bool {
        matches!(self.strategy, PartitioningStrategy::Single) || self.num_partitions == 1
    }

    /// Row ranges covering `rows` rows.
    ///
    /// Ranges are contiguous, ordered and never empty unless `rows` is zero.
    pub fn row_ranges(&self, rows: usize) -> Vec<std::ops::Range<usize>> {
        if rows == 0 {
            return vec![0..0];
        }
        let parts = if self.is_single() {
            1
        } else {
            self.num_partitions.min(rows)
        };
        let step = if self.block_size > 0 {
            self.block_size.max(rows.div_ceil(parts))
        } else {
            rows.div_ceil(parts)
        };
        (0..rows)
            .step_by(step)
            .map(|start| start..(start + step).min(rows))
            .collect()
    }
}

impl Default for PartitioningSpec {
    fn default() -> Self {
        Self::single()
    }
}

/// Partitioning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PartitioningStrategy {
    #[default]
    Single,
    /// Contiguous row blocks.
    RowBlock,
}

impl std::fmt::Display for PartitioningStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "Single"),
            Self::RowBlock => write!(f, "RowBlock"),
        }
    }
}
