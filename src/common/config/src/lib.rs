//! Configuration management for Mantis.
//!
//! Provides the numeric and memory budget configuration consumed by the
//! compiler, the interpreter and the buffer pool. Loading these values from a
//! file is left to the driver; every struct deserializes from partial input.

use serde::{Deserialize, Serialize};

/// Global Mantis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MantisConfig {
    /// Compiler configuration.
    pub compiler: CompilerConfig,
    /// Execution configuration.
    pub execution: ExecutionConfig,
    /// Buffer pool configuration.
    pub buffer_pool: BufferPoolConfig,
}

/// Runtime platform, deciding how exec types are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionPlatform {
    /// Everything runs in-process.
    SingleNode,
    /// Cost-based choice per operator.
    #[default]
    Hybrid,
    /// Every matrix operator runs on the distributed backend.
    Distributed,
}

/// Flavor of the distributed backend the compiler emits jobs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistributedBackendKind {
    /// Map/shuffle/reduce style jobs.
    MapReduce,
    /// Collection-processing style jobs.
    #[default]
    Collection,
}

/// Compiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Runtime platform.
    pub platform: ExecutionPlatform,
    /// Distributed backend flavor.
    pub distributed_backend: DistributedBackendKind,
    /// Per-operator in-process memory threshold in bytes.
    pub local_memory_budget: usize,
    /// Block size (rows and columns) for distributed datasets.
    pub default_block_size: usize,
    /// Sparsity assumed when nothing better is known.
    pub default_sparsity: f64,
    /// Maximum number of physical operators merged into one job.
    pub max_job_size: usize,
    /// Degree of job parallelism (number of partitions).
    pub parallelism: usize,
    /// Whether loop bodies may contain distributed jobs.
    pub allow_jobs_in_loops: bool,
    /// Upper bound on rewrite fixpoint iterations.
    pub max_optimizer_iterations: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            platform: ExecutionPlatform::Hybrid,
            distributed_backend: DistributedBackendKind::Collection,
            local_memory_budget: 1024 * 1024 * 1024,
            default_block_size: 1000,
            default_sparsity: 1.0,
            max_job_size: 64,
            parallelism: 4,
            allow_jobs_in_loops: true,
            max_optimizer_iterations: 16,
        }
    }
}

impl CompilerConfig {
    /// Set the runtime platform.
    pub fn with_platform(mut self, platform: ExecutionPlatform) -> Self {
        self.platform = platform;
        self
    }

    /// Set the in-process memory budget.
    pub fn with_local_memory_budget(mut self, bytes: usize) -> Self {
        self.local_memory_budget = bytes;
        self
    }

    /// Set the distributed backend flavor.
    pub fn with_backend(mut self, backend: DistributedBackendKind) -> Self {
        self.distributed_backend = backend;
        self
    }
}

/// Interpreter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fail with a domain error instead of producing NaN.
    pub strict_domain: bool,
    /// Resubmissions allowed for transient backend failures.
    pub max_transient_retries: u32,
    /// Collect runtime statistics.
    pub collect_stats: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strict_domain: true,
            max_transient_retries: 3,
            collect_stats: true,
        }
    }
}

/// Buffer pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Root directory for run-scoped scratch space.
    pub scratch_dir: String,
    /// Resident memory budget in bytes (0 = unlimited).
    pub memory_budget: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            scratch_dir: "scratch_space".to_string(),
            memory_budget: 0,
        }
    }
}

impl BufferPoolConfig {
    /// Create a config rooted at `scratch_dir`.
    pub fn new(scratch_dir: impl Into<String>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }

    /// Set the resident memory budget.
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }
}
