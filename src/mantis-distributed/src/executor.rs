//! In-process distributed backend.
//!
//! [`InProcessBackend`] implements the [`DistributedBackend`] contract on a
//! pool of blocking worker threads. Jobs read their inputs from the scratch
//! datasets named in the descriptor, run partitioned, and write their outputs
//! to the descriptor's output directory.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common_error::{MantisError, MantisResult};
use log::{debug, info, warn};
use mantis_engine::executor::DistributedBackend;
use mantis_engine::instructions::{JobDescriptor, JobStatus};
use mantis_engine::kernels::{self, StepValue};
use mantis_engine::physical::Operator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, watch};

use crate::worker::JobRunner;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Configuration for the in-process backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InProcessBackendConfig {
    /// Maximum partition tasks running at once.
    pub max_concurrent_tasks: usize,
    /// Artificial latency added before each job starts.
    pub job_delay: Option<Duration>,
}

impl Default for InProcessBackendConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: num_cpus(),
            job_delay: None,
        }
    }
}

impl InProcessBackendConfig {
    /// Set the task concurrency.
    pub fn with_max_concurrent_tasks(mut self, tasks: usize) -> Self {
        self.max_concurrent_tasks = tasks.max(1);
        self
    }

    /// Delay every job by `delay`.
    pub fn with_job_delay(mut self, delay: Duration) -> Self {
        self.job_delay = Some(delay);
        self
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
}

// ============================================================================
// Backend Counters
// ============================================================================

/// Job outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

// ============================================================================
// In-Process Backend
// ============================================================================

/// Distributed backend running jobs on local worker threads.
pub struct InProcessBackend {
    config: InProcessBackendConfig,
    permits: Arc<Semaphore>,
    /// Cancellation senders of running jobs, by job id.
    running: Mutex<HashMap<String, watch::Sender<bool>>>,
    /// Submissions still to fail with a transient error.
    injected_failures: AtomicUsize,
    counters: Counters,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self::with_config(InProcessBackendConfig::default())
    }

    pub fn with_config(config: InProcessBackendConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self {
            config,
            permits,
            running: Mutex::new(HashMap::new()),
            injected_failures: AtomicUsize::new(0),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &InProcessBackendConfig {
        &self.config
    }

    /// Fail the next `count` submissions with a transient error.
    pub fn inject_transient_failures(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    pub fn counters(&self) -> BackendCounters {
        BackendCounters {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            cancelled: self.counters.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Ids of jobs currently running.
    pub fn running_jobs(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.running.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn run(&self, job: JobDescriptor) -> MantisResult<JobStatus> {
        if let Some(delay) = self.config.job_delay {
            tokio::time::sleep(delay).await;
        }
        let job = Arc::new(job);

        let loader = Arc::clone(&job);
        let inputs = tokio::task::spawn_blocking(move || kernels::load_inputs(&loader))
            .await
            .map_err(|e| MantisError::internal(format!("input load failed: {e}")))??;
        // Generated matrices of known height count like inputs.
        let generated = job
            .steps
            .iter()
            .filter(|s| s.op == Operator::DataGen && s.chars.rows_known())
            .map(|s| s.chars.rows as usize);
        let total_rows = inputs
            .iter()
            .filter_map(|v| match v {
                StepValue::Matrix(m) => Some(m.rows()),
                _ => None,
            })
            .chain(generated)
            .max()
            .unwrap_or(0);

        let runner = JobRunner::new(&job, total_rows, Arc::clone(&self.permits));
        debug!(
            "Job {}: {} steps over {} partitions of {total_rows} rows",
            job.job_id,
            job.steps.len(),
            runner.num_partitions()
        );
        let blocks = runner.run(&job, inputs).await?;

        let writer = Arc::clone(&job);
        tokio::task::spawn_blocking(move || kernels::write_outputs(&writer, &blocks))
            .await
            .map_err(|e| MantisError::internal(format!("output write failed: {e}")))?
    }
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InProcessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBackend")
            .field("config", &self.config)
            .field("running", &self.running_jobs())
            .field("counters", &self.counters())
            .finish()
    }
}

#[async_trait]
impl DistributedBackend for InProcessBackend {
    fn name(&self) -> &str {
        "in-process"
    }

    async fn submit(&self, job: JobDescriptor) -> MantisResult<JobStatus> {
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        let job_id = job.job_id.clone();
        if self.take_injected_failure() {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            warn!("Job {job_id}: injected transient failure");
            return Err(MantisError::backend_transient(format!(
                "worker lost while running {job_id}"
            )));
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        {
            let mut running = self.running.lock();
            if running.contains_key(&job_id) {
                return Err(MantisError::backend(format!("job {job_id} is already running")));
            }
            running.insert(job_id.clone(), cancel_tx);
        }
        let mut guard = RunningJob {
            backend: self,
            job_id: job_id.clone(),
            settled: false,
        };
        info!("Job {job_id} started ({} steps)", job.steps.len());
        let start = Instant::now();

        let result = tokio::select! {
            status = self.run(job) => status,
            _ = cancel_rx.wait_for(|c| *c) => Err(MantisError::cancelled(format!("job {job_id}"))),
        };
        guard.settled = true;

        match &result {
            Ok(_) => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
                info!("Job {job_id} finished in {:?}", start.elapsed());
            }
            Err(e) if *cancel_rx.borrow() => {
                self.counters.cancelled.fetch_add(1, Ordering::SeqCst);
                info!("Job {job_id} cancelled: {e}");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                warn!("Job {job_id} failed: {e}");
            }
        }
        result
    }

    async fn cancel(&self, job_id: &str) -> MantisResult<()> {
        match self.running.lock().get(job_id) {
            Some(tx) => {
                let _ = tx.send(true);
                Ok(())
            }
            // Already finished.
            None => Ok(()),
        }
    }
}

/// Deregisters a running job, counting it cancelled if its submission was
/// dropped before settling.
struct RunningJob<'a> {
    backend: &'a InProcessBackend,
    job_id: String,
    settled: bool,
}

impl Drop for RunningJob<'_> {
    fn drop(&mut self) {
        self.backend.running.lock().remove(&self.job_id);
        if !self.settled {
            self.backend.counters.cancelled.fetch_add(1, Ordering::SeqCst);
            info!("Job {} abandoned by its submitter", self.job_id);
        }
    }
}
