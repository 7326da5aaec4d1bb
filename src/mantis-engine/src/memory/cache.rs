//! Cacheable matrix objects and their lineage.

use std::path::PathBuf;
use std::sync::Arc;

use common_error::{MantisError, MantisResult};
use mantis_core::{MatrixBlock, MatrixCharacteristics, ValueType};
use parking_lot::Mutex;

use crate::instructions::{DatasetRef, JobDescriptor};
use crate::kernels;

/// Where an object's content currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Created but never written.
    Empty,
    InMemory,
    /// Dropped from memory; recoverable from a spill file or lineage.
    Evicted,
    /// Materialized by the distributed backend and not yet loaded.
    External,
}

/// How to rebuild an object by re-running the job that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineage {
    pub job: Arc<JobDescriptor>,
    /// Output position within the job.
    pub output: usize,
}

impl Lineage {
    /// Rough recomputation cost used to rank eviction candidates.
    pub fn cost(&self) -> usize {
        self.job.steps.len()
    }
}

/// Rebuilds objects from lineage.
pub trait LineageResolver: Send + Sync + std::fmt::Debug {
    fn reconstruct(&self, lineage: &Lineage) -> MantisResult<MatrixBlock>;
}

/// Replays the producing job in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalReplay;

impl LineageResolver for LocalReplay {
    fn reconstruct(&self, lineage: &Lineage) -> MantisResult<MatrixBlock> {
        kernels::run_job_locally(&lineage.job)?
            .into_iter()
            .nth(lineage.output)
            .ok_or_else(|| {
                MantisError::internal(format!(
                    "job {} has no output {}",
                    lineage.job.job_id, lineage.output
                ))
            })
    }
}

#[derive(Debug)]
pub(crate) struct ObjectState {
    pub residency: Residency,
    pub pins: usize,
    /// In-memory content differs from every on-disk copy.
    pub dirty: bool,
    pub block: Option<Arc<MatrixBlock>>,
    /// Bytes reserved for `block`.
    pub reserved: usize,
    pub chars: MatrixCharacteristics,
    pub spill: Option<PathBuf>,
    pub dataset: Option<DatasetRef>,
    pub lineage: Option<Lineage>,
    /// A job read the spill file, so it must outlive the object.
    pub exported: bool,
}

/// A matrix managed by the buffer pool.
///
/// Residency transitions of one object are serialized by its own lock;
/// distinct objects transition independently.
#[derive(Debug)]
pub struct MatrixObject {
    id: u64,
    value_type: ValueType,
    pub(crate) state: Mutex<ObjectState>,
}

/// Shared handle to a pool object.
pub type MatrixHandle = Arc<MatrixObject>;

impl MatrixObject {
    pub(crate) fn new(
        id: u64,
        value_type: ValueType,
        chars: MatrixCharacteristics,
        residency: Residency,
    ) -> Self {
        Self {
            id,
            value_type,
            state: Mutex::new(ObjectState {
                residency,
                pins: 0,
                dirty: false,
                block: None,
                reserved: 0,
                chars,
                spill: None,
                dataset: None,
                lineage: None,
                exported: false,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stable name used for spill files.
    pub fn name(&self) -> String {
        format!("obj_{}", self.id)
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn residency(&self) -> Residency {
        self.state.lock().residency
    }

    pub fn pins(&self) -> usize {
        self.state.lock().pins
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    pub fn characteristics(&self) -> MatrixCharacteristics {
        self.state.lock().chars
    }

    pub fn has_lineage(&self) -> bool {
        self.state.lock().lineage.is_some()
    }

    /// Bytes currently held in memory.
    pub fn resident_size(&self) -> usize {
        self.state.lock().reserved
    }
}

impl ObjectState {
    /// Eviction rank: cheaper reconstruction first.
    pub(crate) fn eviction_cost(&self) -> (u8, usize) {
        if !self.dirty && (self.spill.is_some() || self.dataset.is_some()) {
            (0, 0)
        } else if let Some(lineage) = &self.lineage {
            (1, lineage.cost())
        } else {
            (2, 0)
        }
    }
}
