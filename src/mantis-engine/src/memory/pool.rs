//! The buffer pool: residency management for matrix objects of one run.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use common_config::BufferPoolConfig;
use common_error::{MantisError, MantisResult};
use log::{debug, info, warn};
use mantis_core::{MatrixBlock, MatrixCharacteristics, ValueType};
use parking_lot::Mutex;
use uuid::Uuid;

use super::cache::{
    Lineage, LineageResolver, LocalReplay, MatrixHandle, MatrixObject, ObjectState, Residency,
};
use super::manager::{MemoryManager, TrackingMemoryManager};
use super::spill;
use crate::instructions::DatasetRef;
use crate::metrics::{CacheHit, RuntimeStatistics};

const CACHE_DIR: &str = "cache";
const JOBS_DIR: &str = "jobs";

/// Where a non-resident object can be loaded from.
struct Source {
    spill: Option<PathBuf>,
    dataset: Option<PathBuf>,
    lineage: Option<Lineage>,
    /// Dense size from the known dims, reserved room before loading.
    estimate: Option<usize>,
}

/// Buffer pool scoped to one program run.
///
/// Files live under `<scratch_dir>/<run-id>/`: spilled objects in `cache/`,
/// backend datasets in `jobs/`.
#[derive(Debug)]
pub struct BufferPool {
    run_id: String,
    root: PathBuf,
    memory: TrackingMemoryManager,
    objects: Mutex<BTreeMap<u64, MatrixHandle>>,
    next_id: AtomicU64,
    resolver: Arc<dyn LineageResolver>,
    stats: RuntimeStatistics,
}

impl BufferPool {
    /// Create the run's scratch directory and a pool bound to it.
    pub fn create_scratch_space(config: &BufferPoolConfig) -> MantisResult<ScratchSpace> {
        Self::create_scratch_space_with(config, Arc::new(LocalReplay), RuntimeStatistics::new())
    }

    pub fn create_scratch_space_with(
        config: &BufferPoolConfig,
        resolver: Arc<dyn LineageResolver>,
        stats: RuntimeStatistics,
    ) -> MantisResult<ScratchSpace> {
        let run_id = Uuid::new_v4().simple().to_string();
        let root = Path::new(&config.scratch_dir).join(&run_id);
        fs::create_dir_all(root.join(CACHE_DIR))?;
        fs::create_dir_all(root.join(JOBS_DIR))?;
        info!(
            "Created scratch space {} (budget: {} bytes)",
            root.display(),
            config.memory_budget
        );

        let pool = Self {
            run_id,
            root,
            memory: TrackingMemoryManager::new(config.memory_budget),
            objects: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            resolver,
            stats,
        };
        Ok(ScratchSpace {
            pool: Arc::new(pool),
            cleaned: AtomicBool::new(false),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for the datasets of job `job_id`.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(JOBS_DIR).join(job_id)
    }

    pub fn memory_used(&self) -> usize {
        self.memory.used()
    }

    pub fn memory_limit(&self) -> usize {
        self.memory.limit()
    }

    pub fn num_objects(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn statistics(&self) -> &RuntimeStatistics {
        &self.stats
    }

    fn spill_path(&self, obj: &MatrixObject) -> PathBuf {
        self.root.join(CACHE_DIR).join(format!("{}.bin", obj.name()))
    }

    fn register(&self, obj: MatrixObject) -> MatrixHandle {
        let handle = Arc::new(obj);
        self.objects.lock().insert(handle.id(), Arc::clone(&handle));
        handle
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a resident object holding `block`. The object starts unpinned.
    pub fn create(
        &self,
        block: MatrixBlock,
        chars: MatrixCharacteristics,
        value_type: ValueType,
    ) -> MantisResult<MatrixHandle> {
        let size = block.in_memory_size();
        self.make_room(size, None)?;
        self.memory.reserve(size)?;

        let chars = chars
            .with_dims(block.rows() as i64, block.cols() as i64)
            .with_nnz(block.nnz() as i64);
        let obj = MatrixObject::new(self.next_id(), value_type, chars, Residency::InMemory);
        {
            let mut st = obj.state.lock();
            st.block = Some(Arc::new(block));
            st.reserved = size;
            st.dirty = true;
        }
        Ok(self.register(obj))
    }

    /// Add an object backed by a backend dataset, loaded lazily on first pin.
    pub fn create_external(&self, dataset: DatasetRef, lineage: Option<Lineage>) -> MatrixHandle {
        let obj = MatrixObject::new(
            self.next_id(),
            dataset.value_type,
            dataset.chars,
            Residency::External,
        );
        {
            let mut st = obj.state.lock();
            st.dataset = Some(dataset);
            st.lineage = lineage;
        }
        self.register(obj)
    }

    /// Pin `handle` and return its content, loading it if needed.
    ///
    /// Loads from the spill file or backend dataset, falling back to lineage
    /// when the file is gone. Without either this is an I/O error.
    pub fn pin(&self, handle: &MatrixHandle) -> MantisResult<Arc<MatrixBlock>> {
        let source = {
            let mut st = handle.state.lock();
            if let Some(block) = &st.block {
                let block = Arc::clone(block);
                st.pins += 1;
                self.stats.record_cache_hit(CacheHit::Memory);
                return Ok(block);
            }
            if st.residency == Residency::Empty {
                return Err(MantisError::internal(format!(
                    "{} was freed",
                    handle.name()
                )));
            }
            Source {
                spill: st.spill.clone(),
                dataset: st.dataset.as_ref().map(|d| d.path.clone()),
                lineage: st.lineage.clone(),
                estimate: st.chars.estimate_size(1.0).map(|b| b as usize),
            }
        };

        if let Some(estimate) = source.estimate {
            self.make_room(estimate, Some(handle.id()))?;
        }
        let (block, hit) = self.load(handle, &source)?;
        let size = block.in_memory_size();
        self.make_room(size, Some(handle.id()))?;
        self.memory.reserve(size)?;

        let mut st = handle.state.lock();
        let block = match &st.block {
            // Loaded concurrently by another pin.
            Some(existing) => {
                self.memory.release(size);
                Arc::clone(existing)
            }
            None => {
                let block = Arc::new(block);
                st.block = Some(Arc::clone(&block));
                st.reserved = size;
                st.residency = Residency::InMemory;
                st.dirty = false;
                if hit == CacheHit::Lineage {
                    st.spill = None;
                    st.dataset = None;
                }
                block
            }
        };
        st.pins += 1;
        self.stats.record_cache_hit(hit);
        Ok(block)
    }

    fn load(&self, obj: &MatrixObject, source: &Source) -> MantisResult<(MatrixBlock, CacheHit)> {
        let file = source
            .spill
            .as_ref()
            .map(|p| (p, CacheHit::Spill))
            .or_else(|| source.dataset.as_ref().map(|p| (p, CacheHit::Dataset)));
        if let Some((path, hit)) = file {
            match spill::read_block(path) {
                Ok((block, _)) => return Ok((block, hit)),
                Err(MantisError::IoError(e)) if source.lineage.is_some() => {
                    warn!(
                        "Failed to read {} for {}: {e}; recomputing from lineage",
                        path.display(),
                        obj.name()
                    );
                }
                Err(e) => return Err(e),
            }
        }
        match &source.lineage {
            Some(lineage) => {
                debug!(
                    "Reconstructing {} from job {} output {}",
                    obj.name(),
                    lineage.job.job_id,
                    lineage.output
                );
                Ok((self.resolver.reconstruct(lineage)?, CacheHit::Lineage))
            }
            None => Err(std::io::Error::new(
                IoErrorKind::NotFound,
                format!("{} has no spill file and no lineage", obj.name()),
            )
            .into()),
        }
    }

    /// Drop one pin. Releasing an unpinned object is an internal error.
    pub fn release(&self, handle: &MatrixHandle) -> MantisResult<()> {
        let mut st = handle.state.lock();
        if st.pins == 0 {
            return Err(MantisError::internal(format!(
                "release of unpinned {}",
                handle.name()
            )));
        }
        st.pins -= 1;
        Ok(())
    }

    /// Move `handle` out of memory, spilling dirty content first.
    ///
    /// Returns `false` if the object was not resident. Evicting a pinned
    /// object is an internal error.
    pub fn evict(&self, handle: &MatrixHandle) -> MantisResult<bool> {
        let mut st = handle.state.lock();
        self.evict_locked(handle, &mut st)
    }

    fn evict_locked(&self, obj: &MatrixObject, st: &mut ObjectState) -> MantisResult<bool> {
        if st.pins > 0 {
            return Err(MantisError::internal(format!(
                "cannot evict {}: pinned {} times",
                obj.name(),
                st.pins
            )));
        }
        let Some(block) = st.block.take() else {
            return Ok(false);
        };

        let spilled = st.dirty;
        if spilled {
            let path = self.spill_path(obj);
            match spill::write_block(&path, &block, &st.chars, obj.value_type()) {
                Ok(meta) => st.chars = meta.chars,
                Err(e) => {
                    st.block = Some(block);
                    return Err(e);
                }
            }
            st.spill = Some(path);
            st.dirty = false;
        }

        self.memory.release(st.reserved);
        debug!(
            "Evicted {} ({} bytes{})",
            obj.name(),
            st.reserved,
            if spilled { ", spilled" } else { "" }
        );
        st.reserved = 0;
        st.residency = if st.spill.is_none() && st.dataset.is_some() {
            Residency::External
        } else {
            Residency::Evicted
        };
        self.stats.record_eviction(spilled);
        Ok(true)
    }

    /// Evict unpinned objects until `bytes` more fit in the budget.
    ///
    /// Candidates go cheapest reconstruction first, then larger objects,
    /// then by id.
    fn make_room(&self, bytes: usize, requester: Option<u64>) -> MantisResult<()> {
        let limit = self.memory.limit();
        if limit == 0 || self.memory.can_reserve(bytes) {
            return Ok(());
        }
        if bytes > limit {
            return Err(MantisError::out_of_memory(
                bytes,
                format!("exceeds the buffer pool budget of {limit} bytes"),
            ));
        }

        let handles: Vec<MatrixHandle> = self
            .objects
            .lock()
            .values()
            .filter(|h| Some(h.id()) != requester)
            .cloned()
            .collect();
        let mut candidates: Vec<_> = handles
            .into_iter()
            .filter_map(|h| {
                let key = {
                    let st = h.state.lock();
                    (st.pins == 0 && st.block.is_some())
                        .then(|| (st.eviction_cost(), Reverse(st.reserved), h.id()))
                };
                key.map(|k| (k, h))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        for (_, handle) in candidates {
            {
                let mut st = handle.state.lock();
                if st.pins > 0 || st.block.is_none() {
                    continue;
                }
                self.evict_locked(&handle, &mut st)?;
            }
            if self.memory.can_reserve(bytes) {
                return Ok(());
            }
        }
        Err(MantisError::out_of_memory(
            bytes,
            format!(
                "{} of {limit} bytes held by pinned objects",
                self.memory.used()
            ),
        ))
    }

    /// Remove an object from the pool and drop its content.
    pub fn free(&self, handle: &MatrixHandle) -> MantisResult<()> {
        {
            let st = handle.state.lock();
            if st.pins > 0 {
                return Err(MantisError::internal(format!(
                    "cannot free {}: pinned {} times",
                    handle.name(),
                    st.pins
                )));
            }
        }
        self.objects.lock().remove(&handle.id());
        let mut st = handle.state.lock();
        st.block = None;
        self.memory.release(st.reserved);
        st.reserved = 0;
        st.residency = Residency::Empty;
        st.dataset = None;
        st.lineage = None;
        if let Some(path) = st.spill.take() {
            if !st.exported {
                spill::remove_block(&path)?;
            }
        }
        Ok(())
    }

    /// A dataset with the object's content, writing one if none is current.
    pub fn export(&self, handle: &MatrixHandle) -> MantisResult<DatasetRef> {
        {
            let mut st = handle.state.lock();
            if !st.dirty {
                if let Some(ds) = &st.dataset {
                    return Ok(ds.clone());
                }
                if let Some(path) = st.spill.clone() {
                    st.exported = true;
                    return Ok(DatasetRef {
                        id: handle.name(),
                        path,
                        chars: st.chars,
                        value_type: handle.value_type(),
                    });
                }
            }
        }

        let block = self.pin(handle)?;
        let written = {
            let mut st = handle.state.lock();
            let path = self.spill_path(handle);
            spill::write_block(&path, &block, &st.chars, handle.value_type()).map(|meta| {
                st.chars = meta.chars;
                st.spill = Some(path.clone());
                st.dirty = false;
                st.exported = true;
                DatasetRef {
                    id: handle.name(),
                    path,
                    chars: meta.chars,
                    value_type: handle.value_type(),
                }
            })
        };
        self.release(handle)?;
        written
    }

    /// Drop every outstanding pin. Returns the number of pins dropped.
    pub fn release_all(&self) -> usize {
        let handles: Vec<MatrixHandle> = self.objects.lock().values().cloned().collect();
        let released: usize = handles
            .iter()
            .map(|h| std::mem::take(&mut h.state.lock().pins))
            .sum();
        if released > 0 {
            warn!("Released {released} outstanding pins in run {}", self.run_id);
        }
        released
    }

    fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.objects.lock());
        for handle in handles.values() {
            let mut st = handle.state.lock();
            st.block = None;
            st.pins = 0;
            self.memory.release(st.reserved);
            st.reserved = 0;
            st.residency = Residency::Empty;
        }
    }
}

/// Scoped ownership of a run's scratch space.
///
/// Cleanup runs exactly once: explicitly via [`cleanup`](Self::cleanup) or
/// on drop.
#[derive(Debug)]
pub struct ScratchSpace {
    pool: Arc<BufferPool>,
    cleaned: AtomicBool,
}

impl ScratchSpace {
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    /// Drop all objects and delete the run directory.
    ///
    /// Returns `false` if cleanup already ran.
    pub fn cleanup(&self) -> MantisResult<bool> {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.pool.shutdown();
        match fs::remove_dir_all(self.pool.root()) {
            Err(e) if e.kind() != IoErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        info!("Cleaned up scratch space {}", self.pool.root().display());
        Ok(true)
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            warn!("Scratch space cleanup failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{JobDescriptor, JobInput, JobStep, StepInput};
    use crate::physical::{JobType, Operator, PartitioningSpec};
    use common_error::ErrorKind;
    use mantis_core::{ExecType, ScalarValue, ValueFunction};

    fn block(rows: usize, cols: usize, v: f64) -> MatrixBlock {
        MatrixBlock::filled(rows, cols, v)
    }

    fn chars() -> MatrixCharacteristics {
        MatrixCharacteristics::unknown().with_blocking(1000, 1000)
    }

    fn scratch(dir: &tempfile::TempDir, budget: usize) -> ScratchSpace {
        let config = BufferPoolConfig::new(dir.path().to_string_lossy()).with_memory_budget(budget);
        BufferPool::create_scratch_space(&config).unwrap()
    }

    #[test]
    fn test_pin_release_evict() {
        let dir = tempfile::tempdir().unwrap();
        let space = scratch(&dir, 0);
        let pool = space.pool();
        let h = pool.create(block(3, 3, 2.5), chars(), ValueType::Double).unwrap();
        assert_eq!(h.residency(), Residency::InMemory);
        assert!(h.is_dirty());

        let b = pool.pin(&h).unwrap();
        assert_eq!(b.get(1, 1), 2.5);
        let err = pool.evict(&h).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(h.residency(), Residency::InMemory);

        pool.release(&h).unwrap();
        assert!(pool.release(&h).is_err());
        assert!(pool.evict(&h).unwrap());
        assert_eq!(h.residency(), Residency::Evicted);
        assert_eq!(pool.memory_used(), 0);
        assert!(!pool.evict(&h).unwrap());

        let again = pool.pin(&h).unwrap();
        assert!(again.bit_eq(&b));
        assert_eq!(pool.statistics().cache_hits(CacheHit::Spill), 1);
        pool.release(&h).unwrap();
    }

    #[test]
    fn test_eviction_prefers_cheap_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let one = block(4, 4, 1.0).in_memory_size();
        let space = scratch(&dir, 2 * one + one / 2);
        let pool = space.pool();

        let dirty = pool.create(block(4, 4, 1.0), chars(), ValueType::Double).unwrap();
        let clean = pool.create(block(4, 4, 2.0), chars(), ValueType::Double).unwrap();
        pool.export(&clean).unwrap();
        assert!(!clean.is_dirty());

        let _third = pool.create(block(4, 4, 3.0), chars(), ValueType::Double).unwrap();
        assert_eq!(clean.residency(), Residency::Evicted);
        assert_eq!(dirty.residency(), Residency::InMemory);
        assert_eq!(pool.statistics().spill_writes(), 0);
    }

    #[test]
    fn test_out_of_memory_when_all_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let one = block(4, 4, 1.0).in_memory_size();
        let space = scratch(&dir, one + one / 2);
        let pool = space.pool();

        let a = pool.create(block(4, 4, 1.0), chars(), ValueType::Double).unwrap();
        pool.pin(&a).unwrap();
        let err = pool
            .create(block(4, 4, 2.0), chars(), ValueType::Double)
            .unwrap_err();
        assert!(matches!(
            err,
            MantisError::ResourceError { requested, .. } if requested == one
        ));
        assert_eq!(a.residency(), Residency::InMemory);
    }

    #[derive(Debug, Default)]
    struct WatchingReplay {
        watched: Mutex<Vec<MatrixHandle>>,
        seen: Mutex<Vec<Residency>>,
    }

    impl LineageResolver for WatchingReplay {
        fn reconstruct(&self, _lineage: &Lineage) -> MantisResult<MatrixBlock> {
            let seen = self.watched.lock().iter().map(|h| h.residency()).collect();
            *self.seen.lock() = seen;
            Ok(block(4, 4, 7.0))
        }
    }

    #[test]
    fn test_room_is_made_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let one = block(4, 4, 1.0).in_memory_size();
        let config = BufferPoolConfig::new(dir.path().to_string_lossy())
            .with_memory_budget(2 * one + one / 2);
        let replay = Arc::new(WatchingReplay::default());
        let space =
            BufferPool::create_scratch_space_with(&config, replay.clone(), RuntimeStatistics::new())
                .unwrap();
        let pool = space.pool();

        let a = pool.create(block(4, 4, 1.0), chars(), ValueType::Double).unwrap();
        let b = pool.create(block(4, 4, 2.0), chars(), ValueType::Double).unwrap();
        replay.watched.lock().extend([a.clone(), b.clone()]);

        let job = JobDescriptor {
            job_id: "job-r".into(),
            exec_type: ExecType::Collection,
            job_type: JobType::Generic,
            steps: Vec::new(),
            inputs: Vec::new(),
            outputs: vec![0],
            output_dir: pool.job_dir("job-r"),
            partitioning: PartitioningSpec::single(),
            strict: true,
        };
        let output = DatasetRef {
            id: "job-r_out0".into(),
            path: pool.job_dir("job-r").join("job-r_out0.bin"),
            chars: MatrixCharacteristics::new(4, 4, 1000, 1000),
            value_type: ValueType::Double,
        };
        let lineage = Lineage {
            job: Arc::new(job),
            output: 0,
        };
        let h = pool.create_external(output, Some(lineage));
        assert_eq!(pool.pin(&h).unwrap().get(3, 3), 7.0);

        let seen = replay.seen.lock().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.iter().filter(|r| **r == Residency::InMemory).count(), 1);
        assert!(pool.memory_used() <= 2 * one + one / 2);
        pool.release(&h).unwrap();
    }

    #[test]
    fn test_missing_file_without_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let space = scratch(&dir, 0);
        let pool = space.pool();
        let ds = DatasetRef {
            id: "gone".into(),
            path: pool.root().join("gone.bin"),
            chars: MatrixCharacteristics::new(2, 2, 1000, 1000),
            value_type: ValueType::Double,
        };
        let h = pool.create_external(ds, None);
        assert_eq!(h.residency(), Residency::External);
        assert!(matches!(pool.pin(&h), Err(MantisError::IoError(_))));
        assert_eq!(h.pins(), 0);
    }

    #[test]
    fn test_lineage_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let space = scratch(&dir, 0);
        let pool = space.pool();

        let input = pool.create(block(2, 2, 1.0), chars(), ValueType::Double).unwrap();
        let input_ds = pool.export(&input).unwrap();
        let job = JobDescriptor {
            job_id: "job-1".into(),
            exec_type: ExecType::MapReduce,
            job_type: JobType::Generic,
            steps: vec![JobStep {
                op: Operator::Binary(ValueFunction::Plus),
                inputs: vec![StepInput::Input(0), StepInput::Input(1)],
                chars: MatrixCharacteristics::new(2, 2, 1000, 1000),
            }],
            inputs: vec![
                JobInput::Dataset(input_ds),
                JobInput::Scalar(ScalarValue::Double(41.0)),
            ],
            outputs: vec![0],
            output_dir: pool.job_dir("job-1"),
            partitioning: PartitioningSpec::single(),
            strict: true,
        };
        let output = DatasetRef {
            id: "job-1_out0".into(),
            path: pool.job_dir("job-1").join("job-1_out0.bin"),
            chars: MatrixCharacteristics::new(2, 2, 1000, 1000),
            value_type: ValueType::Double,
        };
        let lineage = Lineage {
            job: Arc::new(job),
            output: 0,
        };
        let h = pool.create_external(output, Some(lineage));
        let b = pool.pin(&h).unwrap();
        assert_eq!(b.to_rows(), vec![vec![42.0, 42.0], vec![42.0, 42.0]]);
        assert_eq!(pool.statistics().cache_hits(CacheHit::Lineage), 1);
        pool.release(&h).unwrap();

        // Reconstructed content is not written out on eviction.
        assert!(pool.evict(&h).unwrap());
        assert_eq!(pool.statistics().spill_writes(), 0);
        assert_eq!(pool.pin(&h).unwrap().get(0, 0), 42.0);
    }

    #[test]
    fn test_free_and_release_all() {
        let dir = tempfile::tempdir().unwrap();
        let space = scratch(&dir, 0);
        let pool = space.pool();
        let a = pool.create(block(2, 2, 1.0), chars(), ValueType::Double).unwrap();
        let b = pool.create(block(2, 2, 2.0), chars(), ValueType::Double).unwrap();
        pool.pin(&a).unwrap();
        pool.pin(&a).unwrap();
        pool.pin(&b).unwrap();
        assert!(pool.free(&b).is_err());
        assert_eq!(pool.release_all(), 3);

        pool.evict(&a).unwrap();
        let spill = pool.root().join(CACHE_DIR).join(format!("{}.bin", a.name()));
        assert!(spill.exists());
        pool.free(&a).unwrap();
        assert!(!spill.exists());
        assert_eq!(a.residency(), Residency::Empty);
        assert!(pool.pin(&a).is_err());
    }

    #[test]
    fn test_cleanup_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let space = scratch(&dir, 0);
        let root = space.pool().root().to_path_buf();
        assert!(root.join(CACHE_DIR).is_dir());
        let h = space
            .pool()
            .create(block(2, 2, 1.0), chars(), ValueType::Double)
            .unwrap();
        space.pool().evict(&h).unwrap();

        assert!(space.cleanup().unwrap());
        assert!(!root.exists());
        assert!(!space.cleanup().unwrap());
        assert!(space.is_cleaned());
        assert_eq!(space.pool().memory_used(), 0);
    }

    #[test]
    fn test_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let root = {
            let space = scratch(&dir, 0);
            space.pool().root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
