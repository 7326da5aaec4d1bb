//! Execution context for one program run.

use std::collections::BTreeMap;
use std::sync::Arc;

use common_config::ExecutionConfig;
use common_error::{MantisError, MantisResult};
use log::warn;
use mantis_core::{MatrixCharacteristics, ValueType};
use tokio::sync::watch;

use super::backend::DistributedBackend;
use super::symbols::{RuntimeValue, SymbolTable, Variable};
use crate::instructions::TEMP_PREFIX;
use crate::memory::{BufferPool, ScratchSpace};
use crate::metrics::RuntimeStatistics;

/// Runtime state threaded through instruction execution.
///
/// Owns the symbol table and the run's scratch space. Instructions read and
/// write variables here; they never hold state themselves.
pub struct ExecutionContext {
    symbols: SymbolTable,
    scratch: ScratchSpace,
    backend: Option<Arc<dyn DistributedBackend>>,
    cancel_rx: watch::Receiver<bool>,
    stats: RuntimeStatistics,
    config: ExecutionConfig,
    block_size: i64,
    job_seq: usize,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.scratch.pool().run_id())
            .field("variables", &self.symbols.names())
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub fn new(scratch: ScratchSpace, config: ExecutionConfig, stats: RuntimeStatistics) -> Self {
        let (_, cancel_rx) = watch::channel(false);
        Self {
            symbols: SymbolTable::new(),
            scratch,
            backend: None,
            cancel_rx,
            stats,
            config,
            block_size: 1000,
            job_seq: 0,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn DistributedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_cancellation(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = cancel_rx;
        self
    }

    /// Blocking recorded for matrices created by instructions.
    pub fn with_block_size(mut self, block_size: i64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        self.scratch.pool()
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub fn backend(&self) -> Option<&Arc<dyn DistributedBackend>> {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn statistics(&self) -> &RuntimeStatistics {
        &self.stats
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    pub(crate) fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    /// Characteristics template for a newly created matrix.
    pub(crate) fn new_chars(&self) -> MatrixCharacteristics {
        MatrixCharacteristics::unknown().with_blocking(self.block_size, self.block_size)
    }

    /// Run-unique job id for compiled job `id`.
    pub(crate) fn next_job_id(&mut self, id: usize) -> String {
        self.job_seq += 1;
        format!("job{id}_{}", self.job_seq)
    }

    /// Bind a caller-provided value.
    pub fn bind_value(&mut self, name: impl Into<String>, value: RuntimeValue) -> MantisResult<()> {
        let var = match value {
            RuntimeValue::Scalar(s) => Variable::Scalar(s),
            RuntimeValue::Matrix(m) => {
                let chars = self.new_chars();
                Variable::Matrix(self.pool().create(m, chars, ValueType::Double)?)
            }
        };
        self.bind(name, var)
    }

    /// Bind `var`, freeing a replaced matrix that is no longer referenced.
    pub fn bind(&mut self, name: impl Into<String>, var: Variable) -> MantisResult<()> {
        let old = self.symbols.set(name, var);
        self.discard(old)
    }

    /// Bind in the innermost scope.
    pub fn bind_local(&mut self, name: impl Into<String>, var: Variable) -> MantisResult<()> {
        let old = self.symbols.set_local(name, var);
        self.discard(old)
    }

    pub fn unbind(&mut self, name: &str) -> MantisResult<()> {
        let old = self.symbols.remove(name);
        self.discard(old)
    }

    pub fn push_scope(&mut self) {
        self.symbols.push_scope();
    }

    pub fn pop_scope(&mut self) -> MantisResult<()> {
        for var in self.symbols.pop_scope() {
            self.discard(Some(var))?;
        }
        Ok(())
    }

    fn discard(&self, var: Option<Variable>) -> MantisResult<()> {
        match var {
            Some(Variable::Matrix(h)) if !self.symbols.references(&h) => self.pool().free(&h),
            _ => Ok(()),
        }
    }

    /// Materialize a variable.
    pub fn read_value(&self, name: &str) -> MantisResult<RuntimeValue> {
        match self.symbols.get(name) {
            Some(Variable::Scalar(s)) => Ok(RuntimeValue::Scalar(s.clone())),
            Some(Variable::Matrix(h)) => {
                let block = self.pool().pin(h);
                let value = block.map(|b| RuntimeValue::Matrix((*b).clone()));
                self.pool().release(h)?;
                value
            }
            None => Err(MantisError::execution(format!("undefined variable '{name}'"))),
        }
    }

    /// Every visible non-temporary variable, materialized.
    pub fn read_variables(&self) -> MantisResult<BTreeMap<String, RuntimeValue>> {
        self.symbols
            .names()
            .into_iter()
            .filter(|n| !n.starts_with(TEMP_PREFIX))
            .map(|n| {
                let v = self.read_value(&n)?;
                Ok((n, v))
            })
            .collect()
    }

    /// Release all pins and clean up the scratch space.
    pub fn unwind(&self) -> MantisResult<()> {
        let released = self.pool().release_all();
        if released > 0 {
            warn!("Unwinding run {}: dropped {released} pins", self.pool().run_id());
        }
        self.scratch.cleanup().map(|_| ())
    }
}

/// Handle for cancelling a running program from outside the executor.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a handle and the receiver to pass to the executor.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { cancel_tx: tx }, rx)
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new().0
    }
}
