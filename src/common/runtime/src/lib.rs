//! Async runtime utilities for Mantis.
//!
//! Distributed-job instructions are `async`; these helpers let synchronous
//! callers drive them.

use std::future::Future;

use common_error::{MantisError, MantisResult};
use tokio::runtime::Runtime;

/// Get or create a Tokio runtime for blocking operations.
pub fn get_runtime() -> MantisResult<Runtime> {
    Runtime::new().map_err(|e| MantisError::InternalError(format!("Failed to create runtime: {e}")))
}

/// Block on a future using the default runtime.
pub fn block_on<F: Future>(future: F) -> MantisResult<F::Output> {
    let runtime = get_runtime()?;
    Ok(runtime.block_on(future))
}

/// Spawn a task on the current runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future)
}

/// A handle to a set of spawned tasks.
pub struct JoinSet<T> {
    inner: tokio::task::JoinSet<T>,
}

impl<T: Send + 'static> JoinSet<T> {
    /// Create a new join set.
    pub fn new() -> Self {
        Self {
            inner: tokio::task::JoinSet::new(),
        }
    }

    /// Spawn a task into the set.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.inner.spawn(future);
    }

    /// Wait for the next task to complete.
    pub async fn join_next(&mut self) -> Option<Result<T, tokio::task::JoinError>> {
        self.inner.join_next().await
    }

    /// Wait for every task, returning outputs in completion order.
    pub async fn join_all(mut self) -> MantisResult<Vec<T>> {
        let mut out = Vec::with_capacity(self.inner.len());
        while let Some(res) = self.inner.join_next().await {
            out.push(res.map_err(|e| MantisError::internal(format!("task failed: {e}")))?);
        }
        Ok(out)
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the number of tasks in the set.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T: Send + 'static> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on() {
        let v = block_on(async { 40 + 2 }).unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn test_join_set() {
        let mut set = JoinSet::new();
        for i in 0..4u64 {
            set.spawn(async move { i * 2 });
        }
        assert_eq!(set.len(), 4);
        let mut out = set.join_all().await.unwrap();
        out.sort_unstable();
        assert_eq!(out, vec![0, 2, 4, 6]);
    }
}
