//! Resident-memory accounting for the buffer pool.

use std::sync::atomic::{AtomicUsize, Ordering};

use common_error::{MantisError, MantisResult};

/// Tracks bytes held by resident matrix blocks.
pub trait MemoryManager: Send + Sync + std::fmt::Debug {
    /// Reserve memory. Returns a resource error if the limit would be exceeded.
    fn reserve(&self, bytes: usize) -> MantisResult<()>;

    /// Release previously reserved memory.
    fn release(&self, bytes: usize);

    fn used(&self) -> usize;

    /// Memory limit (0 = unlimited).
    fn limit(&self) -> usize;

    fn available(&self) -> usize {
        let limit = self.limit();
        if limit == 0 {
            usize::MAX
        } else {
            limit.saturating_sub(self.used())
        }
    }

    /// Check if a reservation would succeed without reserving.
    fn can_reserve(&self, bytes: usize) -> bool {
        let limit = self.limit();
        limit == 0 || self.used().saturating_add(bytes) <= limit
    }
}

/// Memory manager enforcing a byte limit with lock-free accounting.
#[derive(Debug)]
pub struct TrackingMemoryManager {
    used: AtomicUsize,
    limit: usize,
}

impl TrackingMemoryManager {
    /// `limit` in bytes; 0 means unlimited.
    pub fn new(limit: usize) -> Self {
        Self {
            used: AtomicUsize::new(0),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }
}

impl Default for TrackingMemoryManager {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl MemoryManager for TrackingMemoryManager {
    fn reserve(&self, bytes: usize) -> MantisResult<()> {
        if bytes == 0 {
            return Ok(());
        }

        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new = current.saturating_add(bytes);
            if self.limit > 0 && new > self.limit {
                return Err(MantisError::out_of_memory(
                    bytes,
                    format!("{current} of {} bytes in use", self.limit),
                ));
            }
            match self
                .used
                .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }

        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let new = current.saturating_sub(bytes);
            match self
                .used
                .compare_exchange_weak(current, new, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_error::ErrorKind;

    #[test]
    fn test_tracking_manager() {
        let manager = TrackingMemoryManager::new(1000);

        assert!(manager.reserve(500).is_ok());
        assert!(manager.reserve(400).is_ok());
        assert_eq!(manager.used(), 900);

        let err = manager.reserve(200).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(manager.used(), 900);
        assert!(!manager.can_reserve(200));
        assert_eq!(manager.available(), 100);

        manager.release(400);
        assert_eq!(manager.used(), 500);
        manager.release(10_000);
        assert_eq!(manager.used(), 0);
    }

    #[test]
    fn test_unlimited() {
        let manager = TrackingMemoryManager::unlimited();
        assert!(manager.reserve(1 << 40).is_ok());
        assert_eq!(manager.available(), usize::MAX);
    }
}
