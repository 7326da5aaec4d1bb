//! Runtime statistics collected while a program executes.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Where a pinned matrix was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheHit {
    /// Already resident.
    Memory,
    /// Read back from a spill file.
    Spill,
    /// Read from a backend output dataset.
    Dataset,
    /// Recomputed from lineage.
    Lineage,
}

/// Hit count and accumulated time of one opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpcodeStats {
    pub count: u64,
    pub time: Duration,
}

#[derive(Debug, Default)]
struct StatsInner {
    started: Option<Instant>,
    elapsed: Duration,
    opcodes: BTreeMap<String, OpcodeStats>,
    jobs_submitted: u64,
    retries: u64,
    cache_hits: BTreeMap<CacheHit, u64>,
    evictions: u64,
    spill_writes: u64,
}

/// Shared statistics sink. Clones observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct RuntimeStatistics {
    inner: Arc<Mutex<StatsInner>>,
}

impl RuntimeStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a run.
    pub fn start(&self) {
        self.inner.lock().started = Some(Instant::now());
    }

    /// Mark the end of a run; accumulates the time since [`start`](Self::start).
    pub fn finish(&self) {
        let mut inner = self.inner.lock();
        if let Some(started) = inner.started.take() {
            inner.elapsed += started.elapsed();
        }
    }

    pub fn record_instruction(&self, opcode: &str, time: Duration) {
        let mut inner = self.inner.lock();
        let entry = inner.opcodes.entry(opcode.to_string()).or_default();
        entry.count += 1;
        entry.time += time;
    }

    pub fn record_job(&self) {
        self.inner.lock().jobs_submitted += 1;
    }

    pub fn record_retry(&self) {
        self.inner.lock().retries += 1;
    }

    pub fn record_cache_hit(&self, hit: CacheHit) {
        *self.inner.lock().cache_hits.entry(hit).or_default() += 1;
    }

    pub fn record_eviction(&self, spilled: bool) {
        let mut inner = self.inner.lock();
        inner.evictions += 1;
        if spilled {
            inner.spill_writes += 1;
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.lock().elapsed
    }

    pub fn opcode(&self, opcode: &str) -> OpcodeStats {
        self.inner
            .lock()
            .opcodes
            .get(opcode)
            .copied()
            .unwrap_or_default()
    }

    pub fn opcodes(&self) -> BTreeMap<String, OpcodeStats> {
        self.inner.lock().opcodes.clone()
    }

    pub fn jobs_submitted(&self) -> u64 {
        self.inner.lock().jobs_submitted
    }

    pub fn retries(&self) -> u64 {
        self.inner.lock().retries
    }

    pub fn cache_hits(&self, hit: CacheHit) -> u64 {
        self.inner.lock().cache_hits.get(&hit).copied().unwrap_or(0)
    }

    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }

    pub fn spill_writes(&self) -> u64 {
        self.inner.lock().spill_writes
    }

    /// Human-readable summary.
    pub fn display(&self) -> String {
        let inner = self.inner.lock();
        let hit = |h: CacheHit| inner.cache_hits.get(&h).copied().unwrap_or(0);
        let mut out = String::from("Mantis Statistics:\n");
        let _ = writeln!(out, "Total execution time:\t\t{:.3} sec.", inner.elapsed.as_secs_f64());
        let _ = writeln!(out, "Number of executed jobs:\t{}.", inner.jobs_submitted);
        let _ = writeln!(out, "Job retries:\t\t\t{}.", inner.retries);
        let _ = writeln!(
            out,
            "Cache hits (mem/spill/data/lin):\t{}/{}/{}/{}.",
            hit(CacheHit::Memory),
            hit(CacheHit::Spill),
            hit(CacheHit::Dataset),
            hit(CacheHit::Lineage)
        );
        let _ = writeln!(
            out,
            "Cache evictions (spilled):\t{} ({}).",
            inner.evictions, inner.spill_writes
        );

        let mut heavy: Vec<_> = inner.opcodes.iter().collect();
        heavy.sort_by(|a, b| b.1.time.cmp(&a.1.time).then_with(|| a.0.cmp(b.0)));
        if !heavy.is_empty() {
            out.push_str("Heavy hitter instructions (name, time, count):\n");
            for (i, (op, s)) in heavy.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "-- {}) \t{}\t{:.3} sec\t{}",
                    i + 1,
                    op,
                    s.time.as_secs_f64(),
                    s.count
                );
            }
        }
        out
    }
}

/// Wall-clock timer for one instruction.
#[derive(Debug)]
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_shared() {
        let stats = RuntimeStatistics::new();
        let clone = stats.clone();
        clone.record_instruction("+", Duration::from_millis(2));
        clone.record_instruction("+", Duration::from_millis(3));
        clone.record_job();
        clone.record_cache_hit(CacheHit::Spill);
        clone.record_eviction(true);

        let plus = stats.opcode("+");
        assert_eq!(plus.count, 2);
        assert_eq!(plus.time, Duration::from_millis(5));
        assert_eq!(stats.jobs_submitted(), 1);
        assert_eq!(stats.cache_hits(CacheHit::Spill), 1);
        assert_eq!(stats.cache_hits(CacheHit::Memory), 0);
        assert_eq!(stats.spill_writes(), 1);
        assert_eq!(stats.opcode("ba+*"), OpcodeStats::default());
    }

    #[test]
    fn test_display() {
        let stats = RuntimeStatistics::new();
        stats.start();
        stats.record_instruction("ba+*", Duration::from_millis(10));
        stats.finish();
        let text = stats.display();
        assert!(text.starts_with("Mantis Statistics:"));
        assert!(text.contains("Number of executed jobs:\t0."));
        assert!(text.contains("ba+*"));
    }
}
