//! Allocator-facing instrumentation for teardown paths.
//!
//! Teardown never reports failures, so the observable contract is *which*
//! frees happened and how many. Every destructive path routes its releases
//! through these counters, which lets tests assert properties like "exactly
//! one block free for the initial classpath entries" without hooking the
//! global allocator.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters for the release operations performed by teardown paths.
#[derive(Debug, Default)]
pub struct TeardownStats {
    stack_segments_freed: AtomicUsize,
    stack_usage_reports: AtomicUsize,
    pools_killed: AtomicUsize,
    classpath_block_frees: AtomicUsize,
    classpath_entry_frees: AtomicUsize,
    outliving_set_frees: AtomicUsize,
}

impl TeardownStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn note_stack_segment_freed(&self) {
        self.stack_segments_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_stack_usage_report(&self) {
        self.stack_usage_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_pool_killed(&self) {
        self.pools_killed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_classpath_block_free(&self) {
        self.classpath_block_frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_classpath_entry_free(&self) {
        self.classpath_entry_frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_outliving_set_free(&self) {
        self.outliving_set_frees.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stack_segments_freed(&self) -> usize {
        self.stack_segments_freed.load(Ordering::Relaxed)
    }

    pub fn stack_usage_reports(&self) -> usize {
        self.stack_usage_reports.load(Ordering::Relaxed)
    }

    pub fn pools_killed(&self) -> usize {
        self.pools_killed.load(Ordering::Relaxed)
    }

    pub fn classpath_block_frees(&self) -> usize {
        self.classpath_block_frees.load(Ordering::Relaxed)
    }

    pub fn classpath_entry_frees(&self) -> usize {
        self.classpath_entry_frees.load(Ordering::Relaxed)
    }

    pub fn outliving_set_frees(&self) -> usize {
        self.outliving_set_frees.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let stats = TeardownStats::new();
        assert_eq!(stats.classpath_block_frees(), 0);
        assert_eq!(stats.classpath_entry_frees(), 0);

        stats.note_classpath_block_free();
        stats.note_classpath_entry_free();
        stats.note_classpath_entry_free();

        assert_eq!(stats.classpath_block_frees(), 1);
        assert_eq!(stats.classpath_entry_frees(), 2);
    }
}
