//! Live and dead thread lists, global thread counters, and the registry
//! monitor that inspection and deallocation synchronize on.
//!
//! The live list and the dead (recycled) list are disjoint; a thread is in
//! exactly one of them. All list and counter mutation happens under the
//! single registry mutex, and every state change other actors may be waiting
//! on (inspector count reaching zero, a deallocation completing) is
//! broadcast on the registry condvar.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::thread::VmThread;

#[derive(Debug, Default)]
pub(crate) struct RegistryInner {
    pub(crate) live: Vec<Arc<VmThread>>,
    pub(crate) dead: Vec<Arc<VmThread>>,
    pub(crate) total_thread_count: usize,
    pub(crate) daemon_thread_count: usize,
    pub(crate) zombie_thread_count: usize,
}

impl RegistryInner {
    fn contains(&self, id: u64) -> bool {
        self.live.iter().any(|t| t.id() == id) || self.dead.iter().any(|t| t.id() == id)
    }

    /// Remove the thread from the live list; invariant violation if absent.
    pub(crate) fn unlink_live(&mut self, thread: &Arc<VmThread>) {
        let position = self
            .live
            .iter()
            .position(|t| Arc::ptr_eq(t, thread))
            .unwrap_or_else(|| {
                panic!(
                    "thread {} deallocated while not linked into the live list",
                    thread.id()
                )
            });
        self.live.remove(position);
    }

    pub(crate) fn push_dead(&mut self, thread: Arc<VmThread>) {
        debug_assert!(
            !self.live.iter().any(|t| Arc::ptr_eq(t, &thread)),
            "thread {} recycled while still on the live list",
            thread.id()
        );
        self.dead.push(thread);
    }
}

/// Registry of all VM threads in one process context.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    pub(crate) inner: Mutex<RegistryInner>,
    pub(crate) changed: Condvar,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a freshly created thread into the live list and bump the global
    /// counters. Invariant violation if the thread is already linked.
    pub fn link_live(&self, thread: Arc<VmThread>) {
        let mut inner = self.inner.lock();
        assert!(
            !inner.contains(thread.id()),
            "thread {} linked twice",
            thread.id()
        );
        inner.total_thread_count += 1;
        if thread.is_daemon() {
            inner.daemon_thread_count += 1;
        }
        inner.live.push(thread);
    }

    /// Record a thread that exited natively but whose control block lingers
    /// for inspection.
    pub fn note_zombie(&self) {
        self.inner.lock().zombie_thread_count += 1;
    }

    /// Mark the thread as actively inspected. Deallocation waits until every
    /// inspector has finished.
    pub fn begin_inspection(&self, thread: &VmThread) {
        let _inner = self.inner.lock();
        thread.inspector_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one inspection; broadcasts so a parked deallocation can recheck.
    pub fn end_inspection(&self, thread: &VmThread) {
        let _inner = self.inner.lock();
        let previous = thread.inspector_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "unbalanced end_inspection");
        self.changed.notify_all();
    }

    pub fn is_live(&self, id: u64) -> bool {
        self.inner.lock().live.iter().any(|t| t.id() == id)
    }

    pub fn is_dead(&self, id: u64) -> bool {
        self.inner.lock().dead.iter().any(|t| t.id() == id)
    }

    pub fn live_ids(&self) -> Vec<u64> {
        self.inner.lock().live.iter().map(|t| t.id()).collect()
    }

    pub fn dead_ids(&self) -> Vec<u64> {
        self.inner.lock().dead.iter().map(|t| t.id()).collect()
    }

    pub fn get(&self, id: u64) -> Option<Arc<VmThread>> {
        let inner = self.inner.lock();
        inner
            .live
            .iter()
            .chain(inner.dead.iter())
            .find(|t| t.id() == id)
            .cloned()
    }

    pub fn total_thread_count(&self) -> usize {
        self.inner.lock().total_thread_count
    }

    pub fn daemon_thread_count(&self) -> usize {
        self.inner.lock().daemon_thread_count
    }

    pub fn zombie_thread_count(&self) -> usize {
        self.inner.lock().zombie_thread_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_and_enumerates_threads() {
        let registry = ThreadRegistry::new();
        registry.link_live(VmThread::new(1, 0));
        registry.link_live(VmThread::new(2, 0));

        let mut ids = registry.live_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(registry.total_thread_count(), 2);
    }

    #[test]
    fn daemon_threads_bump_daemon_counter() {
        let registry = ThreadRegistry::new();
        let daemon = VmThread::new(3, 0);
        daemon.set_daemon(true);
        registry.link_live(daemon);
        registry.link_live(VmThread::new(4, 0));

        assert_eq!(registry.daemon_thread_count(), 1);
    }

    #[test]
    #[should_panic(expected = "linked twice")]
    fn double_link_is_fatal() {
        let registry = ThreadRegistry::new();
        let thread = VmThread::new(5, 0);
        registry.link_live(Arc::clone(&thread));
        registry.link_live(thread);
    }

    #[test]
    fn inspection_counter_balances() {
        let registry = ThreadRegistry::new();
        let thread = VmThread::new(6, 0);
        registry.link_live(Arc::clone(&thread));

        registry.begin_inspection(&thread);
        registry.begin_inspection(&thread);
        assert_eq!(thread.inspector_count(), 2);

        registry.end_inspection(&thread);
        registry.end_inspection(&thread);
        assert_eq!(thread.inspector_count(), 0);
    }
}
