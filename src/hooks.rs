//! External collaborators: event sinks and cleanup/close callbacks.
//!
//! Every collaborator is an opaque notification or release target. None of
//! their return values are consulted; a collaborator that cannot do its job
//! is expected to escalate fatally on its own, so the traits are infallible
//! by design.

use std::sync::Arc;

use crate::thread::VmThread;

/// Open handle to a classpath archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchiveHandle(pub u64);

/// Open handle to a module image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Notification sink for teardown events. Observers must not retain the
/// identities beyond the call.
pub trait VmHooks: Send + Sync {
    fn thread_destroyed(&self, _thread_id: u64) {}
    fn class_loader_unloaded(&self, _loader_id: u64) {}
    fn module_unloaded(&self, _name: &str) {}
}

/// Collector-side mutator cleanup, invoked once per deallocation before any
/// local state it may consult is released. Must not re-enter this subsystem.
pub trait MutatorCleanup: Send + Sync {
    fn cleanup_mutator_model_java(&self, thread: &VmThread);
}

/// Module-image access collaborator.
pub trait ImageAccess: Send + Sync {
    fn image_close(&self, handle: ImageHandle);
}

/// Archive access collaborator used to close open classpath archives.
pub trait ArchiveAccess: Send + Sync {
    fn close_archive(&self, handle: ArchiveHandle);
}

/// Default sinks that do nothing.
#[derive(Debug, Default)]
pub struct NoopCollaborators;

impl VmHooks for NoopCollaborators {}

impl MutatorCleanup for NoopCollaborators {
    fn cleanup_mutator_model_java(&self, _thread: &VmThread) {}
}

impl ImageAccess for NoopCollaborators {
    fn image_close(&self, _handle: ImageHandle) {}
}

impl ArchiveAccess for NoopCollaborators {
    fn close_archive(&self, _handle: ArchiveHandle) {}
}

/// Events observed by [`RecordingHooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmEvent {
    MutatorCleanup(u64),
    ThreadDestroyed(u64),
    ClassLoaderUnloaded(u64),
    ModuleUnloaded(String),
    ImageClosed(ImageHandle),
    ArchiveClosed(ArchiveHandle),
}

/// Channel-backed sink that records every event in order; the test side
/// drains the receiver to assert on ordering and cardinality.
pub struct RecordingHooks {
    tx: flume::Sender<VmEvent>,
}

impl RecordingHooks {
    pub fn new() -> (Arc<Self>, flume::Receiver<VmEvent>) {
        let (tx, rx) = flume::unbounded();
        (Arc::new(Self { tx }), rx)
    }

    fn record(&self, event: VmEvent) {
        // Receiver may be gone if the test only cares about side effects.
        let _ = self.tx.send(event);
    }
}

impl VmHooks for RecordingHooks {
    fn thread_destroyed(&self, thread_id: u64) {
        self.record(VmEvent::ThreadDestroyed(thread_id));
    }

    fn class_loader_unloaded(&self, loader_id: u64) {
        self.record(VmEvent::ClassLoaderUnloaded(loader_id));
    }

    fn module_unloaded(&self, name: &str) {
        self.record(VmEvent::ModuleUnloaded(name.to_string()));
    }
}

impl MutatorCleanup for RecordingHooks {
    fn cleanup_mutator_model_java(&self, thread: &VmThread) {
        self.record(VmEvent::MutatorCleanup(thread.id()));
    }
}

impl ImageAccess for RecordingHooks {
    fn image_close(&self, handle: ImageHandle) {
        self.record(VmEvent::ImageClosed(handle));
    }
}

impl ArchiveAccess for RecordingHooks {
    fn close_archive(&self, handle: ArchiveHandle) {
        self.record(VmEvent::ArchiveClosed(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_hooks_preserve_event_order() {
        let (hooks, rx) = RecordingHooks::new();
        hooks.thread_destroyed(1);
        hooks.module_unloaded("m");
        hooks.class_loader_unloaded(2);

        let events: Vec<_> = rx.drain().collect();
        assert_eq!(
            events,
            vec![
                VmEvent::ThreadDestroyed(1),
                VmEvent::ModuleUnloaded("m".to_string()),
                VmEvent::ClassLoaderUnloaded(2),
            ]
        );
    }
}
