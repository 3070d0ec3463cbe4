//! Safe deallocation and recycling of VM thread control blocks.
//!
//! Deallocation is not performed under exclusive access. It uses two
//! narrower synchronizations instead: a wait-for-clear against the
//! exclusive access gate (a holder may have cached raw references into this
//! thread's transient statistics), and a wait-for-zero against the
//! per-thread inspector count under the registry lock (an inspector may be
//! mid-walk through this thread). Both waits are cooperative and unbounded;
//! proceeding early would hand a dangling structure to the other actor.
//!
//! The registry lock is held from the inspector wait through the final
//! broadcast, which also guarantees no heap walking occurs while the
//! collector's mutator cleanup runs.

use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use crate::context::VmContext;
use crate::registry::RegistryInner;
use crate::thread::{PublicFlags, ThreadHeadState, VmThread};

/// Deallocate a live thread's control block.
///
/// Preconditions: the caller holds no conflicting locks and `thread` is
/// linked into the live list (fatal otherwise). On return the thread is on
/// the dead list, halted for inspection, with all owned sub-resources
/// released.
///
/// `decrement_zombie_count` is set for threads that were attached rather
/// than forked by the VM: deallocating the control block is the last point
/// such a thread can be tracked. `send_destroy_event` fires the
/// destroy-notification sink with the thread identity.
pub fn deallocate_vm_thread(
    ctx: &VmContext,
    thread: &Arc<VmThread>,
    decrement_zombie_count: bool,
    send_destroy_event: bool,
) {
    // An exclusive access holder may have stored references into this
    // thread's statistics. Once the state is clear those references are
    // invalid, so the thread can no longer (validly) be read through them.
    ctx.exclusive.await_clear();

    let mut inner = ctx.threads.inner.lock();

    // Cooperative wait, not a forced cancellation of the inspector.
    while thread.inspector_count.load(Ordering::Acquire) != 0 {
        ctx.threads.changed.wait(&mut inner);
    }

    inner.unlink_live(thread);

    // The report reads collector-side state, so it goes out while the
    // mutator model is still intact.
    if ctx.config.report_stack_usage && thread.resources().stack.is_some() {
        ctx.stats.note_stack_usage_report();
    }

    // Must run before thread-local collector state is released; holding the
    // registry lock keeps heap walkers out for the duration.
    ctx.mutator_cleanup.cleanup_mutator_model_java(thread);

    if send_destroy_event {
        ctx.hooks.thread_destroyed(thread.id());
    }

    let was_daemon = thread.is_daemon();
    release_thread_resources(ctx, thread);
    if was_daemon {
        inner.daemon_thread_count = inner
            .daemon_thread_count
            .checked_sub(1)
            .expect("daemon thread count underflow");
    }

    // Detach from the execution-context layer: identity teardown.
    thread.set_name(None);
    thread.set_os_handle(None);

    // No thread-specific field other than the preserved region may be
    // dereferenced after this call.
    recycle_vm_thread(&mut inner, thread);

    inner.total_thread_count = inner
        .total_thread_count
        .checked_sub(1)
        .expect("total thread count underflow");
    if decrement_zombie_count {
        inner.zombie_thread_count = inner
            .zombie_thread_count
            .checked_sub(1)
            .expect("zombie thread count underflow");
    }

    // Wake anything parked on the registry monitor (other deallocations
    // waiting out inspections, shutdown waiting for the thread count).
    ctx.threads.changed.notify_all();
}

/// Release every owned sub-resource, each step absent-safe and idempotent.
fn release_thread_resources(ctx: &VmContext, thread: &VmThread) {
    let mut resources = thread.resources();

    resources.tooling_tls.take();

    // Walk the stack-of-stacks most-recent to oldest, freeing each segment
    // and following its previous link.
    let mut current = resources.stack.take();
    while let Some(mut segment) = current {
        current = segment.previous.take();
        ctx.stats.note_stack_segment_freed();
    }

    resources.continuation_cache.take();

    if resources.local_reference_frames.take().is_some() {
        ctx.stats.note_pool_killed();
    }
    if resources.reference_frame_pool.take().is_some() {
        ctx.stats.note_pool_killed();
    }
    if resources.monitor_record_pool.take().is_some() {
        ctx.stats.note_pool_killed();
    }

    resources.last_decompilation.take();
    resources.utf_cache.take();
    resources.ffi_args.take();
}

/// Recycle the control block onto the dead list.
///
/// Control blocks are reused rather than freed: the structure is referenced
/// by raw offsets elsewhere in the runtime, so only the head and tail zones
/// are cleared and a small preserved set of fields survives reuse.
pub(crate) fn recycle_vm_thread(registry: &mut RegistryInner, thread: &Arc<VmThread>) {
    // Null the managed object references and fence before any clearing, so
    // a racing inspector observes "thread object is null" before it can
    // observe a half-cleared block through a stale but live reference.
    thread.clear_thread_objects();
    fence(Ordering::SeqCst);

    {
        let mut head = thread.head();

        // Saved aside across the head-zone clear, restored below.
        let start_of_memory_block = head.start_of_memory_block;
        let mut ri_parameters = head.ri_parameters.take();

        *head = ThreadHeadState::default();

        head.start_of_memory_block = start_of_memory_block;
        if let Some(ri) = ri_parameters.as_mut() {
            // The slot survives; the contents do not.
            ri.clear();
        }
        head.ri_parameters = ri_parameters;
    }

    thread.tail().zero();

    {
        let mut halt = thread.halt();

        // Clear all public event flags except the inspection-halt class.
        halt.flags &= PublicFlags::HALT_CLASS;

        // Dead threads remain visible to inspection tooling in a
        // well-defined halted state instead of disappearing.
        halt.inspection_suspend_count += 1;
        if halt.inspection_suspend_count == 1 {
            halt.flags.insert(PublicFlags::HALT_THREAD_INSPECTION);
        }
    }

    registry.push_dead(Arc::clone(thread));
}
