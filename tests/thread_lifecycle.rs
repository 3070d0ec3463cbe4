use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vmreap::context::{VmConfig, VmContext};
use vmreap::deallocate_vm_thread;
use vmreap::hooks::{MutatorCleanup, RecordingHooks, VmEvent};
use vmreap::stats::TeardownStats;
use vmreap::thread::{PublicFlags, ScratchPool, ThreadObject, VmThread};

#[test]
fn deallocated_thread_moves_to_dead_list_halted() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(1);
    thread.install_thread_object(ThreadObject { reference: 0x100 });

    deallocate_vm_thread(&ctx, &thread, false, false);

    assert!(!ctx.threads.is_live(1));
    assert!(ctx.threads.is_dead(1));
    assert_eq!(
        ctx.threads.dead_ids().iter().filter(|id| **id == 1).count(),
        1
    );
    assert!(thread.inspection_suspend_count() >= 1);
    assert!(thread
        .halt_flags()
        .contains(PublicFlags::HALT_THREAD_INSPECTION));
    assert!(thread.thread_object().is_none());
    assert_eq!(ctx.threads.total_thread_count(), 0);
}

#[test]
fn cleanup_collaborator_runs_before_destroy_event() {
    let mut ctx = VmContext::new();
    let (hooks, rx) = RecordingHooks::new();
    ctx.hooks = hooks.clone();
    ctx.mutator_cleanup = hooks.clone();

    let thread = ctx.spawn_thread(2);
    deallocate_vm_thread(&ctx, &thread, false, true);

    let events: Vec<_> = rx.drain().collect();
    assert_eq!(
        events,
        vec![VmEvent::MutatorCleanup(2), VmEvent::ThreadDestroyed(2)]
    );
}

#[test]
fn destroy_event_is_omitted_when_not_requested() {
    let mut ctx = VmContext::new();
    let (hooks, rx) = RecordingHooks::new();
    ctx.hooks = hooks.clone();

    let thread = ctx.spawn_thread(3);
    deallocate_vm_thread(&ctx, &thread, false, false);

    assert!(rx
        .drain()
        .all(|e| !matches!(e, VmEvent::ThreadDestroyed(_))));
}

#[test]
fn owned_resources_are_released_in_full() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(4);
    thread.push_stack_segment(4096);
    thread.push_stack_segment(8192);
    thread.push_stack_segment(16384);
    {
        let mut resources = thread.resources();
        resources.local_reference_frames = Some(ScratchPool::with_capacity(8));
        resources.reference_frame_pool = Some(ScratchPool::with_capacity(4));
        resources.monitor_record_pool = Some(ScratchPool::with_capacity(2));
        resources.utf_cache = Some(Default::default());
        resources.ffi_args = Some(vec![1, 2, 3]);
        resources.tooling_tls = Some(vec![0; 64]);
        resources.last_decompilation = Some(vec![0u8; 16].into_boxed_slice());
    }

    deallocate_vm_thread(&ctx, &thread, false, false);

    assert_eq!(ctx.stats.stack_segments_freed(), 3);
    assert_eq!(ctx.stats.pools_killed(), 3);
    let resources = thread.resources();
    assert!(resources.stack.is_none());
    assert!(resources.utf_cache.is_none());
    assert!(resources.ffi_args.is_none());
}

#[test]
fn absent_resources_are_skipped_without_error() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(5);

    deallocate_vm_thread(&ctx, &thread, false, false);

    assert_eq!(ctx.stats.stack_segments_freed(), 0);
    assert_eq!(ctx.stats.pools_killed(), 0);
    assert!(ctx.threads.is_dead(5));
}

#[test]
fn daemon_and_zombie_counters_are_decremented() {
    let ctx = VmContext::new();
    let thread = VmThread::new(6, ctx.config.inline_allocation_cache_size);
    thread.set_daemon(true);
    ctx.threads.link_live(Arc::clone(&thread));
    ctx.threads.note_zombie();

    assert_eq!(ctx.threads.daemon_thread_count(), 1);
    assert_eq!(ctx.threads.zombie_thread_count(), 1);

    deallocate_vm_thread(&ctx, &thread, true, false);

    assert_eq!(ctx.threads.daemon_thread_count(), 0);
    assert_eq!(ctx.threads.zombie_thread_count(), 0);
    assert_eq!(ctx.threads.total_thread_count(), 0);
}

#[test]
fn identity_is_detached_before_recycling() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(7);
    thread.set_name(Some("worker".to_string()));
    thread.set_os_handle(Some(0x77));

    deallocate_vm_thread(&ctx, &thread, false, false);

    assert!(thread.name().is_none());
    assert!(thread.os_handle().is_none());
}

#[test]
fn stack_usage_is_reported_once_when_enabled() {
    let mut ctx = VmContext::new();
    ctx.config = VmConfig {
        report_stack_usage: true,
        ..VmConfig::default()
    };

    let with_stack = ctx.spawn_thread(8);
    with_stack.push_stack_segment(4096);
    deallocate_vm_thread(&ctx, &with_stack, false, false);
    assert_eq!(ctx.stats.stack_usage_reports(), 1);

    let without_stack = ctx.spawn_thread(9);
    deallocate_vm_thread(&ctx, &without_stack, false, false);
    assert_eq!(ctx.stats.stack_usage_reports(), 1);
}

struct CleanupOrderSink {
    stats: Arc<TeardownStats>,
    reports_seen: AtomicUsize,
}

impl MutatorCleanup for CleanupOrderSink {
    fn cleanup_mutator_model_java(&self, _thread: &VmThread) {
        self.reports_seen
            .store(self.stats.stack_usage_reports(), Ordering::SeqCst);
    }
}

#[test]
fn stack_usage_is_reported_before_collector_cleanup() {
    let mut ctx = VmContext::new();
    ctx.config = VmConfig {
        report_stack_usage: true,
        ..VmConfig::default()
    };
    let sink = Arc::new(CleanupOrderSink {
        stats: Arc::clone(&ctx.stats),
        reports_seen: AtomicUsize::new(0),
    });
    ctx.mutator_cleanup = sink.clone();

    let thread = ctx.spawn_thread(12);
    thread.push_stack_segment(4096);
    deallocate_vm_thread(&ctx, &thread, false, false);

    // The collector-side cleanup must already see the report.
    assert_eq!(sink.reports_seen.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic(expected = "zombie thread count underflow")]
fn zombie_decrement_without_zombie_record_is_fatal() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(13);

    deallocate_vm_thread(&ctx, &thread, true, false);
}

#[test]
fn deallocation_waits_for_active_inspector() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(10);
    ctx.threads.begin_inspection(&thread);

    let finished = AtomicBool::new(false);

    crossbeam::scope(|s| {
        s.spawn(|_| {
            deallocate_vm_thread(&ctx, &thread, false, false);
            finished.store(true, Ordering::SeqCst);
        });

        // The deallocation must stay parked while the inspector is active.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));
        assert!(ctx.threads.is_live(10));

        ctx.threads.end_inspection(&thread);

        let backoff = crossbeam_utils::Backoff::new();
        while !finished.load(Ordering::SeqCst) {
            backoff.snooze();
        }
    })
    .unwrap();

    assert!(ctx.threads.is_dead(10));
}

#[test]
fn deallocation_waits_for_exclusive_access_to_clear() {
    let ctx = VmContext::new();
    let thread = ctx.spawn_thread(11);
    let guard = ctx.exclusive.acquire();

    let finished = AtomicBool::new(false);

    crossbeam::scope(|s| {
        s.spawn(|_| {
            deallocate_vm_thread(&ctx, &thread, false, false);
            finished.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));

        drop(guard);

        let backoff = crossbeam_utils::Backoff::new();
        while !finished.load(Ordering::SeqCst) {
            backoff.snooze();
        }
    })
    .unwrap();

    assert!(ctx.threads.is_dead(11));
}

#[test]
fn concurrent_deallocations_settle_every_thread() {
    let ctx = VmContext::new();
    let threads: Vec<_> = (0..8).map(|id| ctx.spawn_thread(id)).collect();

    let ctx_ref = &ctx;
    crossbeam::scope(|s| {
        for thread in &threads {
            s.spawn(move |_| {
                deallocate_vm_thread(ctx_ref, thread, false, false);
            });
        }
    })
    .unwrap();

    assert_eq!(ctx.threads.total_thread_count(), 0);
    assert!(ctx.threads.live_ids().is_empty());
    let mut dead = ctx.threads.dead_ids();
    dead.sort_unstable();
    assert_eq!(dead, (0..8).collect::<Vec<_>>());
}
