//! VM thread control block.
//!
//! A [`VmThread`] is the fixed control structure for one worker execution
//! context. Control blocks are a bounded reusable resource: they are never
//! handed back to the allocator while the process runs, they are recycled
//! onto the dead-thread list after selective clearing (see
//! [`crate::lifecycle`]).
//!
//! The original offset-based "zone" layout is modelled as explicit field
//! groups:
//!
//! - [`ThreadHeadState`] — execution scratch, zeroed on recycle except for
//!   the two fields saved aside (`start_of_memory_block`, `ri_parameters`).
//! - Preserved middle fields (id, name, exit status, the halt-flags mutex
//!   and its contents) — never reached by the zeroing step. The halt flags
//!   and inspection-suspend counter are deliberately *updated* by recycle,
//!   never zeroed.
//! - `thread_object` / `carrier_thread_object` — the publication boundary.
//!   Recycle nulls these with an [`arc_swap`] store and a fence before any
//!   clearing, so a racing inspector never reads a half-cleared block
//!   through a stale but live reference.
//! - [`ThreadTailState`] — inline allocation cache and trace scratch,
//!   zeroed on recycle up to the configured cache size.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard};

bitflags! {
    /// Public event flags, observable by inspectors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PublicFlags: u32 {
        /// Thread is halted for inspection; dead threads carry this forever.
        const HALT_THREAD_INSPECTION = 1 << 0;
        const STOP_REQUESTED = 1 << 1;
        const SAMPLING_REQUESTED = 1 << 2;
        const EXCLUSIVE_RESPONSE = 1 << 3;
    }
}

impl PublicFlags {
    /// The flag class that survives recycling.
    pub const HALT_CLASS: PublicFlags = PublicFlags::HALT_THREAD_INSPECTION;
}

bitflags! {
    /// Private classification bits, part of the head zone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrivateFlags: u32 {
        const DAEMON_THREAD = 1 << 0;
        /// Attached natively rather than forked by the VM; deallocation is
        /// the last point this thread can be tracked, so the zombie counter
        /// is decremented for it.
        const ATTACHED_THREAD = 1 << 1;
    }
}

/// Opaque reference to the managed thread object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadObject {
    pub reference: usize,
}

/// Instrumentation parameters block. The slot survives recycling; the
/// contents are re-zeroed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RiParameters {
    pub control_flags: u64,
    pub sample_slots: [u64; 4],
}

impl RiParameters {
    pub fn clear(&mut self) {
        *self = RiParameters::default();
    }
}

/// Head zone: execution scratch cleared wholesale on recycle.
///
/// `start_of_memory_block` and `ri_parameters` live here (matching the
/// original layout) and are the two fields saved aside and restored by the
/// recycle step.
#[derive(Debug, Default)]
pub struct ThreadHeadState {
    pub pc: usize,
    pub stack_pointer: usize,
    pub stack_overflow_mark: usize,
    pub lookup_cache_generation: u64,
    pub temp_slots: [u64; 4],
    pub private_flags: PrivateFlags,
    /// Start of the larger allocation this control block lives inside.
    pub start_of_memory_block: usize,
    /// Instrumentation parameters; pointer preserved across recycling.
    pub ri_parameters: Option<Box<RiParameters>>,
}

/// Tail zone: from the thread-object boundary to the end of the per-VM
/// configurable inline allocation cache.
#[derive(Debug)]
pub struct ThreadTailState {
    pub inline_allocation_cache: Box<[u8]>,
    pub trace_scratch: u64,
}

impl ThreadTailState {
    fn new(inline_allocation_cache_size: usize) -> Self {
        Self {
            inline_allocation_cache: vec![0; inline_allocation_cache_size].into_boxed_slice(),
            trace_scratch: 0,
        }
    }

    pub(crate) fn zero(&mut self) {
        self.inline_allocation_cache.fill(0);
        self.trace_scratch = 0;
    }
}

/// Halt flags and the inspection-suspend counter, guarded by one mutex (the
/// "public flags mutex" of the original layout).
#[derive(Debug, Default)]
pub struct HaltState {
    pub flags: PublicFlags,
    pub inspection_suspend_count: u32,
}

/// One stack segment in the stack-of-stacks, most-recent first.
#[derive(Debug)]
pub struct StackSegment {
    pub size: usize,
    pub high_water_mark: usize,
    pub previous: Option<Box<StackSegment>>,
}

impl StackSegment {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            high_water_mark: 0,
            previous: None,
        }
    }
}

/// A pool of transient per-thread records (reference frames, monitor enter
/// records). Freed as a unit during deallocation.
#[derive(Debug, Default)]
pub struct ScratchPool {
    pub slots: Vec<u64>,
}

impl ScratchPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }
}

/// Owned sub-resources released during deallocation, each independently
/// absent-safe.
#[derive(Debug, Default)]
pub struct ThreadResources {
    /// Stack-of-stacks; `previous` links run most-recent to oldest.
    pub stack: Option<Box<StackSegment>>,
    pub tooling_tls: Option<Vec<u8>>,
    pub continuation_cache: Option<Vec<Box<[u8]>>>,
    pub local_reference_frames: Option<ScratchPool>,
    pub reference_frame_pool: Option<ScratchPool>,
    pub monitor_record_pool: Option<ScratchPool>,
    pub last_decompilation: Option<Box<[u8]>>,
    pub utf_cache: Option<HashMap<String, u32>>,
    pub ffi_args: Option<Vec<u64>>,
}

/// Snapshot of the fields the recycle zeroing step must never reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedSnapshot {
    pub id: u64,
    pub name: Option<String>,
    pub exit_status: i32,
}

/// Control block for one worker execution context.
pub struct VmThread {
    id: u64,
    name: Mutex<Option<String>>,
    os_handle: Mutex<Option<u64>>,
    exit_status: AtomicI32,
    halt: Mutex<HaltState>,
    /// Active inspectors walking this thread; mutated only under the
    /// thread-registry lock so deallocation can condvar-wait on it.
    pub(crate) inspector_count: AtomicUsize,
    thread_object: ArcSwapOption<ThreadObject>,
    carrier_thread_object: ArcSwapOption<ThreadObject>,
    head: Mutex<ThreadHeadState>,
    tail: Mutex<ThreadTailState>,
    resources: Mutex<ThreadResources>,
}

impl VmThread {
    pub fn new(id: u64, inline_allocation_cache_size: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: Mutex::new(None),
            os_handle: Mutex::new(None),
            exit_status: AtomicI32::new(0),
            halt: Mutex::new(HaltState::default()),
            inspector_count: AtomicUsize::new(0),
            thread_object: ArcSwapOption::empty(),
            carrier_thread_object: ArcSwapOption::empty(),
            head: Mutex::new(ThreadHeadState::default()),
            tail: Mutex::new(ThreadTailState::new(inline_allocation_cache_size)),
            resources: Mutex::new(ThreadResources::default()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_name(&self, name: Option<String>) {
        *self.name.lock() = name;
    }

    pub fn name(&self) -> Option<String> {
        self.name.lock().clone()
    }

    pub fn set_os_handle(&self, handle: Option<u64>) {
        *self.os_handle.lock() = handle;
    }

    pub fn os_handle(&self) -> Option<u64> {
        *self.os_handle.lock()
    }

    pub fn set_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::Relaxed);
    }

    pub fn set_daemon(&self, daemon: bool) {
        let mut head = self.head.lock();
        head.private_flags.set(PrivateFlags::DAEMON_THREAD, daemon);
    }

    pub fn is_daemon(&self) -> bool {
        self.head
            .lock()
            .private_flags
            .contains(PrivateFlags::DAEMON_THREAD)
    }

    pub fn install_thread_object(&self, object: ThreadObject) {
        self.thread_object.store(Some(Arc::new(object)));
    }

    pub fn install_carrier_thread_object(&self, object: ThreadObject) {
        self.carrier_thread_object.store(Some(Arc::new(object)));
    }

    pub fn thread_object(&self) -> Option<Arc<ThreadObject>> {
        self.thread_object.load_full()
    }

    pub fn carrier_thread_object(&self) -> Option<Arc<ThreadObject>> {
        self.carrier_thread_object.load_full()
    }

    /// Null out the managed thread-object references. Release semantics:
    /// after this store a concurrent reader that still holds a reference to
    /// the block will observe the null before any subsequent zone clearing.
    pub(crate) fn clear_thread_objects(&self) {
        self.thread_object.store(None);
        self.carrier_thread_object.store(None);
    }

    /// Push a fresh stack segment on top of the stack-of-stacks.
    pub fn push_stack_segment(&self, size: usize) {
        let mut resources = self.resources.lock();
        let mut segment = Box::new(StackSegment::new(size));
        segment.previous = resources.stack.take();
        resources.stack = Some(segment);
    }

    pub fn head(&self) -> MutexGuard<'_, ThreadHeadState> {
        self.head.lock()
    }

    pub fn tail(&self) -> MutexGuard<'_, ThreadTailState> {
        self.tail.lock()
    }

    pub fn halt(&self) -> MutexGuard<'_, HaltState> {
        self.halt.lock()
    }

    pub fn resources(&self) -> MutexGuard<'_, ThreadResources> {
        self.resources.lock()
    }

    pub fn halt_flags(&self) -> PublicFlags {
        self.halt.lock().flags
    }

    pub fn inspection_suspend_count(&self) -> u32 {
        self.halt.lock().inspection_suspend_count
    }

    pub fn inspector_count(&self) -> usize {
        self.inspector_count.load(Ordering::Acquire)
    }

    /// Fields that must be bit-identical across a recycle.
    pub fn preserved_snapshot(&self) -> PreservedSnapshot {
        PreservedSnapshot {
            id: self.id,
            name: self.name.lock().clone(),
            exit_status: self.exit_status.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for VmThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmThread")
            .field("id", &self.id)
            .field("inspector_count", &self.inspector_count())
            .finish()
    }
}
