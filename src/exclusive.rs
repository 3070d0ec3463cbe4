//! Process-wide exclusive access gate.
//!
//! One actor at a time may obtain a "world-stopped" view of shared runtime
//! state; destructive teardown paths that do not themselves need the view
//! still have to wait until no one holds it, because a holder may have cached
//! raw references into per-thread statistics that become invalid the moment
//! teardown starts.
//!
//! All transitions happen under a single mutex and wake-ups are broadcast,
//! since multiple teardown actors may be waiting at once. There are no
//! timeouts: a stuck holder is a fatal condition, not a case to recover from.

use parking_lot::{Condvar, Mutex};

/// Exclusive access is either clear or held by exactly one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusiveAccessState {
    None,
    Held,
}

/// Gate coordinating exclusive access across the whole process context.
///
/// # Examples
///
/// ```
/// use vmreap::exclusive::ExclusiveAccessCoordinator;
///
/// let coordinator = ExclusiveAccessCoordinator::new();
/// assert!(!coordinator.is_held());
///
/// {
///     let _guard = coordinator.acquire();
///     assert!(coordinator.is_held());
/// }
///
/// // Released on drop; await_clear returns immediately.
/// coordinator.await_clear();
/// ```
#[derive(Debug)]
pub struct ExclusiveAccessCoordinator {
    state: Mutex<ExclusiveAccessState>,
    cleared: Condvar,
}

impl ExclusiveAccessCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExclusiveAccessState::None),
            cleared: Condvar::new(),
        }
    }

    /// Block until the state is `None`, then transition to `Held`.
    ///
    /// The returned guard releases on drop and broadcasts to all waiters.
    pub fn acquire(&self) -> ExclusiveAccessGuard<'_> {
        let mut state = self.state.lock();
        while ExclusiveAccessState::None != *state {
            self.cleared.wait(&mut state);
        }
        *state = ExclusiveAccessState::Held;
        ExclusiveAccessGuard { coordinator: self }
    }

    /// Block until no actor holds exclusive access, without acquiring it.
    ///
    /// Used by teardown paths that only need to know nobody is mid-inspection
    /// of state they are about to destroy.
    pub fn await_clear(&self) {
        let mut state = self.state.lock();
        while ExclusiveAccessState::None != *state {
            self.cleared.wait(&mut state);
        }
    }

    pub fn is_held(&self) -> bool {
        ExclusiveAccessState::Held == *self.state.lock()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(ExclusiveAccessState::Held, *state);
        *state = ExclusiveAccessState::None;
        // Broadcast: several deallocation paths may be parked in await_clear.
        self.cleared.notify_all();
    }
}

impl Default for ExclusiveAccessCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII holder of exclusive access; dropping it releases the gate.
#[derive(Debug)]
pub struct ExclusiveAccessGuard<'a> {
    coordinator: &'a ExclusiveAccessCoordinator,
}

impl Drop for ExclusiveAccessGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.release();
    }
}
