//! Mutator lifecycle and cross-reference teardown core for a managed runtime.
//!
//! This crate implements the machinery that safely retires a worker execution
//! context (a VM thread) and unlinks class loaders and modules from the global
//! namespace while the collector and other threads may be concurrently
//! observing shared structures:
//!
//! - [`exclusive`] — the process-wide exclusive access gate that destructive
//!   work must wait out (or hold) before proceeding.
//! - [`thread`], [`registry`], [`lifecycle`] — the VM thread control block,
//!   the live/dead thread lists, and the deallocate/recycle protocol.
//! - [`classloader`], [`shared_cache`] — class loader teardown, including the
//!   shared-cache classpath pool variant.
//! - [`modules`] — symmetric removal of a module from the bidirectional
//!   read/export relationship graph.
//!
//! All registries live in a [`VmContext`](context::VmContext) passed by
//! reference to every operation, so tests can construct fully isolated
//! contexts.

pub mod classloader;
pub mod context;
pub mod error;
pub mod exclusive;
pub mod heap_walk;
pub mod hooks;
pub mod lifecycle;
pub mod modules;
pub mod registry;
pub mod shared_cache;
pub mod stats;
pub mod thread;

pub use classloader::{clean_up_class_loader, free_class_loader_entries, ClassLoader};
pub use context::{VmConfig, VmContext};
pub use error::{VmError, VmResult};
pub use exclusive::{ExclusiveAccessCoordinator, ExclusiveAccessGuard, ExclusiveAccessState};
pub use lifecycle::deallocate_vm_thread;
pub use modules::{remove_module, ModuleRegistry};
pub use registry::ThreadRegistry;
pub use shared_cache::{free_shared_cache_entries, SharedCacheConfig};
pub use thread::VmThread;
