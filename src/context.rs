//! Process context owning every global registry.
//!
//! The original runtime keeps these as fields of a single per-process VM
//! structure; modelling them as one explicit context passed by reference
//! keeps the single-instance usage while letting every test construct an
//! isolated context.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::exclusive::ExclusiveAccessCoordinator;
use crate::hooks::{ArchiveAccess, ImageAccess, MutatorCleanup, NoopCollaborators, VmHooks};
use crate::modules::ModuleRegistry;
use crate::registry::ThreadRegistry;
use crate::shared_cache::SharedCacheConfig;
use crate::stats::TeardownStats;

/// Per-VM configuration consulted by teardown paths.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Size of the inline allocation cache in the thread tail zone; the
    /// recycle zeroing extent covers it.
    pub inline_allocation_cache_size: usize,
    /// Report stack usage for each thread before its stacks are freed.
    pub report_stack_usage: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            inline_allocation_cache_size: 64,
            report_stack_usage: false,
        }
    }
}

/// The process-wide context: exclusive access gate, thread registry, module
/// pool, optional shared-cache configuration, and the collaborator sinks.
pub struct VmContext {
    pub exclusive: ExclusiveAccessCoordinator,
    pub threads: ThreadRegistry,
    pub modules: Mutex<ModuleRegistry>,
    /// Present when a shared-cache classpath pool is active for this VM;
    /// selects the shared-cache teardown path for class loaders.
    pub shared_cache: Option<SharedCacheConfig>,
    pub hooks: Arc<dyn VmHooks>,
    pub mutator_cleanup: Arc<dyn MutatorCleanup>,
    pub image_access: Arc<dyn ImageAccess>,
    pub archive_access: Arc<dyn ArchiveAccess>,
    /// Shared so collaborators invoked mid-teardown can observe progress.
    pub stats: Arc<TeardownStats>,
    pub config: VmConfig,
}

impl VmContext {
    pub fn new() -> Self {
        let noop = Arc::new(NoopCollaborators);
        Self {
            exclusive: ExclusiveAccessCoordinator::new(),
            threads: ThreadRegistry::new(),
            modules: Mutex::new(ModuleRegistry::new()),
            shared_cache: None,
            hooks: noop.clone(),
            mutator_cleanup: noop.clone(),
            image_access: noop.clone(),
            archive_access: noop,
            stats: Arc::new(TeardownStats::new()),
            config: VmConfig::default(),
        }
    }

    /// Create and link a new live thread with this context's configuration.
    pub fn spawn_thread(&self, id: u64) -> Arc<crate::thread::VmThread> {
        let thread = crate::thread::VmThread::new(id, self.config.inline_allocation_cache_size);
        self.threads.link_live(Arc::clone(&thread));
        thread
    }
}

impl Default for VmContext {
    fn default() -> Self {
        Self::new()
    }
}
