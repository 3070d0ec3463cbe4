//! Class loader teardown.
//!
//! A class loader owns its indexes (class table, type-identity table,
//! ROM-class orphan table) and its classpath-entry array. Teardown frees
//! each owned index independently and dispatches classpath release to one
//! of two mutually exclusive paths: the plain path here, or the shared-cache
//! pool path in [`crate::shared_cache`] when a shared-cache configuration is
//! active for the VM.
//!
//! The caller holds exclusive access, so no internal locking is needed
//! beyond the shared-cache pool mutex on that path.

use std::collections::{HashMap, HashSet};

use crate::context::VmContext;
use crate::hooks::{ArchiveHandle, ImageHandle};
use crate::shared_cache::free_shared_cache_entries;

pub type LoaderId = u64;
pub type ClassIndex = usize;

/// Opaque reference to the loader's managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedRef(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClasspathEntryKind {
    Archive,
    Directory,
    Jimage,
}

/// Type-specific extra state carried by a classpath entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClasspathExtra {
    /// Open archive handle; closed and freed on release.
    Archive(ArchiveHandle),
    /// Open module-image handle; closed through the image-access collaborator.
    Image(ImageHandle),
    /// Opaque token for the loader's shared-cache pool item. Released through
    /// the cache pool, never here.
    CachePoolToken(u64),
}

#[derive(Debug)]
pub struct ClasspathEntry {
    pub path: Option<String>,
    pub path_length: usize,
    pub kind: ClasspathEntryKind,
    pub extra: Option<ClasspathExtra>,
}

impl ClasspathEntry {
    pub fn new(path: &str, kind: ClasspathEntryKind) -> Self {
        Self {
            path: Some(path.to_string()),
            path_length: path.len(),
            kind,
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: ClasspathExtra) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// A loader's classpath-entry array.
///
/// The first `init_count` entries were allocated as one contiguous block and
/// are freed once, as a block; entries past that index were appended later,
/// allocated individually, and are freed individually. Freeing an entry in
/// the initial range on its own would corrupt the allocator, so the split is
/// structural here.
#[derive(Debug, Default)]
pub struct ClasspathEntries {
    initial: Vec<ClasspathEntry>,
    appended: Vec<Box<ClasspathEntry>>,
}

impl ClasspathEntries {
    pub fn from_initial(initial: Vec<ClasspathEntry>) -> Self {
        Self {
            initial,
            appended: Vec::new(),
        }
    }

    /// Append an individually allocated entry after the initial block.
    pub fn append(&mut self, entry: ClasspathEntry) {
        self.appended.push(Box::new(entry));
    }

    pub fn count(&self) -> usize {
        self.initial.len() + self.appended.len()
    }

    pub fn init_count(&self) -> usize {
        self.initial.len()
    }

    pub fn first(&self) -> Option<&ClasspathEntry> {
        self.initial
            .first()
            .or_else(|| self.appended.first().map(|b| b.as_ref()))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClasspathEntry> + '_ {
        self.initial
            .iter_mut()
            .chain(self.appended.iter_mut().map(|b| b.as_mut()))
    }
}

/// Loaders that must outlive this one. The single-reference form avoids
/// allocating a set for the common one-element case; `Permanent` marks a
/// value that must never reach the free path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum OutlivingLoaders {
    #[default]
    Empty,
    Single(LoaderId),
    Many(HashSet<LoaderId>),
    Permanent,
}

/// Owner/namespace for a set of loaded classes and the classpath entries
/// used to locate them.
#[derive(Debug, Default)]
pub struct ClassLoader {
    pub id: LoaderId,
    pub system_loader: bool,
    pub loader_object: Option<ManagedRef>,
    pub class_table: Option<HashMap<String, ClassIndex>>,
    pub type_identity_table: Option<HashMap<ClassIndex, u64>>,
    pub orphan_table: Option<HashMap<String, ClassIndex>>,
    pub classpath: Option<ClasspathEntries>,
    pub outliving_loaders: OutlivingLoaders,
}

impl ClassLoader {
    pub fn new(id: LoaderId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Perform loader-specific cleanup. The caller holds exclusive access.
///
/// The loader's managed object, tables, and classpath entries are all
/// cleared on return.
pub fn clean_up_class_loader(ctx: &VmContext, loader: &mut ClassLoader) {
    debug_assert!(
        ctx.exclusive.is_held(),
        "class loader teardown requires exclusive access"
    );

    ctx.hooks.class_loader_unloaded(loader.id);

    // Null the back-reference first so no later step can reach back into a
    // half-torn-down loader through it.
    loader.loader_object = None;

    // Each table is an independent owned index.
    loader.class_table.take();
    loader.type_identity_table.take();
    loader.orphan_table.take();

    // Only non-system loaders get unloaded, so both paths may assume a
    // plain entry layout; which one runs depends solely on whether a
    // shared-cache configuration is active for this VM.
    if ctx.shared_cache.is_some() {
        if loader.classpath.is_some() {
            free_shared_cache_entries(ctx, loader);
        }
    } else if let Some(entries) = loader.classpath.take() {
        free_class_loader_entries(ctx, entries);
    }

    match std::mem::take(&mut loader.outliving_loaders) {
        OutlivingLoaders::Permanent => {
            panic!("permanent outliving-loaders set reached the free path")
        }
        OutlivingLoaders::Many(set) => {
            drop(set);
            ctx.stats.note_outliving_set_free();
        }
        // No heap structure behind the empty and single-reference forms.
        OutlivingLoaders::Empty | OutlivingLoaders::Single(_) => {}
    }
}

/// Free a classpath-entry array: release type-specific state for every
/// entry, then free appended entries individually and the initial block
/// exactly once.
pub fn free_class_loader_entries(ctx: &VmContext, mut entries: ClasspathEntries) {
    let init_count = entries.init_count();

    for entry in entries.iter_mut() {
        if let Some(extra) = entry.extra.take() {
            match extra {
                ClasspathExtra::Archive(handle) => ctx.archive_access.close_archive(handle),
                ClasspathExtra::Image(handle) => ctx.image_access.image_close(handle),
                // Pool-owned; the shared-cache path releases it.
                ClasspathExtra::CachePoolToken(_) => {}
            }
        }
        // Defense against reuse after free.
        entry.path = None;
        entry.path_length = 0;
    }

    // Additional entries are appended after the initial ones, allocated
    // separately.
    for entry in entries.appended.drain(..) {
        drop(entry);
        ctx.stats.note_classpath_entry_free();
    }

    // Initial entries were allocated together; free them together.
    if init_count > 0 {
        entries.initial.clear();
        ctx.stats.note_classpath_block_free();
    }
}
