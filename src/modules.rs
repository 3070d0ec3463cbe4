//! Module/package relationship graph and symmetric teardown.
//!
//! Every read and export relation is dual-indexed: a module's
//! `read_access` set ("modules I read") is mirrored by the peer's
//! `remove_access` set ("modules that read me"), and a package's `exports`
//! set is mirrored by the module's `remove_exports` set. The reverse
//! indexes exist so that removing a node can find every edge pointing at it
//! without scanning the whole graph — and teardown must sever each edge
//! from both endpoints, since nothing else will clean the back-references.
//!
//! All mutation happens under exclusive access, which reduces the graph
//! problem to a single-threaded one; edges are always added and removed in
//! symmetric pairs so the dual indexes stay exact inverses except during an
//! in-progress removal.

use std::collections::{HashMap, HashSet};

use crate::context::VmContext;
use crate::error::{VmError, VmResult};

pub type ModuleId = u64;
pub type PackageId = u64;

/// A namespace-level module with explicit read/export relations.
#[derive(Debug, Default)]
pub struct Module {
    name: Option<String>,
    /// Modules this module may read.
    read_access: Option<HashSet<ModuleId>>,
    /// Reverse index: modules whose `read_access` contains this module.
    remove_access: Option<HashSet<ModuleId>>,
    /// Reverse index: packages whose `exports` contains this module.
    remove_exports: Option<HashSet<PackageId>>,
}

impl Module {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn read_access(&self) -> Option<&HashSet<ModuleId>> {
        self.read_access.as_ref()
    }

    pub fn remove_access(&self) -> Option<&HashSet<ModuleId>> {
        self.remove_access.as_ref()
    }

    pub fn remove_exports(&self) -> Option<&HashSet<PackageId>> {
        self.remove_exports.as_ref()
    }
}

/// A package, referenced but never owned by the modules it is exported to.
#[derive(Debug)]
pub struct Package {
    name: String,
    exports: HashSet<ModuleId>,
}

impl Package {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exports(&self) -> &HashSet<ModuleId> {
        &self.exports
    }
}

/// The global module pool plus the package table.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<ModuleId, Module>,
    packages: HashMap<PackageId, Package>,
    next_module_id: ModuleId,
    next_package_id: PackageId,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: &str) -> ModuleId {
        let id = self.next_module_id;
        self.next_module_id += 1;
        self.modules.insert(
            id,
            Module {
                name: Some(name.to_string()),
                ..Module::default()
            },
        );
        id
    }

    pub fn add_package(&mut self, name: &str) -> PackageId {
        let id = self.next_package_id;
        self.next_package_id += 1;
        self.packages.insert(
            id,
            Package {
                name: name.to_string(),
                exports: HashSet::new(),
            },
        );
        id
    }

    pub fn contains_module(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(&id)
    }

    fn check_module(&self, id: ModuleId) -> VmResult<()> {
        if self.modules.contains_key(&id) {
            Ok(())
        } else {
            Err(VmError::UnknownModule(id))
        }
    }

    /// Grant `reader` read access to `readee`, maintaining both directions.
    pub fn add_read_edge(&mut self, reader: ModuleId, readee: ModuleId) -> VmResult<()> {
        self.check_module(reader)?;
        self.check_module(readee)?;

        if let Some(module) = self.modules.get_mut(&reader) {
            module
                .read_access
                .get_or_insert_with(HashSet::new)
                .insert(readee);
        }
        if let Some(module) = self.modules.get_mut(&readee) {
            module
                .remove_access
                .get_or_insert_with(HashSet::new)
                .insert(reader);
        }
        Ok(())
    }

    /// Sever the read edge from both endpoints.
    pub fn remove_read_edge(&mut self, reader: ModuleId, readee: ModuleId) -> VmResult<()> {
        self.check_module(reader)?;
        self.check_module(readee)?;

        if let Some(module) = self.modules.get_mut(&reader) {
            if let Some(read_access) = module.read_access.as_mut() {
                read_access.remove(&readee);
            }
        }
        if let Some(module) = self.modules.get_mut(&readee) {
            if let Some(remove_access) = module.remove_access.as_mut() {
                remove_access.remove(&reader);
            }
        }
        Ok(())
    }

    /// Export `package` to `module`, maintaining both directions.
    pub fn add_export_edge(&mut self, package: PackageId, module: ModuleId) -> VmResult<()> {
        self.check_module(module)?;
        let Some(pkg) = self.packages.get_mut(&package) else {
            return Err(VmError::UnknownPackage(package));
        };

        pkg.exports.insert(module);
        if let Some(m) = self.modules.get_mut(&module) {
            m.remove_exports
                .get_or_insert_with(HashSet::new)
                .insert(package);
        }
        Ok(())
    }

    /// Sever the export edge from both endpoints.
    pub fn remove_export_edge(&mut self, package: PackageId, module: ModuleId) -> VmResult<()> {
        self.check_module(module)?;
        let Some(pkg) = self.packages.get_mut(&package) else {
            return Err(VmError::UnknownPackage(package));
        };

        pkg.exports.remove(&module);
        if let Some(m) = self.modules.get_mut(&module) {
            if let Some(remove_exports) = m.remove_exports.as_mut() {
                remove_exports.remove(&package);
            }
        }
        Ok(())
    }

    /// Drain every relation table of the module, deleting the reverse edge
    /// on each peer, then drop the module from the pool. The module must be
    /// present; removing an unknown module is an invariant violation.
    fn remove_module_inner(&mut self, id: ModuleId) -> Module {
        let mut module = self
            .modules
            .remove(&id)
            .unwrap_or_else(|| panic!("module {id} absent from the module pool"));

        // Peers that read this module: delete it from their read sets.
        if let Some(peers) = module.remove_access.take() {
            for peer in peers {
                if let Some(peer_module) = self.modules.get_mut(&peer) {
                    if let Some(read_access) = peer_module.read_access.as_mut() {
                        read_access.remove(&id);
                    }
                }
            }
        }

        // Modules this one read: symmetric cleanup of their reverse index.
        if let Some(targets) = module.read_access.take() {
            for target in targets {
                if let Some(target_module) = self.modules.get_mut(&target) {
                    if let Some(remove_access) = target_module.remove_access.as_mut() {
                        remove_access.remove(&id);
                    }
                }
            }
        }

        // Packages that exported to this module.
        if let Some(packages) = module.remove_exports.take() {
            for package in packages {
                if let Some(pkg) = self.packages.get_mut(&package) {
                    pkg.exports.remove(&id);
                }
            }
        }

        module.name.take();
        module
    }
}

/// Remove a module from the graph and the global pool, severing every edge
/// from both endpoints. Precondition: exclusive access held.
pub fn remove_module(ctx: &VmContext, id: ModuleId) {
    debug_assert!(
        ctx.exclusive.is_held(),
        "module removal requires exclusive access"
    );

    let mut registry = ctx.modules.lock();
    let name = registry
        .module(id)
        .and_then(|m| m.name())
        .map(str::to_string);
    if let Some(name) = name.as_deref() {
        ctx.hooks.module_unloaded(name);
    }
    registry.remove_module_inner(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_edges_are_dual_indexed() {
        let mut registry = ModuleRegistry::new();
        let a = registry.add_module("a");
        let b = registry.add_module("b");
        registry.add_read_edge(a, b).unwrap();

        assert!(registry.module(a).unwrap().read_access().unwrap().contains(&b));
        assert!(registry.module(b).unwrap().remove_access().unwrap().contains(&a));

        registry.remove_read_edge(a, b).unwrap();
        assert!(registry.module(a).unwrap().read_access().unwrap().is_empty());
        assert!(registry.module(b).unwrap().remove_access().unwrap().is_empty());
    }

    #[test]
    fn export_edges_are_dual_indexed() {
        let mut registry = ModuleRegistry::new();
        let m = registry.add_module("m");
        let q = registry.add_package("q");
        registry.add_export_edge(q, m).unwrap();

        assert!(registry.package(q).unwrap().exports().contains(&m));
        assert!(registry.module(m).unwrap().remove_exports().unwrap().contains(&q));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut registry = ModuleRegistry::new();
        let a = registry.add_module("a");

        assert_eq!(registry.add_read_edge(a, 99), Err(VmError::UnknownModule(99)));
        assert_eq!(
            registry.add_export_edge(42, a),
            Err(VmError::UnknownPackage(42))
        );
    }

    #[test]
    fn absent_tables_are_a_normal_terminal_state() {
        let mut registry = ModuleRegistry::new();
        let lonely = registry.add_module("lonely");

        // No relation tables were ever created; removal does no edge work.
        let module = registry.remove_module_inner(lonely);
        assert!(module.read_access().is_none());
        assert!(!registry.contains_module(lonely));
    }

    #[test]
    #[should_panic(expected = "absent from the module pool")]
    fn removing_unknown_module_is_fatal() {
        let mut registry = ModuleRegistry::new();
        registry.remove_module_inner(123);
    }
}
