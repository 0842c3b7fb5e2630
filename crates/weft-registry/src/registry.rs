//! The module registry.
//!
//! Entries live in an arena and refer to each other by stable [`EntryId`],
//! keeping ownership acyclic while the import graph itself may contain
//! cycles. The registry also owns the packages, the process-wide parsing
//! flag (a re-entrancy guard for synchronous declarative bootstraps, not a
//! lock), and the memoized circularity check.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;

use crate::entry::Entry;
use crate::package::{Package, PackageOptions};

/// Stable handle to an entry in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryId(usize);

/// Stable handle to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackageId(usize);

/// Hook invoked when an entry's loaded event fires.
pub type LoadedHook = Box<dyn FnMut(EntryId)>;

/// Scoped guard for the process-wide parsing flag.
///
/// Held by the outermost declarative bootstrap; clears the flag on drop,
/// on every exit path including errors.
pub struct ParseGuard {
    flag: Rc<Cell<bool>>,
}

impl Drop for ParseGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Arena of entries and packages plus the shared load state.
pub struct Registry {
    entries: Vec<Entry>,
    packages: Vec<Package>,
    by_name: HashMap<String, EntryId>,
    parsing: Rc<Cell<bool>>,
    /// The engine's own source paths, for stack-frame classification.
    engine_paths: Vec<PathBuf>,
    loaded_hook: Option<LoadedHook>,
}

impl Registry {
    /// Create a registry whose default package uses the given options.
    pub fn new(default_options: PackageOptions) -> Self {
        Self {
            entries: Vec::new(),
            packages: vec![Package::new("<default>", default_options)],
            by_name: HashMap::new(),
            parsing: Rc::new(Cell::new(false)),
            engine_paths: Vec::new(),
            loaded_hook: None,
        }
    }

    /// The default package is always package zero.
    pub fn default_package(&self) -> PackageId {
        PackageId(0)
    }

    pub fn add_package(&mut self, name: impl Into<String>, options: PackageOptions) -> PackageId {
        let id = PackageId(self.packages.len());
        self.packages.push(Package::new(name, options));
        id
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    pub fn package_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.0]
    }

    /// Register an entry, indexing it by its host module id.
    pub fn add_entry(&mut self, entry: Entry) -> EntryId {
        let id = EntryId(self.entries.len());
        self.by_name.insert(entry.host.id.clone(), id);
        self.entries.push(entry);
        id
    }

    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.0]
    }

    /// Look up an entry by resolved module name.
    pub fn get_entry(&self, name: &str) -> Option<EntryId> {
        self.by_name.get(name).copied()
    }

    /// Record an import edge from `parent` to `child`.
    pub fn add_child(&mut self, parent: EntryId, name: impl Into<String>, child: EntryId) {
        self.entries[parent.0].children.insert(name.into(), child);
    }

    /// Whether a synchronous declarative bootstrap parse is in progress.
    pub fn parsing(&self) -> bool {
        self.parsing.get()
    }

    /// Set the parsing flag and hand out its releasing guard.
    pub fn begin_parse(&mut self) -> ParseGuard {
        debug_assert!(!self.parsing.get(), "nested declarative bootstrap");
        self.parsing.set(true);
        ParseGuard {
            flag: Rc::clone(&self.parsing),
        }
    }

    pub fn engine_paths(&self) -> &[PathBuf] {
        &self.engine_paths
    }

    pub fn add_engine_path(&mut self, path: impl Into<PathBuf>) {
        self.engine_paths.push(path.into());
    }

    pub fn set_loaded_hook(&mut self, hook: LoadedHook) {
        self.loaded_hook = Some(hook);
    }

    /// Fire an entry's one-shot loaded event.
    ///
    /// The first call flips the flag, applies exactly one binding update,
    /// and invokes the loaded hook once. Later calls are no-ops. Returns
    /// whether this call fired the event.
    pub fn mark_loaded(&mut self, id: EntryId) -> bool {
        if !self.entries[id.0].host.loaded.fire() {
            return false;
        }
        self.entries[id.0].update_bindings();
        if let Some(hook) = &mut self.loaded_hook {
            hook(id);
        }
        true
    }

    /// Memoized self-circularity check.
    ///
    /// Depth-first search over `children` starting at `id`; circular means
    /// the entry is reachable from itself. Computed at most once per entry.
    pub fn resolve_circular(&mut self, id: EntryId) -> bool {
        if let Some(circular) = self.entries[id.0].circular {
            return circular;
        }
        let mut seen = HashSet::new();
        let circular = self.reaches(id, id, &mut seen);
        self.entries[id.0].circular = Some(circular);
        circular
    }

    fn reaches(&self, from: EntryId, target: EntryId, seen: &mut HashSet<EntryId>) -> bool {
        for &child in self.entries[from.0].children.values() {
            if child == target {
                return true;
            }
            if seen.insert(child) && self.reaches(child, target, seen) {
                return true;
            }
        }
        false
    }
}
