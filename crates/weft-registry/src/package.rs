//! Packages: shared options and compile caches.
//!
//! Every entry belongs to a package. The package owns the compile cache
//! shared by its entries and a `dirty` flag that forces recompilation on
//! the next load (set when source-type detection is suspected wrong).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::compile_data::CompileData;

/// Source-type mode for a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Treat sources as dynamic scripts unless forced otherwise.
    #[default]
    Script,
    /// Auto-detect declarative sources.
    Auto,
    /// Treat all sources as declarative modules.
    Module,
}

/// Per-package configuration.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Full error detail; disables masking.
    pub debug: bool,
    pub mode: Mode,
    /// Opt into awaitable top-level execution.
    pub top_level_await: bool,
    /// Emit source-map annotations in rendered code.
    pub source_map: bool,
    /// Inject dynamic-module helper variables.
    pub cjs_vars: bool,
    /// On-disk location of the compile cache, if any.
    pub cache_path: Option<PathBuf>,
}

/// A package: options plus the compile cache for its entries.
#[derive(Debug, Default)]
pub struct Package {
    pub name: String,
    pub options: PackageOptions,
    /// Compile cache, keyed by cache name. At most one live artifact per
    /// key; replaced wholesale on invalidation.
    pub cache: HashMap<String, CompileData>,
    /// Forces recompilation on the next load.
    pub dirty: bool,
}

impl Package {
    pub fn new(name: impl Into<String>, options: PackageOptions) -> Self {
        Self {
            name: name.into(),
            options,
            cache: HashMap::new(),
            dirty: false,
        }
    }

    /// Look up a reusable cached artifact.
    ///
    /// A dirty package or a stale artifact (pending transforms) yields
    /// nothing; the caller must recompile.
    pub fn cached(&self, cache_key: &str) -> Option<&CompileData> {
        if self.dirty {
            return None;
        }
        self.cache.get(cache_key).filter(|data| !data.is_stale())
    }

    /// Store a fresh artifact, clearing the dirty flag.
    pub fn store(&mut self, cache_key: impl Into<String>, data: CompileData) {
        self.cache.insert(cache_key.into(), data);
        self.dirty = false;
    }

    /// Move the superseded artifact's opaque host output into a
    /// replacement that lacks its own. Recompilation invalidates the
    /// generated code, not the host's compile output.
    pub fn carry_script_data(&mut self, cache_key: &str, data: &mut CompileData) {
        if data.script_data.is_some() {
            return;
        }
        if let Some(old) = self.cache.get_mut(cache_key) {
            data.script_data = old.script_data.take();
        }
    }
}
