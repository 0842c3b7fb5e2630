//! Module registry for the weft engine.
//!
//! Weft lets two module semantics coexist inside one host module system:
//! "dynamic" modules (dynamic-scope exports object, eager execution) and
//! "declarative" modules (static import/export bindings that update live).
//! This crate holds the shared state: per-module [`Entry`] records, cached
//! [`CompileData`] artifacts, per-[`Package`] options and compile caches,
//! and the [`Registry`] arena that ties the module graph together.

pub mod compile_data;
pub mod entry;
pub mod namespace;
pub mod package;
pub mod registry;

pub use compile_data::{CompileData, RunResult, SourceHint, SourcePos, SourceType, Transforms};
pub use entry::{Entry, EntryState, HostModule, ModuleType, OnceEvent, FORCED_MODULE_EXT};
pub use namespace::{BindingGetter, Namespace};
pub use package::{Mode, Package, PackageOptions};
pub use registry::{EntryId, PackageId, ParseGuard, Registry};
