//! Per-module entry records.
//!
//! An [`Entry`] tracks everything the compile and execution drivers need
//! for one loaded module instance: its host module object, compile state,
//! resolved module type, runtime namespace, and position in the import
//! graph. State only advances along the transitions in
//! [`EntryState::can_advance`]; any execution error forces the terminal
//! [`EntryState::ExecutionCompleted`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::compile_data::CompileData;
use crate::namespace::{BindingGetter, Namespace};
use crate::registry::{EntryId, PackageId};

/// File extension that forces declarative semantics (and rules out
/// awaitable top-level execution).
pub const FORCED_MODULE_EXT: &str = "mod";

/// Lifecycle state of an entry.
///
/// Declarative bootstrap path: `Initial -> ParsingStarted -> ParsingCompleted`.
/// Direct path: `Initial -> ExecutionStarted -> ExecutionCompleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Initial,
    ParsingStarted,
    ParsingCompleted,
    ExecutionStarted,
    ExecutionCompleted,
}

impl EntryState {
    /// Exhaustive transition table for the state machine.
    pub fn can_advance(self, next: EntryState) -> bool {
        matches!(
            (self, next),
            (EntryState::Initial, EntryState::ParsingStarted)
                | (EntryState::ParsingStarted, EntryState::ParsingCompleted)
                | (EntryState::Initial, EntryState::ExecutionStarted)
                | (EntryState::ExecutionStarted, EntryState::ExecutionCompleted)
        )
    }

    /// Terminal states never advance further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EntryState::ParsingCompleted | EntryState::ExecutionCompleted
        )
    }
}

/// Resolved semantics of an entry.
///
/// Live-binding getters exist only on declarative entries.
#[derive(Debug)]
pub enum ModuleType {
    /// Dynamic-scope exports object, eager execution.
    Dynamic,
    /// Static import/export bindings that update live.
    Declarative {
        /// Exported names mapped to their binding accessors.
        getters: HashMap<String, BindingGetter>,
    },
}

impl ModuleType {
    /// A declarative type with no getters populated yet.
    pub fn declarative() -> Self {
        ModuleType::Declarative {
            getters: HashMap::new(),
        }
    }

    pub fn is_declarative(&self) -> bool {
        matches!(self, ModuleType::Declarative { .. })
    }

    /// Binding getters, present only on declarative entries.
    pub fn getters(&self) -> Option<&HashMap<String, BindingGetter>> {
        match self {
            ModuleType::Dynamic => None,
            ModuleType::Declarative { getters } => Some(getters),
        }
    }

    pub fn getters_mut(&mut self) -> Option<&mut HashMap<String, BindingGetter>> {
        match self {
            ModuleType::Dynamic => None,
            ModuleType::Declarative { getters } => Some(getters),
        }
    }
}

/// A one-shot event: fires exactly once, observable afterwards.
#[derive(Debug, Default)]
pub struct OnceEvent {
    fired: bool,
}

impl OnceEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the event. Returns true only on the first call.
    pub fn fire(&mut self) -> bool {
        if self.fired {
            false
        } else {
            self.fired = true;
            true
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired
    }
}

/// The host module object an entry wraps.
#[derive(Debug)]
pub struct HostModule {
    /// Resolved module name.
    pub id: String,
    /// Filename the module was loaded from.
    pub filename: PathBuf,
    /// The module's exported value.
    pub exports: Value,
    /// One-shot "loaded" lifecycle event.
    pub loaded: OnceEvent,
}

impl HostModule {
    pub fn new(id: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            exports: Value::Object(Map::new()),
            loaded: OnceEvent::new(),
        }
    }
}

/// Compile/execution state for one loaded module instance.
#[derive(Debug)]
pub struct Entry {
    /// The wrapped host module.
    pub host: HostModule,
    /// Owning package.
    pub package: PackageId,
    /// File extension, without the leading dot.
    pub extension: String,
    /// Key into the package's compile cache.
    pub cache_key: String,
    /// Source modification time, in millis.
    pub mtime: Option<i64>,
    /// Name of the runtime binding injected into rendered source.
    pub runtime_name: String,
    pub state: EntryState,
    pub module_type: ModuleType,
    /// Compiled artifact; absent until first compile.
    pub compile_data: Option<CompileData>,
    /// Live-binding object; created at most once.
    pub runtime: Option<Rc<RefCell<Namespace>>>,
    /// Tri-state circularity: computed at most once, never recomputed.
    pub circular: Option<bool>,
    /// True only while the host execution primitive is active.
    pub running: bool,
    /// Import graph: resolved child name to child entry.
    pub children: HashMap<String, EntryId>,
}

impl Entry {
    pub fn new(id: impl Into<String>, filename: impl Into<PathBuf>, package: PackageId) -> Self {
        let host = HostModule::new(id, filename);
        let extension = extension_of(&host.filename);
        let cache_key = host.id.clone();
        Self {
            host,
            package,
            extension,
            cache_key,
            mtime: None,
            runtime_name: "__weft".to_string(),
            state: EntryState::Initial,
            module_type: ModuleType::Dynamic,
            compile_data: None,
            runtime: None,
            circular: None,
            running: false,
            children: HashMap::new(),
        }
    }

    /// Advance the state machine.
    ///
    /// Re-entering the current state is a no-op; terminal states are never
    /// left. Any other transition must appear in the table.
    pub fn advance(&mut self, next: EntryState) {
        if self.state == next || self.state.is_terminal() {
            return;
        }
        debug_assert!(
            self.state.can_advance(next),
            "illegal entry state transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Force the failed-but-completed terminal marker.
    pub fn fail(&mut self) {
        self.state = EntryState::ExecutionCompleted;
    }

    /// Replace the exported value with a fresh empty object (confirmed
    /// self-circular modules, before the second pass).
    pub fn replace_exports(&mut self) {
        self.host.exports = Value::Object(Map::new());
    }

    /// Apply one live-binding update from the host module's exports.
    pub fn update_bindings(&mut self) {
        if let Some(runtime) = &self.runtime {
            runtime.borrow_mut().merge_exports(&self.host.exports);
        }
    }

    /// Binding updates applied to this entry's namespace so far.
    pub fn binding_updates(&self) -> u32 {
        self.runtime
            .as_ref()
            .map_or(0, |runtime| runtime.borrow().updates())
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PackageId;
    use serde_json::json;

    fn entry() -> Entry {
        Entry::new("mod/a", "/src/a.dyn", PackageId::default())
    }

    #[test]
    fn test_transition_table() {
        use EntryState::*;
        let legal = [
            (Initial, ParsingStarted),
            (ParsingStarted, ParsingCompleted),
            (Initial, ExecutionStarted),
            (ExecutionStarted, ExecutionCompleted),
        ];
        let all = [
            Initial,
            ParsingStarted,
            ParsingCompleted,
            ExecutionStarted,
            ExecutionCompleted,
        ];
        for from in all {
            for to in all {
                let expected = legal.contains(&(from, to));
                assert_eq!(from.can_advance(to), expected, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(EntryState::ParsingCompleted.is_terminal());
        assert!(EntryState::ExecutionCompleted.is_terminal());
        assert!(!EntryState::Initial.is_terminal());
        assert!(!EntryState::ParsingStarted.is_terminal());
        assert!(!EntryState::ExecutionStarted.is_terminal());
    }

    #[test]
    fn test_fail_forces_terminal_from_any_state() {
        for state in [
            EntryState::Initial,
            EntryState::ParsingStarted,
            EntryState::ExecutionStarted,
        ] {
            let mut e = entry();
            e.state = state;
            e.fail();
            assert_eq!(e.state, EntryState::ExecutionCompleted);
        }
    }

    #[test]
    fn test_advance_is_idempotent() {
        let mut e = entry();
        e.advance(EntryState::ExecutionStarted);
        e.advance(EntryState::ExecutionStarted);
        assert_eq!(e.state, EntryState::ExecutionStarted);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut e = entry();
        e.fail();
        e.advance(EntryState::ParsingStarted);
        assert_eq!(e.state, EntryState::ExecutionCompleted);
    }

    #[test]
    fn test_once_event_fires_once() {
        let mut event = OnceEvent::new();
        assert!(!event.is_fired());
        assert!(event.fire());
        assert!(event.is_fired());
        assert!(!event.fire());
    }

    #[test]
    fn test_replace_exports_fresh_object() {
        let mut e = entry();
        e.host.exports = json!({"stale": true});
        e.replace_exports();
        assert_eq!(e.host.exports, json!({}));
    }

    #[test]
    fn test_getters_only_on_declarative() {
        let mut dynamic = ModuleType::Dynamic;
        assert!(dynamic.getters().is_none());
        assert!(dynamic.getters_mut().is_none());

        let declarative = ModuleType::declarative();
        assert!(declarative.getters().is_some_and(|g| g.is_empty()));
    }

    #[test]
    fn test_extension_from_filename() {
        let e = Entry::new("m", "/lib/util.mod", PackageId::default());
        assert_eq!(e.extension, FORCED_MODULE_EXT);
        let bare = Entry::new("m", "/lib/util", PackageId::default());
        assert_eq!(bare.extension, "");
    }
}
