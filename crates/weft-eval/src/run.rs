//! The execution driver.
//!
//! Executes one compiled entry through the host's native execute
//! primitive. Execution is a two-phase invoke/observe sequence: phase 1
//! performs the host call and stores its raw return value, phase 2 reads
//! the stored value later. Debugging hooks can intercept the host call
//! without forwarding its return value, so the two phases are tracked
//! separately.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use serde_json::Value;

use weft_registry::{
    CompileData, EntryId, EntryState, Namespace, Registry, RunResult, SourceType,
    FORCED_MODULE_EXT,
};

use crate::bridge::RuntimeBridge;
use crate::error::{mask, mentions_exports, EvalError, HostError, HostErrorKind};
use crate::host::HostExecutor;
use crate::render::{RenderOptions, SourceRenderer};

/// The execution collaborators, bundled for threading through the drivers.
pub struct ExecHost<'a> {
    pub bridge: &'a mut dyn RuntimeBridge,
    pub host: &'a mut dyn HostExecutor,
    pub renderer: &'a dyn SourceRenderer,
}

fn data_mut(reg: &mut Registry, id: EntryId) -> &mut CompileData {
    reg.entry_mut(id)
        .compile_data
        .as_mut()
        .expect("compile data initialized before execution")
}

/// Execute an entry and finalize its lifecycle bookkeeping.
///
/// On success the entry reaches its completed state and, for dynamic
/// entries outside a parse, fires the loaded lifecycle. On failure the
/// entry is forced to the failed-but-completed marker and the error is
/// masked or externalized per package policy.
pub fn run(
    reg: &mut Registry,
    exec: &mut ExecHost<'_>,
    id: EntryId,
    filename: &Path,
) -> Result<Value, EvalError> {
    let parsing = reg.parsing();
    let options = reg.package(reg.entry(id).package).options.clone();

    let use_async = options.top_level_await
        && exec.host.supports_await()
        && reg.entry(id).extension != FORCED_MODULE_EXT;
    let helper_vars = options.cjs_vars && !reg.entry(id).module_type.is_declarative();

    if reg.entry(id).compile_data.is_none() {
        reg.entry_mut(id).compile_data = Some(CompileData::new(SourceType::Script));
    }

    // The runtime object is created at most once. Declarative entries and
    // transformed dynamic entries get a bridged namespace; plain dynamic
    // entries get an empty one.
    if reg.entry(id).runtime.is_none() {
        let needs_bridge = {
            let entry = reg.entry(id);
            entry.module_type.is_declarative()
                || entry
                    .compile_data
                    .as_ref()
                    .is_some_and(|data| !data.transforms.is_empty())
        };
        let namespace = if needs_bridge {
            let seed = Namespace::from_exports(&reg.entry(id).host.exports);
            exec.bridge.enable(reg.entry_mut(id), seed)
        } else {
            Rc::new(RefCell::new(Namespace::new()))
        };
        reg.entry_mut(id).runtime = Some(namespace);
    }

    let started = if parsing {
        EntryState::ParsingStarted
    } else {
        EntryState::ExecutionStarted
    };
    reg.entry_mut(id).advance(started);

    // Phase 1: on the first pass only, render the final source and invoke
    // the host primitive through the stored continuation.
    let first_pass = reg
        .entry(id)
        .compile_data
        .as_ref()
        .is_some_and(|data| data.run_result.is_none());
    let mut recorded: Option<HostError> = None;

    if first_pass {
        let rendered = {
            let entry = reg.entry(id);
            let data = entry
                .compile_data
                .as_ref()
                .expect("compile data initialized before execution");
            let render_options = RenderOptions {
                async_wrap: use_async,
                helper_vars,
                runtime_name: entry.runtime_name.clone(),
                source_map: options.source_map,
            };
            exec.renderer.render(data, &render_options)
        };

        data_mut(reg, id).run_result = Some(RunResult::new());
        reg.entry_mut(id).running = true;
        let host = &mut *exec.host;
        let outcome = data_mut(reg, id)
            .run_result
            .as_mut()
            .expect("continuation created for first pass")
            .invoke(|| host.execute(&rendered, filename));
        reg.entry_mut(id).running = false;
        if let Err(error) = outcome {
            recorded = Some(error);
        }
    }

    // Settle phase 1 so the stored result becomes observable. Skipped
    // under a bootstrap parse and by intercepting debuggers; an unsettled
    // call never forwards its value.
    if recorded.is_none() && !parsing && first_pass {
        if let Some(run_result) = data_mut(reg, id).run_result.as_mut() {
            run_result.settle();
        }
    }

    // A recorded top-level await with no live-binding getters means the
    // module body has no genuine module-scope execution context.
    if recorded.is_none() {
        let entry = reg.entry(id);
        if !entry.running && use_async && entry.module_type.is_declarative() {
            let await_pos = entry
                .compile_data
                .as_ref()
                .and_then(|data| data.first_await_outside_function);
            let no_getters = entry
                .module_type
                .getters()
                .map_or(true, |getters| getters.is_empty());
            if let (Some(pos), true) = (await_pos, no_getters) {
                reg.entry_mut(id).fail();
                return Err(EvalError::IllegalAwait {
                    line: pos.line,
                    column: pos.column,
                    module_scoped: true,
                });
            }
        }
    }

    // Phase 2: read the stored result.
    let mut result = Value::Null;
    if recorded.is_none() && !reg.entry(id).running {
        result = reg
            .entry(id)
            .compile_data
            .as_ref()
            .and_then(|data| data.run_result.as_ref())
            .and_then(|run_result| run_result.observe())
            .unwrap_or(Value::Null);
    }

    match recorded {
        None => {
            let completed = if parsing {
                EntryState::ParsingCompleted
            } else {
                EntryState::ExecutionCompleted
            };
            reg.entry_mut(id).advance(completed);
            let declarative = reg.entry(id).module_type.is_declarative();
            if !declarative && !parsing && first_pass {
                // Dynamic entries load eagerly. Declarative entries keep
                // their one-shot loaded event armed for mark_loaded.
                reg.mark_loaded(id);
            }
            Ok(result)
        }
        Some(error) => {
            reg.entry_mut(id).fail();
            let will_mask = !options.debug && error.maskable;
            let misdetected = error.kind == HostErrorKind::Syntax
                || (error.kind == HostErrorKind::Reference && mentions_exports(&error.message));
            if will_mask && reg.entry(id).module_type.is_declarative() && misdetected {
                // Suspected source-type misdetection: the next load must
                // recompile with corrected detection.
                let package = reg.entry(id).package;
                reg.package_mut(package).dirty = true;
            }
            let content = reg
                .entry(id)
                .compile_data
                .as_ref()
                .and_then(|data| data.code.clone());
            let engine_paths = reg.engine_paths().to_vec();
            Err(mask(
                error,
                &engine_paths,
                filename,
                content.as_deref(),
                options.debug,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SimpleBridge;
    use crate::render::DefaultRenderer;
    use serde_json::json;
    use std::collections::VecDeque;
    use weft_registry::{Entry, ModuleType, PackageOptions, SourcePos};

    /// Executor that replays scripted outcomes and counts calls.
    struct ScriptedExecutor {
        calls: u32,
        outcomes: VecDeque<Result<Value, HostError>>,
        awaitable: bool,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                calls: 0,
                outcomes: VecDeque::new(),
                awaitable: true,
            }
        }

        fn then(mut self, outcome: Result<Value, HostError>) -> Self {
            self.outcomes.push_back(outcome);
            self
        }
    }

    impl HostExecutor for ScriptedExecutor {
        fn execute(&mut self, _source: &str, _filename: &Path) -> Result<Value, HostError> {
            self.calls += 1;
            self.outcomes.pop_front().unwrap_or(Ok(Value::Null))
        }

        fn supports_await(&self) -> bool {
            self.awaitable
        }
    }

    fn registry(options: PackageOptions) -> (Registry, EntryId) {
        let mut reg = Registry::new(options);
        let pkg = reg.default_package();
        let mut entry = Entry::new("main", "/app/main.dyn", pkg);
        let mut data = CompileData::new(SourceType::Script);
        data.code = Some("exports.a = 1".to_string());
        entry.compile_data = Some(data);
        let id = reg.add_entry(entry);
        (reg, id)
    }

    fn run_with(
        reg: &mut Registry,
        id: EntryId,
        host: &mut ScriptedExecutor,
    ) -> Result<Value, EvalError> {
        let mut bridge = SimpleBridge;
        let renderer = DefaultRenderer;
        let mut exec = ExecHost {
            bridge: &mut bridge,
            host,
            renderer: &renderer,
        };
        run(reg, &mut exec, id, Path::new("/app/main.dyn"))
    }

    #[test]
    fn test_dynamic_success_completes_and_loads() {
        let (mut reg, id) = registry(PackageOptions::default());
        let mut host = ScriptedExecutor::new().then(Ok(json!("done")));

        let result = run_with(&mut reg, id, &mut host).unwrap();
        assert_eq!(result, json!("done"));
        assert_eq!(reg.entry(id).state, EntryState::ExecutionCompleted);
        assert!(reg.entry(id).host.loaded.is_fired());
        assert_eq!(reg.entry(id).binding_updates(), 1);
        assert!(!reg.entry(id).running);
    }

    #[test]
    fn test_second_run_reuses_continuation() {
        let (mut reg, id) = registry(PackageOptions::default());
        let mut host = ScriptedExecutor::new().then(Ok(json!(1)));

        run_with(&mut reg, id, &mut host).unwrap();
        let again = run_with(&mut reg, id, &mut host).unwrap();
        assert_eq!(host.calls, 1);
        assert_eq!(again, json!(1));
    }

    #[test]
    fn test_failure_forces_terminal_state_and_masks() {
        let (mut reg, id) = registry(PackageOptions::default());
        let mut host = ScriptedExecutor::new().then(Err(HostError::generic("kaput")));

        let error = run_with(&mut reg, id, &mut host).unwrap_err();
        assert_eq!(reg.entry(id).state, EntryState::ExecutionCompleted);
        assert!(!reg.entry(id).host.loaded.is_fired());
        match error {
            EvalError::Masked(m) => {
                assert_eq!(m.error.message, "kaput");
                assert_eq!(m.filename, Some("/app/main.dyn".into()));
            }
            other => panic!("expected Masked, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_mode_rethrows_external() {
        let options = PackageOptions {
            debug: true,
            ..Default::default()
        };
        let (mut reg, id) = registry(options);
        let mut host = ScriptedExecutor::new().then(Err(HostError::generic("kaput")));

        match run_with(&mut reg, id, &mut host).unwrap_err() {
            EvalError::External(e) => assert_eq!(e.message, "kaput"),
            other => panic!("expected External, got {:?}", other),
        }
    }

    #[test]
    fn test_declarative_syntax_error_marks_package_dirty() {
        let (mut reg, id) = registry(PackageOptions::default());
        reg.entry_mut(id).module_type = ModuleType::declarative();
        let mut host = ScriptedExecutor::new().then(Err(HostError::syntax("unexpected token")));

        run_with(&mut reg, id, &mut host).unwrap_err();
        assert!(reg.package(reg.default_package()).dirty);
    }

    #[test]
    fn test_exports_reference_error_marks_package_dirty() {
        let (mut reg, id) = registry(PackageOptions::default());
        reg.entry_mut(id).module_type = ModuleType::declarative();
        let mut host =
            ScriptedExecutor::new().then(Err(HostError::reference("exports is not defined")));

        run_with(&mut reg, id, &mut host).unwrap_err();
        assert!(reg.package(reg.default_package()).dirty);
    }

    #[test]
    fn test_unrelated_reference_error_leaves_cache_clean() {
        let (mut reg, id) = registry(PackageOptions::default());
        reg.entry_mut(id).module_type = ModuleType::declarative();
        let mut host =
            ScriptedExecutor::new().then(Err(HostError::reference("foo is not defined")));

        run_with(&mut reg, id, &mut host).unwrap_err();
        assert!(!reg.package(reg.default_package()).dirty);
    }

    #[test]
    fn test_dynamic_error_leaves_cache_clean() {
        let (mut reg, id) = registry(PackageOptions::default());
        let mut host =
            ScriptedExecutor::new().then(Err(HostError::reference("exports is not defined")));

        run_with(&mut reg, id, &mut host).unwrap_err();
        assert!(!reg.package(reg.default_package()).dirty);
    }

    #[test]
    fn test_illegal_top_level_await() {
        let options = PackageOptions {
            top_level_await: true,
            ..Default::default()
        };
        let (mut reg, id) = registry(options);
        reg.entry_mut(id).module_type = ModuleType::declarative();
        if let Some(data) = reg.entry_mut(id).compile_data.as_mut() {
            data.first_await_outside_function = Some(SourcePos { line: 4, column: 2 });
        }
        let mut host = ScriptedExecutor::new();

        match run_with(&mut reg, id, &mut host).unwrap_err() {
            EvalError::IllegalAwait {
                line,
                column,
                module_scoped,
            } => {
                assert_eq!((line, column), (4, 2));
                assert!(module_scoped);
            }
            other => panic!("expected IllegalAwait, got {:?}", other),
        }
        assert_eq!(reg.entry(id).state, EntryState::ExecutionCompleted);
    }

    #[test]
    fn test_top_level_await_allowed_with_getters() {
        let options = PackageOptions {
            top_level_await: true,
            ..Default::default()
        };
        let (mut reg, id) = registry(options);
        reg.entry_mut(id).module_type = ModuleType::declarative();
        // Seeded exports give the bridge getters to install.
        reg.entry_mut(id).host.exports = json!({"a": 1});
        if let Some(data) = reg.entry_mut(id).compile_data.as_mut() {
            data.first_await_outside_function = Some(SourcePos { line: 4, column: 2 });
        }
        let mut host = ScriptedExecutor::new();

        assert!(run_with(&mut reg, id, &mut host).is_ok());
    }

    #[test]
    fn test_forced_module_extension_disables_await_check() {
        let options = PackageOptions {
            top_level_await: true,
            ..Default::default()
        };
        let mut reg = Registry::new(options);
        let pkg = reg.default_package();
        let mut entry = Entry::new("main", "/app/main.mod", pkg);
        entry.module_type = ModuleType::declarative();
        let mut data = CompileData::new(SourceType::Module);
        data.code = Some("await x".to_string());
        data.first_await_outside_function = Some(SourcePos { line: 1, column: 0 });
        entry.compile_data = Some(data);
        let id = reg.add_entry(entry);
        let mut host = ScriptedExecutor::new();

        assert!(run_with(&mut reg, id, &mut host).is_ok());
    }

    #[test]
    fn test_run_under_parse_uses_parsing_states() {
        let (mut reg, id) = registry(PackageOptions::default());
        reg.entry_mut(id).module_type = ModuleType::declarative();
        let guard = reg.begin_parse();
        let mut host = ScriptedExecutor::new().then(Ok(json!("hidden")));

        let result = run_with(&mut reg, id, &mut host).unwrap();
        // The call is not settled under a parse; its value is withheld.
        assert_eq!(result, Value::Null);
        assert_eq!(reg.entry(id).state, EntryState::ParsingCompleted);
        // Loads are not announced while the bootstrap parse is active.
        assert!(!reg.entry(id).host.loaded.is_fired());
        drop(guard);
    }
}
