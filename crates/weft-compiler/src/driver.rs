//! The compile driver.
//!
//! Decides source semantics for one module load, reuses or builds the
//! compiled artifact, detects self-circular module graphs, and sequences
//! execution so that live bindings are visible to dependents before the
//! importing module's own body observes them.

use std::path::{Path, PathBuf};

use serde_json::Value;

use weft_eval::{is_engine_frame, mask, run, ExecHost, StackFrame};
use weft_registry::{
    EntryId, EntryState, Mode, Registry, SourceHint, SourceType, Transforms, FORCED_MODULE_EXT,
};

use crate::cache::{CachingCompiler, CompileOptions};
use crate::error::{CompileError, Result};

/// One module-load request.
#[derive(Debug)]
pub struct CompileRequest {
    pub entry: EntryId,
    /// The importing entry, if any.
    pub caller: Option<EntryId>,
    pub filename: PathBuf,
    /// Raw source text of the module.
    pub content: String,
    /// Call stack above this load, outermost last.
    pub call_stack: Vec<StackFrame>,
    /// Leave namespace finalization to the caller.
    pub defer_finalize: bool,
}

impl CompileRequest {
    pub fn new(entry: EntryId, filename: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            entry,
            caller: None,
            filename: filename.into(),
            content: content.into(),
            call_stack: Vec::new(),
            defer_finalize: false,
        }
    }

    pub fn caller(mut self, caller: EntryId) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn call_stack(mut self, call_stack: Vec<StackFrame>) -> Self {
        self.call_stack = call_stack;
        self
    }

    pub fn defer_finalize(mut self, defer: bool) -> Self {
        self.defer_finalize = defer;
        self
    }
}

/// Alternate load strategy consulted for eligible dynamic entries.
pub type Fallback<'a> = &'a mut dyn FnMut() -> Result<Value>;

/// Read a module's source text from disk.
pub fn read_source(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(CompileError::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Compile and execute one module entry.
///
/// Resolves or builds the compiled artifact, stores it in the package
/// cache, then drives execution: a sideload bootstrap for an outermost
/// declarative load, the circular-aware declarative path under an active
/// parse, the fallback for eligible dynamic entries, or direct execution.
pub fn compile(
    reg: &mut Registry,
    compiler: &mut dyn CachingCompiler,
    exec: &mut ExecHost<'_>,
    request: &CompileRequest,
    fallback: Option<Fallback<'_>>,
) -> Result<Value> {
    let id = request.entry;
    let package_id = reg.entry(id).package;
    let options = reg.package(package_id).options.clone();

    let hint = if reg.entry(id).extension == FORCED_MODULE_EXT {
        SourceHint::Module
    } else {
        match options.mode {
            Mode::Module => SourceHint::Module,
            Mode::Auto => SourceHint::Unambiguous,
            Mode::Script => SourceHint::Script,
        }
    };

    if reg.entry(id).compile_data.is_none() {
        let cache_key = reg.entry(id).cache_key.clone();
        let cached = reg
            .package(package_id)
            .cached(&cache_key)
            .cloned()
            .or_else(|| {
                compiler
                    .from_cache(reg.entry(id))
                    .filter(|data| !data.is_stale())
            });

        let data = match cached {
            Some(data) => data,
            None => {
                let compile_options = CompileOptions {
                    cache_key: cache_key.clone(),
                    cache_path: options.cache_path.clone(),
                    helper_vars: options.cjs_vars && hint != SourceHint::Module,
                    filename: request.filename.clone(),
                    hint,
                    mtime: reg.entry(id).mtime,
                    runtime_name: reg.entry(id).runtime_name.clone(),
                    source_type: if hint == SourceHint::Module {
                        SourceType::Module
                    } else {
                        SourceType::Script
                    },
                    top_level_return: hint != SourceHint::Module,
                };
                match compiler.compile(&request.content, &compile_options) {
                    Ok(mut data) => {
                        // A recompile replaces the generated code but the
                        // superseded artifact's host output stays alive.
                        reg.package_mut(package_id)
                            .carry_script_data(&cache_key, &mut data);
                        data
                    }
                    Err(error) => {
                        reg.entry_mut(id).fail();
                        let engine_paths = reg.engine_paths().to_vec();
                        return Err(CompileError::compiler(mask(
                            error,
                            &engine_paths,
                            &request.filename,
                            Some(&request.content),
                            options.debug,
                        )));
                    }
                }
            }
        };

        reg.package_mut(package_id).store(cache_key, data.clone());
        if data.is_module() && !reg.entry(id).module_type.is_declarative() {
            reg.entry_mut(id).module_type = weft_registry::ModuleType::declarative();
        }
        reg.entry_mut(id).compile_data = Some(data);
    }

    // Under default configuration a dynamic entry whose only rewrite was
    // the eval wrap needed no semantic transform at all; keep the raw
    // source instead.
    if package_id == reg.default_package() && !reg.entry(id).module_type.is_declarative() {
        let entry = reg.entry_mut(id);
        if let Some(data) = entry.compile_data.as_mut() {
            if data.transforms == Transforms::EVAL_WRAP {
                data.code = Some(request.content.clone());
                data.transforms = Transforms::empty();
            }
        }
    }

    if let Some(data) = reg.entry_mut(id).compile_data.as_mut() {
        if data.code.is_none() {
            data.code = Some(request.content.clone());
        }
    }

    let declarative = reg.entry(id).module_type.is_declarative();

    if !reg.parsing() {
        if declarative && reg.entry(id).state == EntryState::Initial {
            // Outermost sideload bootstrap: this load owns the parsing
            // flag for its whole extent.
            let guard = reg.begin_parse();
            reg.entry_mut(id).advance(EntryState::ParsingStarted);
            let result = run_declarative(reg, exec, request);
            drop(guard);
            return result;
        }
        return Ok(run(reg, exec, id, &request.filename)?);
    }

    if declarative {
        return run_declarative(reg, exec, request);
    }

    if let Some(fallback) = fallback {
        if should_fall_back(reg, id, request.caller, &request.call_stack) {
            return fallback();
        }
    }

    Ok(run(reg, exec, id, &request.filename)?)
}

/// Declarative execution under an active parse: run, re-run once if the
/// entry proves self-circular, then publish bindings.
fn run_declarative(
    reg: &mut Registry,
    exec: &mut ExecHost<'_>,
    request: &CompileRequest,
) -> Result<Value> {
    let id = request.entry;
    let mut result = run(reg, exec, id, &request.filename)?;

    let circular = reg.resolve_circular(id);
    if let Some(data) = reg.entry_mut(id).compile_data.as_mut() {
        data.circular = Some(circular);
    }
    if circular {
        // The first pass observed placeholder bindings; give dependents a
        // fresh exports object and execute once more with the
        // deferred-binding code.
        let entry = reg.entry_mut(id);
        entry.replace_exports();
        if let Some(data) = entry.compile_data.as_mut() {
            if let Some(tdz) = data.code_with_tdz.clone() {
                data.code = Some(tdz);
            }
            data.reset_run();
        }
        result = run(reg, exec, id, &request.filename)?;
    }

    reg.entry_mut(id).update_bindings();
    if !request.defer_finalize {
        if let Some(runtime) = &reg.entry(id).runtime {
            runtime.borrow_mut().finalize();
        }
    }
    Ok(result)
}

/// Fallback gating: only dynamic-on-dynamic loads touching the default
/// package, initiated from outside the engine's own sources.
fn should_fall_back(
    reg: &Registry,
    id: EntryId,
    caller: Option<EntryId>,
    call_stack: &[StackFrame],
) -> bool {
    if reg.entry(id).module_type.is_declarative() {
        return false;
    }
    if let Some(caller_id) = caller {
        if reg.entry(caller_id).module_type.is_declarative() {
            return false;
        }
    }
    let default_package = reg.default_package();
    let touches_default = reg.entry(id).package == default_package
        || caller.is_some_and(|caller_id| reg.entry(caller_id).package == default_package);
    if !touches_default {
        return false;
    }
    let Some(frame) = call_stack.iter().find(|frame| !frame.host_internal) else {
        return false;
    };
    !is_engine_frame(frame, reg.engine_paths())
}
