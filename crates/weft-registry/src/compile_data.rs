//! Cached compile artifacts.
//!
//! A [`CompileData`] is the compiled form of one module's source, keyed by
//! cache name within its package. It is replaced wholesale on invalidation;
//! the execution driver fills in `code`, `circular` and `run_result`
//! progressively as a load proceeds.

use bitflags::bitflags;
use serde_json::Value;

bitflags! {
    /// Source rewrites applied (or pending) on a compiled artifact.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Transforms: u8 {
        /// Source was wrapped in an eval shell.
        const EVAL_WRAP = 1 << 0;
        /// Import declarations were rewritten to registry lookups.
        const IMPORT_REWRITE = 1 << 1;
        /// Export declarations were rewritten to binding updates.
        const EXPORT_REWRITE = 1 << 2;
        /// Top-level await was wrapped for awaitable execution.
        const AWAIT_WRAP = 1 << 3;
        /// Dynamic import expressions were rewritten.
        const DYNAMIC_IMPORT = 1 << 4;
    }
}

/// Resolved semantics of a module's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    /// Dynamic-scope exports object, eager execution.
    Script,
    /// Static import/export bindings, deferred binding resolution.
    Module,
}

/// Source-type hint handed to the caching compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceHint {
    /// Default dynamic semantics.
    Script,
    /// Auto-detect from the source text.
    Unambiguous,
    /// Forced declarative semantics.
    Module,
}

/// A line/column position in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

/// The two-phase invoke/observe protocol around one host execute call.
///
/// Phase 1 performs the host call and stores its raw return value in an
/// owned slot; phase 2 reads the slot. Debugging hooks can intercept the
/// host call without forwarding its return value, so "the call happened"
/// and "the result is read" are tracked separately.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    slot: Option<Value>,
    invoked: bool,
    observed: bool,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase 1: perform the host call and store its raw result.
    ///
    /// A second call is a no-op; the stored slot is reused.
    pub fn invoke<E>(&mut self, call: impl FnOnce() -> Result<Value, E>) -> Result<(), E> {
        if !self.invoked {
            self.slot = Some(call()?);
            self.invoked = true;
        }
        Ok(())
    }

    /// Advance past phase 1, making the stored result observable.
    ///
    /// An intercepting debugger skips this step, so the host call's
    /// return value is never forwarded.
    pub fn settle(&mut self) {
        self.observed = true;
    }

    /// Phase 2: read the stored result. Yields nothing until settled.
    pub fn observe(&self) -> Option<Value> {
        if self.observed {
            self.slot.clone()
        } else {
            None
        }
    }

    /// Whether phase 1 has happened.
    pub fn invoked(&self) -> bool {
        self.invoked
    }
}

/// Compiled artifact for one module source, cached per package.
#[derive(Debug, Clone, Default)]
pub struct CompileData {
    /// Runnable source text; unset until first materialized.
    pub code: Option<String>,
    /// Resolved source semantics.
    pub source_type: Option<SourceType>,
    /// Rewrites already applied to `code`.
    pub transforms: Transforms,
    /// Rewrites detected but not yet applied; non-empty means the cached
    /// artifact is stale and must be recompiled.
    pub pending_transforms: Transforms,
    /// Opaque host compile output, carried across recompiles.
    pub script_data: Option<Vec<u8>>,
    /// Alternate code for the circular-safe second execution pass.
    pub code_with_tdz: Option<String>,
    /// Tri-state circularity, mirrored from the entry once resolved.
    pub circular: Option<bool>,
    /// Location of a top-level await outside any function, if one exists.
    pub first_await_outside_function: Option<SourcePos>,
    /// Execution continuation, created lazily on the first pass.
    pub run_result: Option<RunResult>,
}

impl CompileData {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type: Some(source_type),
            ..Self::default()
        }
    }

    /// Whether this artifact resolved to declarative semantics.
    pub fn is_module(&self) -> bool {
        self.source_type == Some(SourceType::Module)
    }

    /// A cached artifact with pending rewrites cannot be reused.
    pub fn is_stale(&self) -> bool {
        !self.pending_transforms.is_empty()
    }

    /// Drop the stored continuation so the next run performs a fresh
    /// host call (confirmed-circular second pass).
    pub fn reset_run(&mut self) {
        self.run_result = None;
    }
}
