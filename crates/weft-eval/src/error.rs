//! Error types for the execution driver.
//!
//! Two shapes leave the driver: masked errors (engine frames stripped,
//! content and filename attached) and external errors (full detail, used
//! in debug mode or when the host marks an error non-maskable). The
//! semantic top-level-await violation is synthesized here as well.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Classification of an error raised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    Syntax,
    Reference,
    Generic,
}

/// One frame of a host call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    /// Frames inside the host itself, skipped when looking for the first
    /// external frame.
    pub host_internal: bool,
}

impl StackFrame {
    pub fn new(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
            host_internal: false,
        }
    }

    pub fn host_internal(mut self) -> Self {
        self.host_internal = true;
        self
    }
}

/// An error raised by the host's compile or execute primitive.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HostError {
    pub kind: HostErrorKind,
    pub message: String,
    pub stack: Vec<StackFrame>,
    /// Non-maskable errors are always externalized with full detail.
    pub maskable: bool,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
            maskable: true,
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Syntax, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Reference, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::Generic, message)
    }

    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    pub fn not_maskable(mut self) -> Self {
        self.maskable = false;
        self
    }
}

/// A host error with engine frames stripped and source context attached.
#[derive(Debug, Clone)]
pub struct MaskedError {
    /// Best-known filename, recovered from the stack when possible.
    pub filename: Option<PathBuf>,
    /// Source text of the failing module, when available.
    pub content: Option<String>,
    pub error: HostError,
}

impl fmt::Display for MaskedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{}: {}", filename.display(), self.error.message),
            None => write!(f, "{}", self.error.message),
        }
    }
}

/// Errors the execution driver can raise.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Top-level await in a module with no genuine module-scope execution
    /// context; syntax-class, carries the recorded source location.
    #[error("illegal await outside an async function ({line}:{column})")]
    IllegalAwait {
        line: u32,
        column: u32,
        module_scoped: bool,
    },

    /// Masked host error: engine frames stripped, context attached.
    #[error("{0}")]
    Masked(MaskedError),

    /// Fully-detailed host error (debug mode or non-maskable).
    #[error("{0}")]
    External(HostError),
}

/// Apply the mask-or-externalize policy to a host error.
///
/// Debug mode and non-maskable errors pass through unchanged in shape.
/// Otherwise frames under the engine's own source paths are stripped, the
/// best-known filename is recovered from the first surviving frame, and
/// the module's source text is attached.
pub fn mask(
    error: HostError,
    engine_paths: &[PathBuf],
    filename: &Path,
    content: Option<&str>,
    debug: bool,
) -> EvalError {
    if debug || !error.maskable {
        return EvalError::External(error);
    }
    let mut error = error;
    error
        .stack
        .retain(|frame| !is_engine_frame(frame, engine_paths));
    let recovered = error
        .stack
        .iter()
        .find(|frame| !frame.host_internal)
        .map(|frame| frame.path.clone());
    EvalError::Masked(MaskedError {
        filename: recovered.or_else(|| Some(filename.to_path_buf())),
        content: content.map(str::to_string),
        error,
    })
}

/// Whether a stack frame points into the engine's own sources.
pub fn is_engine_frame(frame: &StackFrame, engine_paths: &[PathBuf]) -> bool {
    engine_paths.iter().any(|path| frame.path.starts_with(path))
}

/// Whether an error message textually references an `exports` identifier.
///
/// Deliberately narrow: whole-token match only. Used to detect dynamic
/// source misparsed as declarative (an undeclared `exports` reference).
pub fn mentions_exports(message: &str) -> bool {
    message
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == "exports")
}
