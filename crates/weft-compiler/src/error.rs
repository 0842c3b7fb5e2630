//! Error types for the weft compile driver.

use std::path::PathBuf;
use thiserror::Error;

use weft_eval::EvalError;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caching compiler rejected the source; already masked or
    /// externalized per package policy.
    #[error("compile error: {0}")]
    Compiler(EvalError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
}

impl CompileError {
    pub fn compiler(error: EvalError) -> Self {
        CompileError::Compiler(error)
    }
}
