//! Weft compile driver.
//!
//! Decides source semantics for a module load, reuses or builds compiled
//! artifacts through the caching compiler, detects circular module graphs,
//! and hands execution to the weft-eval execution driver.

pub mod cache;
pub mod driver;
pub mod error;

pub use cache::{CachingCompiler, CompileOptions, PassthroughCompiler};
pub use driver::{compile, read_source, CompileRequest, Fallback};
pub use error::{CompileError, Result};
