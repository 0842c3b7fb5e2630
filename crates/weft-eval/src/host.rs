//! The host's native compile/execute primitive, behind a trait.

use std::path::Path;

use serde_json::Value;

use crate::error::HostError;

/// Collaborator that executes rendered source in a module's own scope.
pub trait HostExecutor {
    fn execute(&mut self, source: &str, filename: &Path) -> Result<Value, HostError>;

    /// Whether the host supports awaitable top-level execution.
    fn supports_await(&self) -> bool {
        false
    }
}

/// Executor that accepts any source and returns null; stands in for a real
/// host when only the driver bookkeeping matters.
#[derive(Debug, Default)]
pub struct InertExecutor;

impl HostExecutor for InertExecutor {
    fn execute(&mut self, _source: &str, _filename: &Path) -> Result<Value, HostError> {
        Ok(Value::Null)
    }

    fn supports_await(&self) -> bool {
        true
    }
}
