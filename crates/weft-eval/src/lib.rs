//! Execution driver for the weft module engine.
//!
//! This crate runs compiled module entries through the host's native
//! execute primitive behind a two-phase invoke/observe protocol, validates
//! top-level-await legality, applies live-binding updates, and finalizes
//! the "loaded" lifecycle. Errors follow a mask-or-externalize policy:
//! internal driver frames are stripped unless debug mode asks for full
//! detail.

mod bridge;
mod error;
mod host;
mod render;
mod run;

pub use bridge::{RuntimeBridge, SimpleBridge};
pub use error::{
    is_engine_frame, mask, mentions_exports, EvalError, HostError, HostErrorKind, MaskedError,
    StackFrame,
};
pub use host::{HostExecutor, InertExecutor};
pub use render::{DefaultRenderer, RenderOptions, SourceRenderer};
pub use run::{run, ExecHost};

/// Result type for execution-driver operations.
pub type Result<T> = std::result::Result<T, EvalError>;
