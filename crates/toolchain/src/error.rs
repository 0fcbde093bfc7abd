//! Error types for external tool invocations.

use thiserror::Error;

/// Failure of an external collaborator command.
///
/// An `Invocation` failure aborts the single evaluation that triggered it
/// and is never retried silently; callers decide whether to drop the
/// candidate or abort the run.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("`{command}` failed:\n{detail}")]
    Invocation { command: String, detail: String },

    #[error("unexpected output from `{command}`: {detail}")]
    Malformed { command: String, detail: String },

    #[error("failed to allocate temporary artifact")]
    Scratch(#[from] std::io::Error),
}
