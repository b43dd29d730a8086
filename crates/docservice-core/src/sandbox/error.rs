//! Sandbox setup failures.
//!
//! These cover the sandbox's own machinery. A script that raises, times out,
//! or prints nothing is reported through `ExecutionOutcome`, not here.

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to start interpreter {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run workspace error: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("interpreter io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed harness report: {0}")]
    Report(String),

    #[error("invalid sandbox configuration: {0}")]
    InvalidConfig(String),
}

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
