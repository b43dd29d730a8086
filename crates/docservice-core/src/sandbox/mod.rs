//! Sandbox: isolated, deadline-bounded execution of generated scripts.
//!
//! A run extracts code from raw model output, prepares a scratch workspace,
//! starts an interpreter process in the data root with a fixed capability
//! prelude, and classifies what came back. Scripts that raise, time out, or
//! stay silent are reported as data in an [`ExecutionOutcome`].
//!
//! # Modules
//!
//! - [`extract`]: pulls runnable code out of a fenced or bare reply
//! - [`capability`]: the fixed namespace injected before every script
//! - [`execution`]: `SandboxConfig`, `PythonSandbox`, `ExecutionOutcome`, `Verdict`
//! - [`error`]: `SandboxError` for setup failures

pub mod capability;
pub mod error;
pub mod execution;
pub mod extract;
mod harness;

pub use capability::{Capability, CapabilitySet};
pub use error::{SandboxError, SandboxResult};
pub use execution::{
    ExecutionOutcome, FailureKind, PythonSandbox, SandboxConfig, ScriptExecutor, Verdict,
    NO_CODE_DETAIL,
};
pub use extract::{extract_code, ExtractedCode};
