//! DocService Core Library
//!
//! Routes a natural-language request to one handler. Computational requests
//! are answered by generating a script, running it in an isolated sandbox,
//! and correcting it at most once.

pub mod classifier;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod infer;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod sandbox;
pub mod solver;
pub mod telemetry;

pub use classifier::{parse_decision, QueryClassifier};
pub use config::ServiceConfig;
pub use domain::{Decision, RequestState, Result, ServiceError, TaskType};
pub use infer::{
    is_backend_failure, Inference, InferenceConfig, OllamaClient, TaskHint, BACKEND_ERROR_MARKER,
};
pub use metrics::METRICS;
pub use orchestrator::{Orchestrator, Route, UNAVAILABLE_MESSAGE};
pub use prompts::PromptSet;
pub use retrieval::{
    CompositeRetriever, DuckDuckGoRetriever, KnowledgeHandler, LocalIndex, RetrievalConfig,
    Retriever, NO_RESULTS,
};
pub use sandbox::{
    extract_code, Capability, CapabilitySet, ExecutionOutcome, FailureKind, PythonSandbox,
    SandboxConfig, SandboxError, ScriptExecutor, Verdict,
};
pub use solver::{is_integer_literal, CodeSolver, CorrectionAttempt, SolveReport, MAX_CORRECTIONS};
pub use telemetry::init_tracing;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
