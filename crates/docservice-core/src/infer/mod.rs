//! Inference seam: turn a prompt into text.
//!
//! Implementations never fail. A backend problem comes back as text starting
//! with [`BACKEND_ERROR_MARKER`], so callers detect it by prefix rather than by
//! error handling.

pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use ollama::{InferenceConfig, OllamaClient};

/// Prefix of every backend failure reply.
pub const BACKEND_ERROR_MARKER: &str = "Model error";

/// What the prompt is for; used to pick a model tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskHint {
    General,
    Computational,
}

impl TaskHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskHint::General => "general",
            TaskHint::Computational => "computational",
        }
    }
}

impl std::fmt::Display for TaskHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A text-generation backend.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer(&self, prompt: &str, hint: TaskHint) -> String;
}

/// Format a backend failure in the sentinel shape.
pub fn backend_failure(backend: &str, error: &dyn std::fmt::Display) -> String {
    format!("{BACKEND_ERROR_MARKER} ({backend}): {error}")
}

/// `true` when `text` is a backend failure sentinel.
pub fn is_backend_failure(text: &str) -> bool {
    text.trim_start().starts_with(BACKEND_ERROR_MARKER)
}
