//! Routing decision produced once per request by the classifier.

use serde::{Deserialize, Serialize};

/// Task category a request is routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Computational,
    KnowledgeWeb,
    KnowledgeLocal,
    General,
}

impl TaskType {
    /// Map a free-form classifier label onto a task type.
    ///
    /// Matching is case-insensitive and substring-tolerant. Search-like labels
    /// are checked before code-like ones, so `code_search` is a knowledge
    /// request. Anything unrecognised is [`TaskType::General`].
    pub fn from_label(label: &str) -> Self {
        let t = label.trim().to_lowercase();
        match t.as_str() {
            "rag" | "knowledge_local" => return TaskType::KnowledgeLocal,
            "web_search" | "knowledge_web" => return TaskType::KnowledgeWeb,
            "coding" | "code" | "calculate" | "calculation" | "computational" => {
                return TaskType::Computational
            }
            _ => {}
        }
        if t.contains("search") || t.contains("research") {
            return TaskType::KnowledgeWeb;
        }
        if t.contains("code") {
            return TaskType::Computational;
        }
        TaskType::General
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Computational => "computational",
            TaskType::KnowledgeWeb => "knowledge_web",
            TaskType::KnowledgeLocal => "knowledge_local",
            TaskType::General => "general",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of one request: category, rationale, and a short plan.
///
/// Immutable once built. `task_type` is always a valid [`TaskType`], even when
/// the upstream text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub task_type: TaskType,
    pub reason: String,
    pub plan: Vec<String>,
    /// The label exactly as the classifier returned it, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_label: Option<String>,
    /// `true` when this is the fixed fallback rather than a parsed reply.
    #[serde(default)]
    pub fallback: bool,
}

impl Decision {
    pub const FALLBACK_REASON: &'static str = "could not parse response";
    pub const FALLBACK_STEP: &'static str = "answer directly";

    /// The safe default returned whenever the classifier reply is unusable.
    pub fn fallback() -> Self {
        Self {
            task_type: TaskType::General,
            reason: Self::FALLBACK_REASON.to_string(),
            plan: vec![Self::FALLBACK_STEP.to_string()],
            raw_label: None,
            fallback: true,
        }
    }
}
