//! Request orchestration: classify, dispatch to exactly one handler, respond.
//!
//! ```text
//! Start -> Classifying -> Dispatched{Computational | Knowledge | General} -> Done
//! ```
//!
//! There is no fan-out and no handler chaining. The only loop is the single
//! correction inside [`CodeSolver`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, Instrument};

use crate::classifier::QueryClassifier;
use crate::config::ServiceConfig;
use crate::domain::{Decision, RequestState, Result, TaskType};
use crate::infer::{is_backend_failure, Inference, OllamaClient, TaskHint};
use crate::metrics::METRICS;
use crate::obs;
use crate::prompts::PromptSet;
use crate::retrieval::{
    CompositeRetriever, DuckDuckGoRetriever, KnowledgeHandler, LocalIndex, Retriever,
};
use crate::sandbox::{PythonSandbox, ScriptExecutor};
use crate::solver::CodeSolver;

/// Shown instead of a backend failure sentinel.
pub const UNAVAILABLE_MESSAGE: &str =
    "Sorry, the language model is not reachable right now. Please try again in a moment.";

/// Terminal handler selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Computational,
    Knowledge,
    General,
}

impl Route {
    /// Web and local knowledge requests share one handler.
    pub fn for_decision(decision: &Decision) -> Self {
        match decision.task_type {
            TaskType::Computational => Route::Computational,
            TaskType::KnowledgeWeb | TaskType::KnowledgeLocal => Route::Knowledge,
            TaskType::General => Route::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Computational => "computational",
            Route::Knowledge => "knowledge",
            Route::General => "general",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct Orchestrator {
    classifier: QueryClassifier,
    solver: CodeSolver,
    knowledge: KnowledgeHandler,
    infer: Arc<dyn Inference>,
}

impl Orchestrator {
    pub fn new(
        classifier: QueryClassifier,
        solver: CodeSolver,
        knowledge: KnowledgeHandler,
        infer: Arc<dyn Inference>,
    ) -> Self {
        Self {
            classifier,
            solver,
            knowledge,
            infer,
        }
    }

    /// Wire every component from one validated configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let prompts = Arc::new(config.prompt_set()?);
        let infer: Arc<dyn Inference> = Arc::new(OllamaClient::new(config.inference.clone())?);
        let executor: Arc<dyn ScriptExecutor> = Arc::new(PythonSandbox::new(config.sandbox.clone())?);

        let mut retriever = CompositeRetriever::new();
        if config.retrieval.local_enabled {
            let index = LocalIndex::load(&config.sandbox.data_root, &config.retrieval)?;
            retriever = retriever.with_source("documents", Arc::new(index));
        }
        if config.retrieval.web_enabled {
            let web = DuckDuckGoRetriever::new(
                config.retrieval.max_results,
                Duration::from_secs(config.inference.request_timeout_secs),
            )?;
            retriever = retriever.with_source("web", Arc::new(web));
        }

        info!(
            prompts_version = %prompts.version,
            prompts_digest = %prompts.digest(),
            fast_model = %config.inference.fast_model,
            smart_model = %config.inference.smart_model,
            data_root = %config.sandbox.data_root.display(),
            web_search = config.retrieval.web_enabled,
            "orchestrator ready"
        );

        Ok(Self::with_components(
            infer,
            executor,
            Arc::new(retriever),
            prompts,
            config,
        ))
    }

    /// Wire the handlers around the given seams.
    pub fn with_components(
        infer: Arc<dyn Inference>,
        executor: Arc<dyn ScriptExecutor>,
        retriever: Arc<dyn Retriever>,
        prompts: Arc<PromptSet>,
        config: &ServiceConfig,
    ) -> Self {
        Self::new(
            QueryClassifier::new(infer.clone(), prompts.clone()),
            CodeSolver::new(infer.clone(), executor, prompts.clone(), &config.sandbox),
            KnowledgeHandler::new(retriever, infer.clone(), prompts),
            infer,
        )
    }

    pub fn classifier(&self) -> &QueryClassifier {
        &self.classifier
    }

    /// Handle one request end to end. Always produces a response.
    pub async fn handle(&self, query: &str) -> RequestState {
        let state = RequestState::new(query);
        let span = obs::request_span(&state.request_id.to_string());
        self.drive(state).instrument(span).await
    }

    async fn drive(&self, mut state: RequestState) -> RequestState {
        let started = Instant::now();
        obs::emit_request_started(&state.request_id.to_string(), state.query.chars().count());

        let decision = self.classifier.classify(&state.query).await;
        let route = Route::for_decision(&decision);
        obs::emit_request_classified(decision.task_type.as_str(), route.as_str(), decision.fallback);
        state.set_decision(decision);

        let response = match route {
            Route::Computational => self.solver.solve(&state.query).await,
            Route::Knowledge => self.knowledge.research(&state.query).await,
            Route::General => self.infer.infer(&state.query, TaskHint::General).await,
        };
        state.set_response(absorb_backend_failure(response));

        METRICS.inc_requests_handled();
        obs::emit_request_finished(route.as_str(), started.elapsed().as_millis() as u64);
        state
    }
}

fn absorb_backend_failure(response: String) -> String {
    if is_backend_failure(&response) {
        METRICS.inc_backend_failures();
        obs::emit_backend_failure("respond", &response);
        return UNAVAILABLE_MESSAGE.to_string();
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(task_type: TaskType) -> Decision {
        Decision {
            task_type,
            reason: "test".into(),
            plan: Vec::new(),
            raw_label: None,
            fallback: false,
        }
    }

    #[test]
    fn test_route_for_decision() {
        assert_eq!(
            Route::for_decision(&decision(TaskType::Computational)),
            Route::Computational
        );
        assert_eq!(
            Route::for_decision(&decision(TaskType::KnowledgeWeb)),
            Route::Knowledge
        );
        assert_eq!(
            Route::for_decision(&decision(TaskType::KnowledgeLocal)),
            Route::Knowledge
        );
        assert_eq!(Route::for_decision(&Decision::fallback()), Route::General);
    }

    #[test]
    fn test_absorb_backend_failure() {
        assert_eq!(
            absorb_backend_failure("Model error (llama3.2:latest): timed out".into()),
            UNAVAILABLE_MESSAGE
        );
        assert_eq!(absorb_backend_failure("fine".into()), "fine");
    }
}
