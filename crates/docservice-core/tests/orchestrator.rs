//! Orchestrator routing tests: one handler per request, sentinel absorption.

use std::sync::Arc;

use docservice_core::fakes::{ScriptedExecutor, ScriptedInference, StaticRetriever};
use docservice_core::infer::TaskHint;
use docservice_core::prompts::PromptSet;
use docservice_core::sandbox::ExecutionOutcome;
use docservice_core::{Orchestrator, ServiceConfig, TaskType, UNAVAILABLE_MESSAGE};

struct Harness {
    orchestrator: Orchestrator,
    infer: Arc<ScriptedInference>,
    executor: Arc<ScriptedExecutor>,
}

fn harness(replies: &[&str], outcomes: Vec<ExecutionOutcome>) -> Harness {
    let infer = Arc::new(ScriptedInference::new(replies.iter().copied()));
    let executor = Arc::new(ScriptedExecutor::new(outcomes));
    let orchestrator = Orchestrator::with_components(
        infer.clone(),
        executor.clone(),
        Arc::new(StaticRetriever::new("[source: faq.md]\nShipping takes 3 days.")),
        Arc::new(PromptSet::builtin()),
        &ServiceConfig::default(),
    );
    Harness {
        orchestrator,
        infer,
        executor,
    }
}

fn decision_json(task_type: &str) -> String {
    format!(r#"{{"task_type": "{task_type}", "reason": "test", "plan": ["one"]}}"#)
}

#[tokio::test]
async fn test_coding_routes_to_computational_handler() {
    let decision = decision_json("coding");
    let h = harness(
        &[decision.as_str(), "```python\nprint(12)\n```"],
        vec![ExecutionOutcome::completed("12\n", "", None)],
    );

    let state = h.orchestrator.handle("how many desks?").await;

    assert_eq!(state.decision().unwrap().task_type, TaskType::Computational);
    assert_eq!(state.response(), Some("12"));
    assert_eq!(h.executor.run_count(), 1);
    assert_eq!(h.infer.calls()[1].hint, TaskHint::Computational);
}

#[tokio::test]
async fn test_rag_routes_to_knowledge_handler() {
    let decision = decision_json("rag");
    let h = harness(&[decision.as_str(), "Shipping takes three days."], vec![]);

    let state = h.orchestrator.handle("how long is shipping?").await;

    assert_eq!(state.decision().unwrap().task_type, TaskType::KnowledgeLocal);
    assert_eq!(state.response(), Some("Shipping takes three days."));
    assert_eq!(h.executor.run_count(), 0);
    let calls = h.infer.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].prompt.contains("Shipping takes 3 days."));
}

#[tokio::test]
async fn test_web_search_shares_knowledge_handler() {
    let decision = decision_json("web_search");
    let h = harness(&[decision.as_str(), "Answer from context."], vec![]);

    let state = h.orchestrator.handle("latest rust release?").await;

    assert_eq!(state.decision().unwrap().task_type, TaskType::KnowledgeWeb);
    assert_eq!(state.response(), Some("Answer from context."));
    assert!(h.infer.calls()[1].prompt.contains("[source: faq.md]"));
}

#[tokio::test]
async fn test_unknown_label_routes_to_general_handler() {
    let decision = decision_json("xyz123");
    let h = harness(&[decision.as_str(), "Hello there!"], vec![]);

    let state = h.orchestrator.handle("hi").await;

    assert_eq!(state.decision().unwrap().task_type, TaskType::General);
    assert_eq!(state.decision().unwrap().raw_label.as_deref(), Some("xyz123"));
    assert_eq!(state.response(), Some("Hello there!"));
    let calls = h.infer.calls();
    assert_eq!(calls[1].prompt, "hi");
    assert_eq!(calls[1].hint, TaskHint::General);
}

#[tokio::test]
async fn test_unparseable_decision_still_answers() {
    let h = harness(&["I'd say coding, probably.", "General answer."], vec![]);

    let state = h.orchestrator.handle("sum the column").await;

    let decision = state.decision().unwrap();
    assert!(decision.fallback);
    assert_eq!(decision.task_type, TaskType::General);
    assert_eq!(state.response(), Some("General answer."));
}

#[tokio::test]
async fn test_backend_failure_never_reaches_user() {
    // every call gets the sentinel
    let h = harness(&[], vec![]);

    let state = h.orchestrator.handle("anything").await;

    assert!(state.decision().unwrap().fallback);
    assert_eq!(state.response(), Some(UNAVAILABLE_MESSAGE));
}

#[tokio::test]
async fn test_each_request_gets_fresh_state() {
    let general = decision_json("general");
    let h = harness(&[general.as_str(), "a", general.as_str(), "b"], vec![]);

    let first = h.orchestrator.handle("one").await;
    let second = h.orchestrator.handle("two").await;

    assert_ne!(first.request_id, second.request_id);
    assert_eq!(first.into_response(), "a");
    assert_eq!(second.into_response(), "b");
}
