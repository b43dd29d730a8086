//! In-memory fakes for the service seams (testing only)
//!
//! Provides `ScriptedInference`, `ScriptedExecutor`, and `StaticRetriever`
//! that satisfy the trait contracts without a model server or an interpreter.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::infer::{backend_failure, Inference, TaskHint};
use crate::retrieval::Retriever;
use crate::sandbox::{ExecutionOutcome, FailureKind, ScriptExecutor};

// ---------------------------------------------------------------------------
// ScriptedInference
// ---------------------------------------------------------------------------

/// One recorded `infer` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferCall {
    pub prompt: String,
    pub hint: TaskHint,
}

/// Replies from a queue, in order. Once the queue is empty every call gets the
/// backend failure sentinel, like an unreachable server would produce.
#[derive(Debug, Default)]
pub struct ScriptedInference {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<InferCall>>,
}

impl ScriptedInference {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<InferCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    async fn infer(&self, prompt: &str, hint: TaskHint) -> String {
        self.calls.lock().unwrap().push(InferCall {
            prompt: prompt.to_string(),
            hint,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| backend_failure("scripted", &"no scripted reply left"))
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Returns queued outcomes and records what it was asked to run.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecutionOutcome>>,
    inputs: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: impl IntoIterator<Item = ExecutionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Raw text passed to each `execute` call, in order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .map(|(raw, _)| raw.clone())
            .collect()
    }

    pub fn deadlines(&self) -> Vec<Duration> {
        self.inputs.lock().unwrap().iter().map(|(_, d)| *d).collect()
    }

    pub fn run_count(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn execute(&self, raw: &str, deadline: Duration) -> ExecutionOutcome {
        self.inputs
            .lock()
            .unwrap()
            .push((raw.to_string(), deadline));
        self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| {
            ExecutionOutcome::failure(FailureKind::RuntimeFailure, "no scripted outcome left")
        })
    }
}

// ---------------------------------------------------------------------------
// StaticRetriever
// ---------------------------------------------------------------------------

/// Returns the same text for every query.
#[derive(Debug, Clone)]
pub struct StaticRetriever {
    text: String,
}

impl StaticRetriever {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> String {
        self.text.clone()
    }
}
