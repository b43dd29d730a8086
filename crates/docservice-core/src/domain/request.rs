//! Per-request state owned by the orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::decision::Decision;

/// State of one request from entry to delivered response.
///
/// Owned exclusively by the orchestrator and never shared between requests.
/// It is written exactly twice: the decision, then the response.
#[derive(Debug, Clone, Serialize)]
pub struct RequestState {
    pub request_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub query: String,
    decision: Option<Decision>,
    response: Option<String>,
}

impl RequestState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            received_at: Utc::now(),
            query: query.into(),
            decision: None,
            response: None,
        }
    }

    /// Record the classifier decision. Returns the stored value.
    pub(crate) fn set_decision(&mut self, decision: Decision) -> &Decision {
        debug_assert!(self.decision.is_none(), "decision is set once per request");
        self.decision.insert(decision)
    }

    pub(crate) fn set_response(&mut self, response: String) {
        debug_assert!(self.response.is_none(), "response is set once per request");
        self.response = Some(response);
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    /// Consume the state, yielding the response text (empty if never set).
    pub fn into_response(self) -> String {
        self.response.unwrap_or_default()
    }
}
