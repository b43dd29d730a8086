//! Query classification.
//!
//! The classifier asks the inference backend for a JSON decision and parses the
//! reply permissively. It never fails: any reply it cannot use becomes
//! [`Decision::fallback`].

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{Decision, TaskType};
use crate::infer::{is_backend_failure, Inference, TaskHint};
use crate::metrics::METRICS;
use crate::obs;
use crate::prompts::{render, PromptSet};

/// Reason recorded when a parsed reply carries no usable one.
pub const MISSING_REASON: &str = "no reason given";

pub struct QueryClassifier {
    infer: Arc<dyn Inference>,
    prompts: Arc<PromptSet>,
}

impl QueryClassifier {
    pub fn new(infer: Arc<dyn Inference>, prompts: Arc<PromptSet>) -> Self {
        Self { infer, prompts }
    }

    pub async fn classify(&self, query: &str) -> Decision {
        let prompt = render(&self.prompts.classify, &[("query", query)]);
        let reply = self.infer.infer(&prompt, TaskHint::General).await;
        if is_backend_failure(&reply) {
            METRICS.inc_backend_failures();
            obs::emit_backend_failure("classify", &reply);
        }
        let decision = parse_decision(&reply);
        if decision.fallback {
            METRICS.inc_classifier_fallbacks();
            warn!(reply_chars = reply.len(), "classifier reply unusable, using fallback");
        } else {
            debug!(task_type = %decision.task_type, raw_label = ?decision.raw_label, "query classified");
        }
        decision
    }
}

/// Parse a classifier reply into a [`Decision`].
///
/// Tries the whole trimmed reply first, then the first balanced `{...}`
/// substring. Anything else is the fallback.
pub fn parse_decision(reply: &str) -> Decision {
    let trimmed = reply.trim();
    if let Some(object) = parse_object(trimmed) {
        return normalize(&object);
    }
    first_braced(trimmed)
        .and_then(parse_object)
        .map(|object| normalize(&object))
        .unwrap_or_else(Decision::fallback)
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// The first balanced brace-delimited substring. Braces inside JSON string
/// literals do not count.
fn first_braced(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn normalize(object: &Map<String, Value>) -> Decision {
    let raw_label = object
        .get("task_type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let task_type = raw_label
        .as_deref()
        .map(TaskType::from_label)
        .unwrap_or(TaskType::General);

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(MISSING_REASON)
        .to_string();

    let plan = match object.get("plan") {
        Some(Value::Array(steps)) => steps
            .iter()
            .map(|step| match step {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };

    Decision {
        task_type,
        reason,
        plan,
        raw_label,
        fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_json() {
        let d = parse_decision(
            r#"{"task_type": "coding", "reason": "needs counting", "plan": ["read", "count"]}"#,
        );
        assert_eq!(d.task_type, TaskType::Computational);
        assert_eq!(d.reason, "needs counting");
        assert_eq!(d.plan, vec!["read", "count"]);
        assert_eq!(d.raw_label.as_deref(), Some("coding"));
        assert!(!d.fallback);
    }

    #[test]
    fn test_json_wrapped_in_prose() {
        let d = parse_decision(
            "Sure! Here is my decision:\n```json\n{\"task_type\": \"rag\", \"reason\": \"docs\", \"plan\": []}\n```\nHope that helps.",
        );
        assert_eq!(d.task_type, TaskType::KnowledgeLocal);
        assert_eq!(d.raw_label.as_deref(), Some("rag"));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let d = parse_decision(
            r#"Decision: {"task_type": "web_search", "reason": "mentions } and {", "plan": ["a"]} trailing"#,
        );
        assert_eq!(d.task_type, TaskType::KnowledgeWeb);
        assert_eq!(d.reason, "mentions } and {");
    }

    #[test]
    fn test_nested_object_is_balanced() {
        let d = parse_decision(
            r#"x {"task_type": "coding", "reason": "r", "plan": [], "extra": {"k": 1}} y"#,
        );
        assert_eq!(d.task_type, TaskType::Computational);
    }

    #[test]
    fn test_unparseable_falls_back() {
        for reply in [
            "",
            "I think this is a coding task.",
            "{not json at all}",
            "{\"task_type\": \"coding\"",
            "[1, 2, 3]",
            "42",
        ] {
            let d = parse_decision(reply);
            assert_eq!(d.task_type, TaskType::General, "reply: {reply:?}");
            assert!(d.fallback);
            assert!(d.reason.contains("parse"));
        }
    }

    #[test]
    fn test_normalization_defaults() {
        let d = parse_decision(r#"{"task_type": 7, "plan": "not a list"}"#);
        assert_eq!(d.task_type, TaskType::General);
        assert_eq!(d.reason, MISSING_REASON);
        assert!(d.plan.is_empty());
        assert!(d.raw_label.is_none());
        assert!(!d.fallback);

        let d = parse_decision(r#"{"task_type": "xyz123", "reason": "?", "plan": [1, "two"]}"#);
        assert_eq!(d.task_type, TaskType::General);
        assert_eq!(d.plan, vec!["1", "two"]);
    }

    #[test]
    fn test_first_braced_only() {
        assert_eq!(first_braced("a {b} {c}"), Some("{b}"));
        assert_eq!(first_braced("no braces"), None);
        assert_eq!(first_braced("{ unbalanced"), None);
    }
}
