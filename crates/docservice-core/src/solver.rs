//! Code-solving loop: generate a script, run it, correct it once, answer.
//!
//! The correction bound is fixed at one. A failure after the correction is
//! final and is explained to the user without any numeric result.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::infer::{is_backend_failure, Inference, TaskHint};
use crate::metrics::METRICS;
use crate::obs;
use crate::prompts::{render, PromptSet};
use crate::sandbox::{
    extract_code, ExecutionOutcome, FailureKind, SandboxConfig, ScriptExecutor, Verdict,
};

/// Corrections allowed after the first failed run.
pub const MAX_CORRECTIONS: usize = 1;

/// Detail used when a script completes without printing anything.
pub const NO_OUTPUT_DETAIL: &str =
    "the script completed but printed no result; it must print the answer with print()";

/// Longest failure detail handed to the summarizer, in characters.
const SUMMARY_DETAIL_CHARS: usize = 1500;

/// One script and what happened when it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionAttempt {
    pub script: String,
    pub outcome: ExecutionOutcome,
}

/// Full account of one `solve` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveReport {
    pub answer: String,
    /// At most `1 + MAX_CORRECTIONS` entries, in run order.
    pub attempts: Vec<CorrectionAttempt>,
    /// `true` when the answer is the script's integer output, unparaphrased.
    pub verbatim: bool,
}

/// Result of the last run, after silent runs are remapped to failures.
enum Settled {
    Output(String),
    Failed { kind: FailureKind, detail: String },
}

fn settle(outcome: &ExecutionOutcome) -> Settled {
    match outcome.verdict() {
        Verdict::Output(text) => Settled::Output(text),
        Verdict::Silent => Settled::Failed {
            kind: FailureKind::NoOutputProduced,
            detail: NO_OUTPUT_DETAIL.to_string(),
        },
        Verdict::Failed { kind, detail } => Settled::Failed { kind, detail },
    }
}

pub struct CodeSolver {
    infer: Arc<dyn Inference>,
    executor: Arc<dyn ScriptExecutor>,
    prompts: Arc<PromptSet>,
    deadline: Duration,
    data_root: String,
    vocabulary: String,
}

impl CodeSolver {
    pub fn new(
        infer: Arc<dyn Inference>,
        executor: Arc<dyn ScriptExecutor>,
        prompts: Arc<PromptSet>,
        sandbox: &SandboxConfig,
    ) -> Self {
        Self {
            infer,
            executor,
            prompts,
            deadline: sandbox.deadline(),
            data_root: sandbox.data_root.display().to_string(),
            vocabulary: sandbox.capabilities.vocabulary(),
        }
    }

    pub async fn solve(&self, query: &str) -> String {
        self.solve_detailed(query).await.answer
    }

    pub async fn solve_detailed(&self, query: &str) -> SolveReport {
        let generated = self
            .infer
            .infer(&self.generation_prompt(query), TaskHint::Computational)
            .await;
        if is_backend_failure(&generated) {
            // the caller absorbs the sentinel
            debug!("script generation failed, nothing to run");
            return SolveReport {
                answer: generated,
                attempts: Vec::new(),
                verbatim: false,
            };
        }

        let mut attempts = Vec::with_capacity(1 + MAX_CORRECTIONS);
        let mut settled = self.run(&generated, &mut attempts).await;

        for _ in 0..MAX_CORRECTIONS {
            let (kind, detail) = match &settled {
                Settled::Output(_) => break,
                Settled::Failed { kind, detail } => (*kind, detail.clone()),
            };
            METRICS.inc_corrections();
            obs::emit_correction_requested(&kind.to_string());

            let failing = attempts.last().map(|a| a.script.as_str()).unwrap_or("");
            let prompt = self.correction_prompt(query, failing, kind, &detail);
            let corrected = self.infer.infer(&prompt, TaskHint::Computational).await;
            if is_backend_failure(&corrected) {
                METRICS.inc_backend_failures();
                obs::emit_backend_failure("correct_script", &corrected);
                break;
            }
            settled = self.run(&corrected, &mut attempts).await;
        }

        // the bare result, without the stderr annotation the summary prompt gets
        let primary = attempts
            .last()
            .map(|a| a.outcome.primary_output().to_string())
            .unwrap_or_default();

        match settled {
            Settled::Output(_) if is_integer_literal(&primary) => {
                info!(attempts = attempts.len(), "numeric answer returned verbatim");
                SolveReport {
                    answer: primary,
                    attempts,
                    verbatim: true,
                }
            }
            Settled::Output(text) => {
                let prompt = render(
                    &self.prompts.summarize_success,
                    &[("query", query), ("output", text.as_str())],
                );
                SolveReport {
                    answer: self.infer.infer(&prompt, TaskHint::General).await,
                    attempts,
                    verbatim: false,
                }
            }
            Settled::Failed { kind, detail } => {
                warn!(failure_kind = %kind, attempts = attempts.len(), "script failed after correction");
                let failure = format!("{kind}: {}", clip(&detail, SUMMARY_DETAIL_CHARS));
                let prompt = render(
                    &self.prompts.summarize_failure,
                    &[("query", query), ("failure", failure.as_str())],
                );
                SolveReport {
                    answer: self.infer.infer(&prompt, TaskHint::General).await,
                    attempts,
                    verbatim: false,
                }
            }
        }
    }

    async fn run(&self, raw: &str, attempts: &mut Vec<CorrectionAttempt>) -> Settled {
        let script = extract_code(raw).source;
        let outcome = self.executor.execute(raw, self.deadline).await;
        let settled = settle(&outcome);
        debug!(
            attempt = attempts.len() + 1,
            failed = matches!(settled, Settled::Failed { .. }),
            elapsed_ms = outcome.elapsed_ms,
            "script run finished"
        );
        attempts.push(CorrectionAttempt { script, outcome });
        settled
    }

    fn generation_prompt(&self, query: &str) -> String {
        render(
            &self.prompts.generate_script,
            &[
                ("query", query),
                ("data_root", self.data_root.as_str()),
                ("capabilities", self.vocabulary.as_str()),
                ("data_schema", self.prompts.data_schema.as_str()),
            ],
        )
    }

    fn correction_prompt(
        &self,
        query: &str,
        script: &str,
        kind: FailureKind,
        detail: &str,
    ) -> String {
        let failure = format!("{kind}: {detail}");
        render(
            &self.prompts.correct_script,
            &[
                ("query", query),
                ("script", script),
                ("failure", failure.as_str()),
                ("data_root", self.data_root.as_str()),
                ("capabilities", self.vocabulary.as_str()),
                ("data_schema", self.prompts.data_schema.as_str()),
            ],
        )
    }
}

/// A base-10 integer with an optional sign and surrounding whitespace.
pub fn is_integer_literal(text: &str) -> bool {
    let t = text.trim();
    let digits = t.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(t);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
