//! Isolated script execution: deadline, captured streams, outcome classification.
//!
//! Every run happens in a separate interpreter process whose working directory
//! is the data root. The host process never changes its own working directory
//! or standard streams, so there is nothing to restore in the host. Scratch
//! files live in a [`RunWorkspace`] that is removed on every exit path, and
//! the child is killed and reaped when the deadline expires.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::capability::CapabilitySet;
use super::error::{SandboxError, SandboxResult};
use super::extract::extract_code;
use super::harness::{HarnessReport, RunWorkspace};
use crate::metrics::METRICS;
use crate::obs;

/// Detail recorded when the input holds no runnable code.
pub const NO_CODE_DETAIL: &str = "no executable code found";

/// How long stream readers may keep draining after the child is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Configuration for sandboxed script execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter executable, resolved through `PATH`.
    pub interpreter: String,
    /// Working directory for every script; relative paths resolve against it.
    pub data_root: PathBuf,
    /// Default wall-clock deadline for a single run (seconds).
    pub deadline_secs: u64,
    /// Bytes kept per captured stream; the rest is drained and dropped.
    pub max_output_bytes: usize,
    /// Runs allowed at once against the same data root.
    pub max_concurrent: usize,
    /// Facilities pre-loaded into the script namespace.
    pub capabilities: CapabilitySet,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            data_root: PathBuf::from("./data"),
            deadline_secs: 30,
            max_output_bytes: 64 * 1024,
            max_concurrent: 1,
            capabilities: CapabilitySet::standard(),
        }
    }
}

impl SandboxConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn validate(&self) -> SandboxResult<()> {
        if self.interpreter.trim().is_empty() {
            return Err(SandboxError::InvalidConfig(
                "interpreter must not be empty".into(),
            ));
        }
        if self.deadline_secs == 0 {
            return Err(SandboxError::InvalidConfig(
                "deadline_secs must be greater than zero".into(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_concurrent must be greater than zero".into(),
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_output_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Failure taxonomy for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoCodeFound,
    Timeout,
    RuntimeFailure,
    NoOutputProduced,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::NoCodeFound => "no_code_found",
            FailureKind::Timeout => "timeout",
            FailureKind::RuntimeFailure => "runtime_failure",
            FailureKind::NoOutputProduced => "no_output_produced",
        };
        write!(f, "{s}")
    }
}

/// Everything observed during one run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub failed: bool,
    pub failure_kind: Option<FailureKind>,
    pub failure_detail: Option<String>,
    pub returned_value: Option<String>,
    pub elapsed_ms: u64,
}

/// How the caller should treat an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Usable result: the returned value or trimmed stdout, stderr annotated.
    Output(String),
    /// Completed without printing or returning anything.
    Silent,
    Failed { kind: FailureKind, detail: String },
}

impl ExecutionOutcome {
    /// A successful run.
    pub fn completed(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        returned_value: Option<String>,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            failed: false,
            failure_kind: None,
            failure_detail: None,
            returned_value,
            elapsed_ms: 0,
        }
    }

    /// A failed run with the given kind and detail.
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            timed_out: kind == FailureKind::Timeout,
            failed: true,
            failure_kind: Some(kind),
            failure_detail: Some(detail.into()),
            returned_value: None,
            elapsed_ms: 0,
        }
    }

    pub fn no_code() -> Self {
        Self::failure(FailureKind::NoCodeFound, NO_CODE_DETAIL)
    }

    fn with_streams(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    /// The returned value if there is one, else stdout. Trimmed, stderr excluded.
    pub fn primary_output(&self) -> &str {
        self.returned_value.as_deref().unwrap_or(&self.stdout).trim()
    }

    /// Classify the outcome for the code-solving loop.
    pub fn verdict(&self) -> Verdict {
        if self.failed {
            return Verdict::Failed {
                kind: self.failure_kind.unwrap_or(FailureKind::RuntimeFailure),
                detail: self
                    .failure_detail
                    .clone()
                    .unwrap_or_else(|| "script failed".to_string()),
            };
        }

        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();

        if self.returned_value.is_none() && stdout.is_empty() {
            if !stderr.is_empty() {
                // only warnings, no result
                return Verdict::Failed {
                    kind: FailureKind::RuntimeFailure,
                    detail: stderr.to_string(),
                };
            }
            return Verdict::Silent;
        }

        let mut text = self.primary_output().to_string();
        if !stderr.is_empty() {
            text.push_str("\n[stderr] ");
            text.push_str(stderr);
        }
        Verdict::Output(text)
    }
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Output(_) => "output",
            Verdict::Silent => "silent",
            Verdict::Failed { .. } => "failed",
        }
    }
}

/// Anything that can run raw model output as a script under a deadline.
///
/// Implementations never fail: every problem is reported in the outcome.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, raw: &str, deadline: Duration) -> ExecutionOutcome;
}

/// Lifecycle of one sandbox invocation, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Extracting,
    NoCode,
    Preparing,
    Running,
    TimedOut,
    Raised,
    Completed,
    Restoring,
    Done,
}

fn enter(phase: Phase) {
    debug!(phase = ?phase, "sandbox phase");
}

/// Raw results of a finished (or killed) child.
struct ChildRun {
    stdout: String,
    stderr: String,
    timed_out: bool,
    exit_status: Option<std::process::ExitStatus>,
    report: Option<HarnessReport>,
    /// Time from spawn to exit, or to the kill on timeout.
    elapsed: Duration,
}

/// Runs scripts in a child interpreter process.
#[derive(Debug)]
pub struct PythonSandbox {
    config: SandboxConfig,
    prelude: String,
    gate: Semaphore,
}

impl PythonSandbox {
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        config.validate()?;
        let prelude = config.capabilities.prelude_source();
        let gate = Semaphore::new(config.max_concurrent);
        Ok(Self {
            config,
            prelude,
            gate,
        })
    }

    async fn execute_raw(&self, raw: &str, deadline: Duration) -> ExecutionOutcome {
        enter(Phase::Extracting);
        let code = extract_code(raw);
        if code.is_empty() {
            enter(Phase::NoCode);
            let outcome = ExecutionOutcome::no_code();
            obs::emit_sandbox_finished(outcome.verdict().label(), 0, false);
            return outcome;
        }

        // Permit held for the whole run; runs sharing a data root are serialized.
        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "sandbox gate closed");
                return ExecutionOutcome::failure(FailureKind::RuntimeFailure, e.to_string());
            }
        };

        let started = Instant::now();
        let outcome = match self.run_isolated(&code.source, deadline).await {
            Ok(run) => {
                let elapsed = run.elapsed;
                self.outcome_from(run, deadline).with_elapsed(elapsed)
            }
            Err(e) => {
                error!(error = %e, "sandbox infrastructure failure");
                ExecutionOutcome::failure(FailureKind::RuntimeFailure, e.to_string())
                    .with_elapsed(started.elapsed())
            }
        };
        enter(Phase::Done);

        METRICS.inc_scripts_executed();
        if outcome.timed_out {
            METRICS.inc_script_timeouts();
        }
        obs::emit_sandbox_finished(
            outcome.verdict().label(),
            outcome.elapsed_ms,
            outcome.timed_out,
        );
        outcome
    }

    async fn run_isolated(&self, source: &str, deadline: Duration) -> SandboxResult<ChildRun> {
        enter(Phase::Preparing);
        if !self.config.data_root.is_dir() {
            return Err(SandboxError::InvalidConfig(format!(
                "data root {} is not a directory",
                self.config.data_root.display()
            )));
        }
        // the child sees an absolute path no matter how the root was configured
        let data_root = std::fs::canonicalize(&self.config.data_root).map_err(|e| {
            SandboxError::InvalidConfig(format!(
                "data root {} cannot be resolved: {e}",
                self.config.data_root.display()
            ))
        })?;
        let workspace = RunWorkspace::prepare(source, &self.prelude)?;

        let mut cmd = Command::new(&self.config.interpreter);
        // -I: no user site, no PYTHON* env, script dir not on sys.path
        cmd.args(["-I", "-u", "-X", "utf8"])
            .arg(&workspace.harness)
            .arg(&workspace.script)
            .arg(&workspace.prelude)
            .arg(&workspace.report)
            .current_dir(&data_root)
            .env_clear()
            .env("DATA_ROOT", &data_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in ["PATH", "SYSTEMROOT", "LANG"] {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        // own process group, so anything the script spawns is killed with it
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            interpreter: self.config.interpreter.clone(),
            source,
        })?;
        let started = Instant::now();
        let pid = child.id();

        let limit = self.config.max_output_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_capped(out, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_capped(err, limit)));

        enter(Phase::Running);
        let waited = tokio::time::timeout(deadline, child.wait()).await;
        let elapsed = started.elapsed();
        let (exit_status, timed_out) = match waited {
            Ok(status) => {
                kill_process_group(pid);
                (Some(status?), false)
            }
            Err(_elapsed) => {
                enter(Phase::TimedOut);
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out script");
                }
                (None, true)
            }
        };

        enter(Phase::Restoring);
        let grace_until = tokio::time::Instant::now() + READER_GRACE;
        let stdout = collect(stdout_task, grace_until).await;
        let stderr = collect(stderr_task, grace_until).await;
        let report = if timed_out {
            None
        } else {
            workspace.read_report()?
        };

        Ok(ChildRun {
            stdout,
            stderr,
            timed_out,
            exit_status,
            report,
            elapsed,
        })
    }

    fn outcome_from(&self, run: ChildRun, deadline: Duration) -> ExecutionOutcome {
        if run.timed_out {
            let detail = format!(
                "execution timed out after {}ms (deadline {}ms)",
                run.elapsed.as_millis(),
                deadline.as_millis()
            );
            return ExecutionOutcome::failure(FailureKind::Timeout, detail)
                .with_streams(run.stdout, run.stderr);
        }

        match run.report {
            Some(HarnessReport::Completed { returned }) => {
                enter(Phase::Completed);
                ExecutionOutcome::completed(run.stdout, run.stderr, returned)
            }
            Some(report @ HarnessReport::Raised { .. }) => {
                enter(Phase::Raised);
                let detail = report
                    .failure_detail()
                    .unwrap_or_else(|| "script raised an error".to_string());
                ExecutionOutcome::failure(FailureKind::RuntimeFailure, detail)
                    .with_streams(run.stdout, run.stderr)
            }
            None => match run.exit_status {
                // the script ended the interpreter itself (os._exit(0))
                Some(status) if status.success() => {
                    enter(Phase::Completed);
                    ExecutionOutcome::completed(run.stdout, run.stderr, None)
                }
                status => {
                    enter(Phase::Raised);
                    let code = status
                        .and_then(|s| s.code())
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    let mut detail = format!("interpreter exited ({code}) without a report");
                    let tail = tail_lines(&run.stderr, 20);
                    if !tail.is_empty() {
                        detail.push('\n');
                        detail.push_str(&tail);
                    }
                    ExecutionOutcome::failure(FailureKind::RuntimeFailure, detail)
                        .with_streams(run.stdout, run.stderr)
                }
            },
        }
    }
}

#[async_trait]
impl ScriptExecutor for PythonSandbox {
    async fn execute(&self, raw: &str, deadline: Duration) -> ExecutionOutcome {
        self.execute_raw(raw, deadline).await
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
async fn read_capped<R>(mut reader: R, limit: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                warn!(error = %e, "stream read failed");
                break;
            }
        }
    }
    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if truncated {
        text.push_str(&format!("\n[output truncated at {limit} bytes]"));
    }
    text
}

/// Kill every process left in the run's process group.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // negative pid addresses the group; ESRCH just means it is already empty
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Await a reader task, giving up at `grace_until`.
async fn collect(
    task: Option<tokio::task::JoinHandle<String>>,
    grace_until: tokio::time::Instant,
) -> String {
    let Some(mut handle) = task else {
        return String::new();
    };
    match tokio::time::timeout_at(grace_until, &mut handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "stream reader task failed");
            String::new()
        }
        Err(_) => {
            // a process spawned by the script still holds the pipe open
            handle.abort();
            String::new()
        }
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.interpreter, "python3");
        assert_eq!(cfg.deadline(), Duration::from_secs(30));
        assert_eq!(cfg.max_concurrent, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sandbox_config_rejects_zero_deadline() {
        let cfg = SandboxConfig {
            deadline_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SandboxError::InvalidConfig(msg)) if msg.contains("deadline_secs")
        ));
        assert!(PythonSandbox::new(cfg).is_err());
    }

    #[test]
    fn test_verdict_prefers_returned_value() {
        let outcome = ExecutionOutcome::completed("ignored\n", "", Some("7".into()));
        assert_eq!(outcome.verdict(), Verdict::Output("7".into()));
    }

    #[test]
    fn test_verdict_trims_stdout_and_annotates_stderr() {
        let outcome = ExecutionOutcome::completed("  10 \n", "DeprecationWarning: x\n", None);
        assert_eq!(
            outcome.verdict(),
            Verdict::Output("10\n[stderr] DeprecationWarning: x".into())
        );
    }

    #[test]
    fn test_primary_output_excludes_stderr() {
        let outcome = ExecutionOutcome::completed("42\n", "DeprecationWarning: x", None);
        assert_eq!(outcome.primary_output(), "42");

        let outcome = ExecutionOutcome::completed("noise\n", "", Some(" 5\n".into()));
        assert_eq!(outcome.primary_output(), "5");
    }

    #[test]
    fn test_verdict_stderr_only_is_failure() {
        let outcome = ExecutionOutcome::completed("", "warning only", None);
        assert_eq!(
            outcome.verdict(),
            Verdict::Failed {
                kind: FailureKind::RuntimeFailure,
                detail: "warning only".into()
            }
        );
    }

    #[test]
    fn test_verdict_silent() {
        let outcome = ExecutionOutcome::completed("  \n", "", None);
        assert_eq!(outcome.verdict(), Verdict::Silent);
    }

    #[test]
    fn test_verdict_failure_passthrough() {
        let outcome = ExecutionOutcome::failure(FailureKind::Timeout, "execution timed out");
        assert!(outcome.timed_out);
        match outcome.verdict() {
            Verdict::Failed { kind, detail } => {
                assert_eq!(kind, FailureKind::Timeout);
                assert_eq!(detail, "execution timed out");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_outcome_serde_roundtrip() {
        let outcome = ExecutionOutcome::no_code();
        let json = serde_json::to_string(&outcome).unwrap();
        let back: ExecutionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
        assert!(json.contains("no_code_found"));
    }

    #[tokio::test]
    async fn test_read_capped_truncates() {
        let data: &[u8] = b"abcdefghij";
        let text = read_capped(data, 4).await;
        assert!(text.starts_with("abcd\n[output truncated at 4 bytes]"));

        let text = read_capped(b"abc".as_slice(), 4).await;
        assert_eq!(text, "abc");
    }

    #[tokio::test]
    async fn test_empty_input_never_spawns() {
        let sandbox = PythonSandbox::new(SandboxConfig {
            interpreter: "definitely-not-an-interpreter".into(),
            ..Default::default()
        })
        .unwrap();
        let outcome = sandbox.execute("```\n\n```", Duration::from_secs(1)).await;
        assert_eq!(outcome.failure_kind, Some(FailureKind::NoCodeFound));
        assert_eq!(outcome.failure_detail.as_deref(), Some(NO_CODE_DETAIL));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_reported_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = PythonSandbox::new(SandboxConfig {
            interpreter: "definitely-not-an-interpreter".into(),
            data_root: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        let outcome = sandbox.execute("print(1)", Duration::from_secs(1)).await;
        assert!(outcome.failed);
        assert!(outcome
            .failure_detail
            .unwrap()
            .contains("failed to start interpreter"));
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail_lines("", 2), "");
    }
}
