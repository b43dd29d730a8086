//! Interpreter-side harness and its per-run scratch workspace.
//!
//! The harness loads the capability prelude into a fresh namespace, runs the
//! script, evaluates a trailing bare expression once, and writes a JSON report
//! to a file so stdout and stderr carry only what the script itself wrote.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tempfile::TempDir;

use super::error::{SandboxError, SandboxResult};

const HARNESS_SOURCE: &str = r#"import ast
import json
import sys
import traceback


def _write(path, payload):
    with open(path, "w", encoding="utf-8") as fh:
        json.dump(payload, fh)


def _failure(exc):
    line = None
    for frame in traceback.extract_tb(exc.__traceback__):
        if frame.filename == "<script>":
            line = frame.lineno
    if line is None and isinstance(exc, SyntaxError):
        line = exc.lineno
    trace = "".join(traceback.format_exception(type(exc), exc, exc.__traceback__))
    return {
        "status": "raised",
        "kind": type(exc).__name__,
        "message": str(exc),
        "line": line,
        "traceback": trace[-4000:],
    }


def _main():
    script_path, prelude_path, report_path = sys.argv[1], sys.argv[2], sys.argv[3]
    with open(script_path, encoding="utf-8") as fh:
        source = fh.read()
    with open(prelude_path, encoding="utf-8") as fh:
        prelude = fh.read()

    namespace = {"__builtins__": __builtins__, "__name__": "__main__"}
    exec(compile(prelude, "<prelude>", "exec"), namespace)

    returned = None
    try:
        tree = ast.parse(source, filename="<script>", mode="exec")
        tail = None
        if tree.body and isinstance(tree.body[-1], ast.Expr):
            tail = ast.Expression(body=tree.body.pop().value)
        exec(compile(tree, "<script>", "exec"), namespace)
        if tail is not None:
            value = eval(compile(tail, "<script>", "eval"), namespace)
            if value is not None:
                try:
                    returned = str(value)
                except Exception:
                    returned = None
    except SystemExit as exc:
        if exc.code not in (None, 0):
            _write(report_path, _failure(exc))
            return
    except BaseException as exc:
        _write(report_path, _failure(exc))
        return
    _write(report_path, {"status": "completed", "returned": returned})


_main()
"#;

/// What the harness wrote after the script finished.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum HarnessReport {
    Completed {
        returned: Option<String>,
    },
    Raised {
        kind: String,
        message: String,
        line: Option<u32>,
        traceback: String,
    },
}

impl HarnessReport {
    /// Render a raised error as `Kind: message (line N)` followed by the trace.
    pub(crate) fn failure_detail(&self) -> Option<String> {
        match self {
            HarnessReport::Completed { .. } => None,
            HarnessReport::Raised {
                kind,
                message,
                line,
                traceback,
            } => {
                let location = line.map(|l| format!(" (line {l})")).unwrap_or_default();
                Some(format!(
                    "{kind}: {message}{location}\n{}",
                    traceback.trim_end()
                ))
            }
        }
    }
}

/// Scratch directory holding one run's harness, prelude, script, and report.
///
/// Dropping it removes the directory, on every exit path.
pub(crate) struct RunWorkspace {
    _dir: TempDir,
    pub harness: PathBuf,
    pub prelude: PathBuf,
    pub script: PathBuf,
    pub report: PathBuf,
}

impl RunWorkspace {
    pub(crate) fn prepare(source: &str, prelude: &str) -> SandboxResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("docservice-run-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        let root = dir.path();
        let ws = Self {
            harness: root.join("harness.py"),
            prelude: root.join("prelude.py"),
            script: root.join("script.py"),
            report: root.join("report.json"),
            _dir: dir,
        };
        write(&ws.harness, HARNESS_SOURCE)?;
        write(&ws.prelude, prelude)?;
        write(&ws.script, source)?;
        Ok(ws)
    }

    /// Read the report, `None` when the harness never wrote one.
    pub(crate) fn read_report(&self) -> SandboxResult<Option<HarnessReport>> {
        let raw = match std::fs::read_to_string(&self.report) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SandboxError::Workspace(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SandboxError::Report(e.to_string()))
    }
}

fn write(path: &Path, contents: &str) -> SandboxResult<()> {
    std::fs::write(path, contents).map_err(SandboxError::Workspace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_writes_all_files_and_cleans_up() {
        let root;
        {
            let ws = RunWorkspace::prepare("print(1)", "import re").unwrap();
            root = ws.script.parent().unwrap().to_path_buf();
            assert_eq!(std::fs::read_to_string(&ws.script).unwrap(), "print(1)");
            assert_eq!(std::fs::read_to_string(&ws.prelude).unwrap(), "import re");
            assert!(std::fs::read_to_string(&ws.harness)
                .unwrap()
                .contains("ast.Expression"));
            assert!(ws.read_report().unwrap().is_none());
        }
        assert!(!root.exists());
    }

    #[test]
    fn test_report_parsing() {
        let ws = RunWorkspace::prepare("", "").unwrap();
        std::fs::write(
            &ws.report,
            r#"{"status": "raised", "kind": "ZeroDivisionError", "message": "division by zero", "line": 3, "traceback": "Traceback...\n"}"#,
        )
        .unwrap();
        let report = ws.read_report().unwrap().unwrap();
        let detail = report.failure_detail().unwrap();
        assert!(detail.starts_with("ZeroDivisionError: division by zero (line 3)"));

        std::fs::write(&ws.report, r#"{"status": "completed", "returned": "7"}"#).unwrap();
        assert_eq!(
            ws.read_report().unwrap(),
            Some(HarnessReport::Completed {
                returned: Some("7".to_string())
            })
        );
    }

    #[test]
    fn test_malformed_report_is_an_error() {
        let ws = RunWorkspace::prepare("", "").unwrap();
        std::fs::write(&ws.report, "{not json").unwrap();
        assert!(matches!(ws.read_report(), Err(SandboxError::Report(_))));
    }
}
