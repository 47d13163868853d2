//! Python execution.
//!
//! Generated code runs in a subprocess of the configured interpreter. A
//! small driver reads the program from stdin, executes it, and when the
//! last statement is an expression prints its value after a sentinel
//! line so it can be told apart from the program's own output.

use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::RunnerConfig;

const RESULT_SENTINEL: &str = "__pyrunner_result__";
const MAX_OUTPUT_BYTES: usize = 100_000;

const DRIVER: &str = r#"
import ast, os, sys
src = sys.stdin.read()
sys.stdin = open(os.devnull)
tree = ast.parse(src, "<generated>", "exec")
last = None
if tree.body and isinstance(tree.body[-1], ast.Expr):
    last = ast.Expression(tree.body.pop().value)
ns = {"__name__": "__main__"}
exec(compile(tree, "<generated>", "exec"), ns)
if last is not None:
    value = eval(compile(last, "<generated>", "eval"), ns)
    if value is not None:
        sys.stdout.flush()
        sys.stdout.write("\n__pyrunner_result__\n" + str(value))
"#;

/// What a program printed, plus the value of its trailing expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub result: Option<String>,
}

impl ExecutionOutput {
    /// Printed output followed by the result on its own line.
    pub fn display(&self) -> String {
        match (&self.result, self.stdout.is_empty()) {
            (Some(result), true) => result.clone(),
            (Some(result), false) => format!("{}\n{}", self.stdout, result),
            (None, _) => self.stdout.clone(),
        }
    }
}

/// Split raw driver output into printed text and the reported result.
pub fn parse_output(raw: &str) -> ExecutionOutput {
    let marker = format!("\n{}\n", RESULT_SENTINEL);
    match raw.rfind(&marker) {
        Some(pos) => ExecutionOutput {
            stdout: raw[..pos].trim_end_matches('\n').to_string(),
            result: Some(raw[pos + marker.len()..].to_string()),
        },
        None => ExecutionOutput {
            stdout: raw.trim_end_matches('\n').to_string(),
            result: None,
        },
    }
}

pub struct PythonRunner {
    python: String,
    timeout: Duration,
}

impl PythonRunner {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            python: config.python.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub async fn run(&self, code: &str) -> Result<ExecutionOutput> {
        tracing::debug!(python = %self.python, "running generated code");
        let mut child = tokio::process::Command::new(&self.python)
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start Python interpreter '{}'", self.python))?;

        let mut stdin = child.stdin.take().context("Python stdin unavailable")?;
        stdin
            .write_all(code.as_bytes())
            .await
            .context("Failed to send code to Python")?;
        drop(stdin);

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.context("Failed to execute code")?,
            Err(_) => anyhow::bail!(
                "Error executing code: timed out after {}s",
                self.timeout.as_secs()
            ),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("process exited with an error");
            tracing::debug!(status = ?output.status.code(), "python failed:\n{}", stderr);
            anyhow::bail!("Error executing code: {}", detail.trim());
        }

        let mut parsed = parse_output(&stdout);
        parsed.stdout = truncate_output(&parsed.stdout, MAX_OUTPUT_BYTES);
        Ok(parsed)
    }
}

fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    let half = max_bytes / 2;
    let mut head = half;
    while !output.is_char_boundary(head) {
        head -= 1;
    }
    let mut tail = output.len() - half;
    while !output.is_char_boundary(tail) {
        tail += 1;
    }
    let start = &output[..head];
    let end = &output[tail..];
    let omitted = output.len() - start.len() - end.len();
    format!("{}\n\n... ({} bytes omitted) ...\n\n{}", start, omitted, end)
}
