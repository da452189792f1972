//! Grading tool execution
//!
//! Runs a prepared job payload through the external grading tool: the payload
//! is written to the child's stdin once, both output streams are drained to
//! completion, and stdout is parsed as JSON. Whether that parse succeeds is
//! the only thing deciding success or failure; the child's exit code is not
//! consulted.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

/// Outcome of one grading-tool run.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// stdout parsed as JSON: the grading report, forwarded verbatim.
    Report(Value),
    /// Anything else; both captured streams are kept for the failure envelope.
    Failed { stdout: String, stderr: String },
}

/// Runs a prepared job payload through a grading backend.
///
/// The production backend is [`GraderProcess`]; tests replace it with a fake
/// to drive the orchestrator without spawning processes.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, payload: &Value) -> ExecutionOutcome;
}

/// Production backend: spawns the configured grading command per job.
///
/// The child is owned exclusively by the running call and never outlives it;
/// on timeout it is killed rather than abandoned.
pub struct GraderProcess {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl GraderProcess {
    pub fn new(command: &[String], timeout: Option<Duration>) -> anyhow::Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("grader command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    async fn run(&self, payload: &Value) -> std::io::Result<ExecutionOutcome> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin from its own task so a child that writes before reading
        // everything cannot deadlock against us.
        if let Some(mut stdin) = child.stdin.take() {
            let input = payload.to_string();
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                // stdin drops here, closing the child's input channel
            });
        }

        let output = match self.timeout {
            Some(limit) => match time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    return Ok(ExecutionOutcome::Failed {
                        stdout: String::new(),
                        stderr: format!("grading tool timed out after {}s", limit.as_secs()),
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(%stdout, %stderr, "grading tool output");

        Ok(match serde_json::from_str(&stdout) {
            Ok(report) => ExecutionOutcome::Report(report),
            Err(_) => ExecutionOutcome::Failed { stdout, stderr },
        })
    }
}

#[async_trait]
impl ExecutionBackend for GraderProcess {
    async fn execute(&self, payload: &Value) -> ExecutionOutcome {
        match self.run(payload).await {
            Ok(outcome) => outcome,
            // A tool that cannot be started is an execution failure like any
            // other and is reported to the queue, not treated as fatal.
            Err(e) => ExecutionOutcome::Failed {
                stdout: String::new(),
                stderr: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sh(script: &str, timeout: Option<Duration>) -> GraderProcess {
        GraderProcess::new(
            &["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_json_stdout_is_a_report() {
        let backend = sh(r#"cat > /dev/null; echo '{"executions": []}'"#, None);
        let outcome = backend.execute(&json!({"rootPath": "/"})).await;
        assert_eq!(outcome, ExecutionOutcome::Report(json!({"executions": []})));
    }

    #[tokio::test]
    async fn test_payload_reaches_child_stdin() {
        // `cat` echoes the payload back, so the report equals the input
        let backend = sh("cat", None);
        let payload = json!({"rootPath": "/grader", "restrictToPaths": ["/a"]});
        let outcome = backend.execute(&payload).await;
        assert_eq!(outcome, ExecutionOutcome::Report(payload));
    }

    #[tokio::test]
    async fn test_non_json_stdout_keeps_both_streams() {
        let backend = sh("cat > /dev/null; echo 'not valid JSON'; echo boom >&2", None);
        let outcome = backend.execute(&json!({})).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Failed {
                stdout: "not valid JSON\n".to_string(),
                stderr: "boom\n".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unstartable_tool_is_a_failure() {
        let backend =
            GraderProcess::new(&["/nonexistent/taskgrader".to_string()], None).unwrap();
        match backend.execute(&json!({})).await {
            ExecutionOutcome::Failed { stdout, stderr } => {
                assert!(stdout.is_empty());
                assert!(!stderr.is_empty());
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_and_fails() {
        let backend = sh("sleep 5", Some(Duration::from_millis(100)));
        match backend.execute(&json!({})).await {
            ExecutionOutcome::Failed { stderr, .. } => {
                assert!(stderr.contains("timed out"));
            }
            other => panic!("expected a timeout failure, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(GraderProcess::new(&[], None).is_err());
    }
}
