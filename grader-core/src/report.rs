//! Summary view over a grading report
//!
//! The report stays opaque and is forwarded to the queue verbatim; this
//! module only extracts per-test verdicts for the worker's summary logging.

use serde_json::Value;

/// Verdict of a single test report inside an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    /// The submission ran and its output went through the checker.
    Checked,
    /// The submission ran but returned an error.
    ExecutionError,
    /// The test was rejected by the sanitizer before execution.
    Rejected,
}

/// Verdicts extracted from one `executions[]` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSummary {
    pub name: String,
    pub verdicts: Vec<TestVerdict>,
}

/// Walks `executions[].testsReports[]`, mapping each report to a verdict by
/// which of the `checker` / `execution` / `sanitizer` fields is present.
/// Missing or malformed sections are skipped rather than rejected.
pub fn summarize(report: &Value) -> Vec<ExecutionSummary> {
    let Some(executions) = report.get("executions").and_then(Value::as_array) else {
        return Vec::new();
    };

    executions
        .iter()
        .map(|execution| {
            let name = execution
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            let verdicts = execution
                .get("testsReports")
                .and_then(Value::as_array)
                .map(|reports| reports.iter().map(verdict).collect())
                .unwrap_or_default();
            ExecutionSummary { name, verdicts }
        })
        .collect()
}

fn verdict(report: &Value) -> TestVerdict {
    if report.get("checker").is_some() {
        TestVerdict::Checked
    } else if report.get("execution").is_some() {
        TestVerdict::ExecutionError
    } else {
        TestVerdict::Rejected
    }
}
