//! Wire types for the queue protocol
//!
//! The queue speaks JSON over HTTPS: a poll returns either a job or an
//! errorcode, a result is posted back as a form-encoded envelope, and every
//! send is acknowledged with a small `{errorcode, errormsg}` document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::Job;

/// Outcome of one successful poll exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The queue handed out a job.
    Job(Job),
    /// No job currently available (errorcode 1).
    Empty,
}

/// Result payload sent back to the queue for one job.
///
/// Two shapes exist on the wire: `{errorcode: 0, jobdata}` carrying the
/// grading report verbatim, and `{errorcode: 2, errormsg}` carrying the
/// grading tool's captured output when it produced no report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope {
    pub errorcode: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errormsg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobdata: Option<Value>,
}

impl ResultEnvelope {
    /// Envelope for a grading run that produced a report.
    pub fn success(report: Value) -> Self {
        Self {
            errorcode: 0,
            errormsg: None,
            jobdata: Some(report),
        }
    }

    /// Envelope for a grading run that produced no parseable report.
    ///
    /// Both captured streams travel in `errormsg` so the queue operator can
    /// reconstruct the failure.
    pub fn failure(stdout: &str, stderr: &str) -> Self {
        Self {
            errorcode: 2,
            errormsg: Some(format!("stdout:\n{stdout}\nstderr:\n{stderr}")),
            jobdata: None,
        }
    }
}

/// Queue acknowledgement after accepting a result, also returned by the
/// connectivity-test endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AckResponse {
    pub errorcode: i64,
    #[serde(default)]
    pub errormsg: Option<String>,
}

impl AckResponse {
    pub fn message(&self) -> &str {
        self.errormsg.as_deref().unwrap_or("")
    }
}
