//! Error types for the queue client

use thiserror::Error;

/// Result type alias for queue client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to the grading queue.
///
/// Every variant is fatal to the worker: once the poll or send exchange can
/// no longer be trusted, the orchestrator propagates the error and the
/// process exits nonzero. A failed grading run is not an error at this level;
/// it travels back to the queue inside an errorcode-2 result envelope.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// A result envelope could not be serialized
    #[error("failed to encode result envelope: {0}")]
    Encode(#[from] serde_json::Error),

    /// The queue response violates the protocol (non-JSON body, missing
    /// errorcode, or missing job fields on a successful poll)
    #[error("queue protocol violation: {reason}")]
    Protocol {
        /// What was wrong with the response
        reason: String,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// The queue explicitly reported an internal error (errorcode 2)
    #[error("queue reported an error: {0}")]
    Queue(String),

    /// The queue rejected our credentials (errorcode 3)
    #[error("queue authentication failed: {0}")]
    Auth(String),

    /// The queue returned an errorcode outside the protocol
    #[error("queue returned unknown errorcode {code}: {message}")]
    UnknownCode { code: i64, message: String },

    /// The queue acknowledged a sent result with an unparseable body
    #[error("queue acknowledged results with invalid data: {body}")]
    Ack { body: String },
}

impl ClientError {
    /// Create a protocol violation with the offending body retained
    pub fn protocol(reason: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
            body: body.into(),
        }
    }
}
