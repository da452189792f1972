//! Grading queue domain types
//!
//! Shared types and pure logic for the grader worker: the job pulled from the
//! queue, the payload preparation applied before handing it to the grading
//! tool, the result envelope sent back, and a summary view over the grading
//! report used for logging.

pub mod job;
pub mod protocol;
pub mod report;

pub use job::{GradingEnv, Job, substitute_vars};
pub use protocol::{AckResponse, PollOutcome, ResultEnvelope};
