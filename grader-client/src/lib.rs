//! HTTPS client for the grading queue
//!
//! A small, type-safe client for the queue's three endpoints: poll for the
//! next job, send a job's result, and test connectivity. Responses are
//! classified into typed outcomes so the worker's state machine never touches
//! raw JSON.
//!
//! # Example
//!
//! ```no_run
//! use grader_client::{Endpoints, QueueClient};
//! use grader_core::PollOutcome;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), grader_client::ClientError> {
//!     let client = QueueClient::new(Endpoints {
//!         poll_url: "https://queue.example.org/poll".to_string(),
//!         send_url: "https://queue.example.org/send".to_string(),
//!         test_url: "https://queue.example.org/test".to_string(),
//!     });
//!
//!     match client.poll().await? {
//!         PollOutcome::Job(job) => println!("got job #{}", job.id),
//!         PollOutcome::Empty => println!("no job available"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod queue;

pub use error::{ClientError, Result};
pub use queue::classify_poll_body;

use async_trait::async_trait;
use grader_core::{AckResponse, PollOutcome, ResultEnvelope};
use reqwest::Client;

/// Endpoints exposed by the grading queue.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub poll_url: String,
    pub send_url: String,
    pub test_url: String,
}

/// HTTP client for the grading queue
#[derive(Debug, Clone)]
pub struct QueueClient {
    pub(crate) endpoints: Endpoints,
    pub(crate) client: Client,
}

impl QueueClient {
    /// Create a queue client with a default HTTP client
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(endpoints, Client::new())
    }

    /// Create a queue client over a preconfigured HTTP client
    ///
    /// The worker uses this to supply a client carrying its TLS identity
    /// (client certificate and CA bundle) and request timeout.
    pub fn with_client(endpoints: Endpoints, client: Client) -> Self {
        Self { endpoints, client }
    }

    /// URL polled for new jobs
    pub fn poll_url(&self) -> &str {
        &self.endpoints.poll_url
    }

    /// URL results are posted to
    pub fn send_url(&self) -> &str {
        &self.endpoints.send_url
    }

    /// URL of the connectivity-test endpoint
    pub fn test_url(&self) -> &str {
        &self.endpoints.test_url
    }
}

/// Queue operations the worker's orchestrator depends on.
///
/// Implemented by [`QueueClient`]; tests drive the orchestrator with scripted
/// fakes instead of a live queue.
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// Fetch and classify the next unit of work.
    async fn poll(&self) -> Result<PollOutcome>;

    /// Deliver a job's result envelope and return the queue's acknowledgement.
    async fn send_result(&self, job_id: i64, envelope: &ResultEnvelope) -> Result<AckResponse>;
}
