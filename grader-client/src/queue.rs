//! Queue exchanges and response classification

use async_trait::async_trait;
use grader_core::{AckResponse, Job, PollOutcome, ResultEnvelope};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::{QueueApi, QueueClient};

impl QueueClient {
    /// Poll the queue for the next job.
    ///
    /// The raw body is logged at debug level before classification so a
    /// failing exchange can always be reconstructed.
    pub async fn poll(&self) -> Result<PollOutcome> {
        let url = &self.endpoints.poll_url;
        info!("polling the queue at `{url}`");
        let body = self.client.get(url).send().await?.text().await?;
        debug!(%url, %body, "poll response");

        classify_poll_body(&body)
    }

    /// Send a job's result envelope; the queue must acknowledge with valid JSON.
    pub async fn send_result(&self, job_id: i64, envelope: &ResultEnvelope) -> Result<AckResponse> {
        let url = &self.endpoints.send_url;
        let resultdata = serde_json::to_string(envelope)?;
        let form = [("jobid", job_id.to_string()), ("resultdata", resultdata)];

        let body = self.client.post(url).form(&form).send().await?.text().await?;
        debug!(%url, %body, "send response");

        parse_ack(&body)
    }

    /// Probe the connectivity-test endpoint (the worker's `--test` mode).
    pub async fn test_connection(&self) -> Result<AckResponse> {
        let url = &self.endpoints.test_url;
        let body = self.client.get(url).send().await?.text().await?;
        debug!(%url, %body, "test response");

        parse_ack(&body)
    }
}

#[async_trait]
impl QueueApi for QueueClient {
    async fn poll(&self) -> Result<PollOutcome> {
        QueueClient::poll(self).await
    }

    async fn send_result(&self, job_id: i64, envelope: &ResultEnvelope) -> Result<AckResponse> {
        QueueClient::send_result(self, job_id, envelope).await
    }
}

/// Classifies a raw poll response body into a protocol outcome.
///
/// | errorcode | outcome |
/// |-----------|---------|
/// | 0 | job available; `jobid`, `jobname` and `jobdata` must all be present |
/// | 1 | no job currently available |
/// | 2 | queue-side error |
/// | 3 | authentication failure |
/// | other | unknown errorcode |
///
/// A non-JSON body or a body without `errorcode` is a protocol violation.
pub fn classify_poll_body(body: &str) -> Result<PollOutcome> {
    let data: Value = serde_json::from_str(body)
        .map_err(|_| ClientError::protocol("queue returned non-JSON data", body))?;

    let Some(code) = data.get("errorcode").and_then(Value::as_i64) else {
        return Err(ClientError::protocol(
            "queue returned data without errorcode",
            body,
        ));
    };

    let message = || {
        data.get("errormsg")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };

    match code {
        0 => {
            let id = data.get("jobid").and_then(Value::as_i64);
            let name = data.get("jobname").and_then(Value::as_str);
            let payload = data.get("jobdata").and_then(Value::as_object);
            match (id, name, payload) {
                (Some(id), Some(name), Some(payload)) => Ok(PollOutcome::Job(Job {
                    id,
                    name: name.to_string(),
                    payload: payload.clone(),
                })),
                _ => Err(ClientError::protocol("queue returned no jobdata", body)),
            }
        }
        1 => Ok(PollOutcome::Empty),
        2 => Err(ClientError::Queue(message())),
        3 => Err(ClientError::Auth(message())),
        code => Err(ClientError::UnknownCode {
            code,
            message: message(),
        }),
    }
}

fn parse_ack(body: &str) -> Result<AckResponse> {
    serde_json::from_str(body).map_err(|_| ClientError::Ack {
        body: body.to_string(),
    })
}
