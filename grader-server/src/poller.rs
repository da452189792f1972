//! Main worker loop
//!
//! Polls the queue, dispatches each job to the grading backend, reports the
//! result, and applies the configured wait policy when the queue is empty.
//! Strictly one job is in flight at any time: no new poll is issued until the
//! previous job's result has been acknowledged or the loop has fatally failed.

use anyhow::{Context, Result};
use grader_client::QueueApi;
use grader_core::report::{self, TestVerdict};
use grader_core::{GradingEnv, Job, PollOutcome, ResultEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

use crate::config::Config;
use crate::executor::{ExecutionBackend, ExecutionOutcome};
use crate::wakeup::WakeSignal;

/// Wait behavior when the queue reports no available job.
///
/// Selected once at startup; the modes are mutually exclusive per process
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Block until the wake-up listener's signal fires, then re-poll.
    Listen,
    /// Sleep the configured interval, then re-poll unconditionally.
    Continuous,
    /// Terminate the loop successfully; the only zero-exit-code path.
    OneShot,
}

/// Sequential poll → execute → report loop.
pub struct Orchestrator<Q, E> {
    queue: Arc<Q>,
    backend: E,
    env: GradingEnv,
    mode: WaitMode,
    poll_interval: Duration,
    wakeup_tick: Duration,
    wake: Arc<WakeSignal>,
}

impl<Q: QueueApi, E: ExecutionBackend> Orchestrator<Q, E> {
    pub fn new(
        config: &Config,
        queue: Arc<Q>,
        backend: E,
        mode: WaitMode,
        wake: Arc<WakeSignal>,
    ) -> Self {
        Self {
            queue,
            backend,
            env: config.env.clone(),
            mode,
            poll_interval: config.poll_interval,
            wakeup_tick: config.wakeup_tick,
            wake,
        }
    }

    /// Runs the loop until a graceful one-shot exit or a fatal queue error.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.queue.poll().await.context("queue poll failed")? {
                PollOutcome::Job(job) => self.process_job(job).await?,
                PollOutcome::Empty => {
                    info!("queue has no available job");
                    match self.mode {
                        WaitMode::OneShot => {
                            info!("no job available, exiting");
                            return Ok(());
                        }
                        WaitMode::Continuous => {
                            debug!("waiting {:?} before new poll", self.poll_interval);
                            time::sleep(self.poll_interval).await;
                        }
                        WaitMode::Listen => {
                            self.wake.wait(self.wakeup_tick).await;
                            self.wake.clear();
                            info!("received wake-up signal");
                        }
                    }
                }
            }
        }
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        info!("received job `{}` (#{})", job.name, job.id);

        let payload = job.prepare_payload(&self.env);
        debug!(%payload, "payload sent to the grading tool");

        let envelope = match self.backend.execute(&payload).await {
            ExecutionOutcome::Report(report) => {
                info!("execution successful");
                log_report_summary(&report);
                ResultEnvelope::success(report)
            }
            ExecutionOutcome::Failed { stdout, stderr } => {
                info!("grading tool produced no report");
                ResultEnvelope::failure(&stdout, &stderr)
            }
        };

        let ack = self
            .queue
            .send_result(job.id, &envelope)
            .await
            .context("failed to report job result")?;
        info!("queue response: ({}) {}", ack.errorcode, ack.message());
        Ok(())
    }
}

fn log_report_summary(report: &serde_json::Value) {
    for summary in report::summarize(report) {
        for verdict in &summary.verdicts {
            match verdict {
                TestVerdict::Checked => {
                    debug!("execution `{}`: solution executed and checked", summary.name);
                }
                TestVerdict::ExecutionError => {
                    debug!("execution `{}`: solution returned an error", summary.name);
                }
                TestVerdict::Rejected => {
                    debug!("execution `{}`: test rejected by the sanitizer", summary.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grader_client::ClientError;
    use grader_core::AckResponse;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One scripted poll reply; the script ends with a fatal queue error so
    /// loops under test always terminate.
    enum Reply {
        Job(Job),
        Empty,
    }

    struct ScriptedQueue {
        replies: Mutex<VecDeque<Reply>>,
        polls: AtomicUsize,
        sent: Mutex<Vec<(i64, ResultEnvelope)>>,
    }

    impl ScriptedQueue {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                polls: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }

        fn sent(&self) -> Vec<(i64, ResultEnvelope)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueueApi for ScriptedQueue {
        async fn poll(&self) -> grader_client::Result<PollOutcome> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().unwrap().pop_front() {
                Some(Reply::Job(job)) => Ok(PollOutcome::Job(job)),
                Some(Reply::Empty) => Ok(PollOutcome::Empty),
                None => Err(ClientError::Queue("end of script".to_string())),
            }
        }

        async fn send_result(
            &self,
            job_id: i64,
            envelope: &ResultEnvelope,
        ) -> grader_client::Result<AckResponse> {
            self.sent.lock().unwrap().push((job_id, envelope.clone()));
            Ok(AckResponse {
                errorcode: 0,
                errormsg: Some("result saved".to_string()),
            })
        }
    }

    struct FixedBackend {
        outcome: ExecutionOutcome,
        payloads: Mutex<Vec<Value>>,
    }

    impl FixedBackend {
        fn report(report: Value) -> Self {
            Self {
                outcome: ExecutionOutcome::Report(report),
                payloads: Mutex::new(Vec::new()),
            }
        }

        fn failed(stdout: &str, stderr: &str) -> Self {
            Self {
                outcome: ExecutionOutcome::Failed {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExecutionBackend for &FixedBackend {
        async fn execute(&self, payload: &Value) -> ExecutionOutcome {
            self.payloads.lock().unwrap().push(payload.clone());
            self.outcome.clone()
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.poll_interval = Duration::from_millis(5);
        config.wakeup_tick = Duration::from_millis(5);
        config.env = GradingEnv {
            root_path: "/grader".to_string(),
            path_vars: [("home".to_string(), "/data".to_string())].into(),
            restrict_paths: vec!["/srv/x".to_string()],
        };
        config
    }

    fn job() -> Job {
        Job {
            id: 17,
            name: "contest/task1".to_string(),
            payload: json!({"restrictToPaths": ["$home/a"]})
                .as_object()
                .unwrap()
                .clone(),
        }
    }

    fn orchestrator<'a>(
        queue: Arc<ScriptedQueue>,
        backend: &'a FixedBackend,
        mode: WaitMode,
        wake: Arc<WakeSignal>,
    ) -> Orchestrator<ScriptedQueue, &'a FixedBackend> {
        Orchestrator::new(&test_config(), queue, backend, mode, wake)
    }

    #[tokio::test]
    async fn test_one_shot_exits_cleanly_on_empty_queue() {
        let queue = ScriptedQueue::new(vec![Reply::Empty]);
        let backend = FixedBackend::report(json!({}));
        let wake = Arc::new(WakeSignal::new());

        orchestrator(Arc::clone(&queue), &backend, WaitMode::OneShot, wake)
            .run()
            .await
            .unwrap();

        assert_eq!(queue.polls(), 1);
        assert!(queue.sent().is_empty());
        assert!(backend.payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_is_prepared_executed_and_reported() {
        let queue = ScriptedQueue::new(vec![Reply::Job(job()), Reply::Empty]);
        let report = json!({"executions": []});
        let backend = FixedBackend::report(report.clone());
        let wake = Arc::new(WakeSignal::new());

        orchestrator(Arc::clone(&queue), &backend, WaitMode::OneShot, wake)
            .run()
            .await
            .unwrap();

        let payloads = backend.payloads.lock().unwrap();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["rootPath"], json!("/grader"));
        assert_eq!(payloads[0]["restrictToPaths"], json!(["/data/a", "/srv/x"]));

        let sent = queue.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 17);
        assert_eq!(sent[0].1, ResultEnvelope::success(report));
    }

    #[tokio::test]
    async fn test_failed_execution_is_reported_and_loop_continues() {
        let queue = ScriptedQueue::new(vec![Reply::Job(job()), Reply::Empty]);
        let backend = FixedBackend::failed("not valid JSON", "boom");
        let wake = Arc::new(WakeSignal::new());

        orchestrator(Arc::clone(&queue), &backend, WaitMode::OneShot, wake)
            .run()
            .await
            .unwrap();

        let sent = queue.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1.errormsg.as_deref(),
            Some("stdout:\nnot valid JSON\nstderr:\nboom")
        );
        // the failure was recoverable: the loop polled again afterwards
        assert_eq!(queue.polls(), 2);
    }

    #[tokio::test]
    async fn test_continuous_mode_keeps_polling_until_fatal() {
        let queue = ScriptedQueue::new(vec![Reply::Empty, Reply::Empty]);
        let backend = FixedBackend::report(json!({}));
        let wake = Arc::new(WakeSignal::new());

        let err = orchestrator(Arc::clone(&queue), &backend, WaitMode::Continuous, wake)
            .run()
            .await
            .unwrap_err();

        // two empty polls, then the scripted fatal error
        assert_eq!(queue.polls(), 3);
        assert!(format!("{err:#}").contains("end of script"));
    }

    #[tokio::test]
    async fn test_listen_mode_blocks_until_wake() {
        let queue = ScriptedQueue::new(vec![Reply::Empty]);
        let wake = Arc::new(WakeSignal::new());

        let handle = {
            let queue = Arc::clone(&queue);
            let wake = Arc::clone(&wake);
            tokio::spawn(async move {
                let backend = FixedBackend::report(json!({}));
                Orchestrator::new(&test_config(), queue, &backend, WaitMode::Listen, wake)
                    .run()
                    .await
            })
        };

        time::sleep(Duration::from_millis(50)).await;
        // still blocked on the wake signal after the first empty poll
        assert_eq!(queue.polls(), 1);
        assert!(!handle.is_finished());

        wake.set();
        let err = time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wake should unblock the loop")
            .unwrap()
            .unwrap_err();

        // exactly one new poll followed the wake, hitting the end of script
        assert_eq!(queue.polls(), 2);
        assert!(format!("{err:#}").contains("end of script"));
        assert!(!wake.is_set());
    }

    #[tokio::test]
    async fn test_fatal_poll_error_sends_nothing() {
        // script is empty: the very first poll fails fatally
        let queue = ScriptedQueue::new(vec![]);
        let backend = FixedBackend::report(json!({}));
        let wake = Arc::new(WakeSignal::new());

        let result = orchestrator(Arc::clone(&queue), &backend, WaitMode::Continuous, wake)
            .run()
            .await;

        assert!(result.is_err());
        assert!(queue.sent().is_empty());
    }
}
