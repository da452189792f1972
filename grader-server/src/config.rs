//! Worker configuration
//!
//! One immutable configuration value, resolved from the environment at
//! startup and passed into each component.

use grader_client::Endpoints;
use grader_core::GradingEnv;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
///
/// Intervals are configurable so the wait policy's responsiveness can be
/// tuned per deployment instead of being a hardcoded one-second literal.
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue endpoint polled for new jobs
    pub poll_url: String,

    /// Queue endpoint results are posted to
    pub send_url: String,

    /// Queue endpoint probed by `--test`
    pub test_url: String,

    /// Grading tool command line (program followed by arguments)
    pub grader_command: Vec<String>,

    /// Local grading environment merged into every job payload
    pub env: GradingEnv,

    /// UDP bind address for the wake-up listener
    pub wakeup_addr: String,

    /// Token a wake-up datagram must carry to be accepted
    pub wakeup_token: String,

    /// Sleep between polls in continuous mode
    pub poll_interval: Duration,

    /// Re-check cadence while blocked on the wake-up signal in listen mode
    pub wakeup_tick: Duration,

    /// Maximum time one grading run may take; unlimited when unset
    pub job_timeout: Option<Duration>,

    /// Timeout applied to every HTTPS exchange; unlimited when unset
    pub http_timeout: Option<Duration>,

    /// TLS credentials for the queue connection
    pub tls: TlsSettings,

    /// PID file claimed in server mode
    pub pidfile: PathBuf,
}

/// Paths to the PEM credentials presented to the queue.
#[derive(Debug, Clone, Default)]
pub struct TlsSettings {
    /// Client certificate; requires `key`
    pub cert: Option<PathBuf>,
    /// Client private key; requires `cert`
    pub key: Option<PathBuf>,
    /// CA bundle the queue's certificate is checked against
    pub ca: Option<PathBuf>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Required:
    /// - GRADER_QUEUE_POLL_URL, GRADER_QUEUE_SEND_URL, GRADER_QUEUE_TEST_URL
    /// - GRADER_COMMAND (whitespace-split command line)
    ///
    /// Optional:
    /// - GRADER_ROOT_PATH (default "/")
    /// - GRADER_RESTRICT_PATHS (colon-separated)
    /// - GRADER_PATH_VARS (comma-separated name=value pairs)
    /// - GRADER_WAKEUP_ADDR (default "0.0.0.0:8998"), GRADER_WAKEUP_TOKEN
    /// - GRADER_POLL_INTERVAL, GRADER_WAKEUP_TICK (seconds, default 1)
    /// - GRADER_JOB_TIMEOUT, GRADER_HTTP_TIMEOUT (seconds, unset = unlimited)
    /// - GRADER_TLS_CERT, GRADER_TLS_KEY, GRADER_TLS_CA (PEM paths)
    /// - GRADER_PIDFILE (default "/var/run/grader-server.pid")
    pub fn from_env() -> anyhow::Result<Self> {
        let poll_url = require_env("GRADER_QUEUE_POLL_URL")?;
        let send_url = require_env("GRADER_QUEUE_SEND_URL")?;
        let test_url = require_env("GRADER_QUEUE_TEST_URL")?;
        let grader_command = split_command(&require_env("GRADER_COMMAND")?);

        let env = GradingEnv {
            root_path: env_var("GRADER_ROOT_PATH").unwrap_or_else(|| "/".to_string()),
            path_vars: env_var("GRADER_PATH_VARS")
                .map(|raw| parse_vars(&raw))
                .unwrap_or_default(),
            restrict_paths: env_var("GRADER_RESTRICT_PATHS")
                .map(|raw| parse_paths(&raw))
                .unwrap_or_default(),
        };

        Ok(Self {
            poll_url,
            send_url,
            test_url,
            grader_command,
            env,
            wakeup_addr: env_var("GRADER_WAKEUP_ADDR")
                .unwrap_or_else(|| "0.0.0.0:8998".to_string()),
            wakeup_token: env_var("GRADER_WAKEUP_TOKEN").unwrap_or_else(|| "wakeup".to_string()),
            poll_interval: env_seconds("GRADER_POLL_INTERVAL").unwrap_or(Duration::from_secs(1)),
            wakeup_tick: env_seconds("GRADER_WAKEUP_TICK").unwrap_or(Duration::from_secs(1)),
            job_timeout: env_seconds("GRADER_JOB_TIMEOUT"),
            http_timeout: env_seconds("GRADER_HTTP_TIMEOUT"),
            tls: TlsSettings {
                cert: env_var("GRADER_TLS_CERT").map(PathBuf::from),
                key: env_var("GRADER_TLS_KEY").map(PathBuf::from),
                ca: env_var("GRADER_TLS_CA").map(PathBuf::from),
            },
            pidfile: env_var("GRADER_PIDFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/run/grader-server.pid")),
        })
    }

    /// The queue endpoints as the client crate expects them
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            poll_url: self.poll_url.clone(),
            send_url: self.send_url.clone(),
            test_url: self.test_url.clone(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for url in [&self.poll_url, &self.send_url, &self.test_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("queue URL `{url}` must start with http:// or https://");
            }
        }

        if self.grader_command.is_empty() {
            anyhow::bail!("grader command cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.wakeup_tick.is_zero() {
            anyhow::bail!("wakeup_tick must be greater than 0");
        }

        if self.tls.cert.is_some() != self.tls.key.is_some() {
            anyhow::bail!("TLS client certificate and key must be configured together");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_url: "https://localhost/graderqueue/poll".to_string(),
            send_url: "https://localhost/graderqueue/send".to_string(),
            test_url: "https://localhost/graderqueue/test".to_string(),
            grader_command: vec!["taskgrader".to_string()],
            env: GradingEnv {
                root_path: "/".to_string(),
                path_vars: HashMap::new(),
                restrict_paths: Vec::new(),
            },
            wakeup_addr: "0.0.0.0:8998".to_string(),
            wakeup_token: "wakeup".to_string(),
            poll_interval: Duration::from_secs(1),
            wakeup_tick: Duration::from_secs(1),
            job_timeout: None,
            http_timeout: None,
            tls: TlsSettings::default(),
            pidfile: PathBuf::from("/var/run/grader-server.pid"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn require_env(name: &str) -> anyhow::Result<String> {
    env_var(name).ok_or_else(|| anyhow::anyhow!("{name} environment variable not set"))
}

fn env_seconds(name: &str) -> Option<Duration> {
    env_var(name)?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Parses `name=value` pairs separated by commas.
fn parse_vars(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Parses a colon-separated path list, skipping empty entries.
fn parse_paths(raw: &str) -> Vec<String> {
    raw.split(':')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}
