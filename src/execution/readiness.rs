//! Readiness and identity checks against the worker's HTTP surface

use super::launcher::ChildHandle;
use super::PollPolicy;
use crate::errors::{Result, WorkerError};
use log::{debug, info};
use nix::unistd::Pid;
use reqwest::blocking::Client;
use std::io;
use std::process::ExitStatus;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Liveness endpoint; the body is informational
pub const STATUS_PATH: &str = "/status";
/// Identity endpoint; the body is the daemon's decimal PID
pub const PID_PATH: &str = "/pid";

const WORKER_HOST: &str = "127.0.0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Response of the liveness endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    pub url: String,
    pub status_line: String,
    pub body: String,
}

/// Polls a worker until it answers with the expected identity
pub struct ReadinessPoller {
    policy: PollPolicy,
    client: Client,
}

impl ReadinessPoller {
    pub fn new(policy: PollPolicy) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { policy, client })
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{}{}", WORKER_HOST, port, path)
    }

    /// Wait for a launched child to become ready
    pub fn wait_for_child(&self, child: &ChildHandle, port: u16) -> Result<()> {
        self.wait_ready(child.pid(), port, child.exit_signal())
    }

    /// Poll `/pid` on `port` until it reports `pid`.
    ///
    /// The exit channel is the only authority on whether the process died.
    /// Connection failures are retried until the policy is exhausted; a PID
    /// mismatch or an unparseable body fails immediately. The policy budget
    /// is a hard deadline: each request may only use what is left of it.
    pub fn wait_ready(
        &self,
        pid: Pid,
        port: u16,
        exited: &Receiver<io::Result<ExitStatus>>,
    ) -> Result<()> {
        let url = self.url(port, PID_PATH);
        let start = Instant::now();
        let deadline = start + self.policy.budget();
        let mut last_error: Option<String> = None;

        for attempt in 1..=self.policy.attempts {
            check_exited(pid, exited)?;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let response = match self
                .client
                .get(&url)
                .timeout(remaining.min(REQUEST_TIMEOUT))
                .send()
            {
                Ok(response) => response,
                Err(e) => {
                    debug!("Attempt {}: {} not reachable: {}", attempt, url, e);
                    last_error = Some(e.to_string());
                    let left = deadline.saturating_duration_since(Instant::now());
                    thread::sleep(self.policy.interval.min(left));
                    continue;
                }
            };

            let body = response
                .text()
                .map_err(|e| WorkerError::InvalidPidResponse(e.to_string()))?;
            let found: i32 = body.trim().parse().map_err(|e| {
                WorkerError::InvalidPidResponse(format!("{:?}: {}", body.trim(), e))
            })?;

            if found != pid.as_raw() {
                return Err(WorkerError::PidMismatch {
                    expected: pid.as_raw(),
                    found,
                });
            }

            info!("Worker {} ready on port {} after {} attempt(s)", pid, port, attempt);
            return Ok(());
        }

        Err(WorkerError::ReadinessTimeout {
            port,
            waited_ms: start.elapsed().as_millis(),
            last_error,
        })
    }

    /// One-shot liveness probe
    pub fn status(&self, port: u16) -> Result<StatusReply> {
        let url = self.url(port, STATUS_PATH);
        let response = self.client.get(&url).send()?;
        let status = response.status();
        let status_line = match status.canonical_reason() {
            Some(reason) => format!("{} {}", status.as_u16(), reason),
            None => status.as_u16().to_string(),
        };
        let body = response.text()?;
        Ok(StatusReply {
            url,
            status_line,
            body,
        })
    }
}

fn check_exited(pid: Pid, exited: &Receiver<io::Result<ExitStatus>>) -> Result<()> {
    let reason = match exited.try_recv() {
        Err(TryRecvError::Empty) => return Ok(()),
        Ok(Ok(status)) => format!("exited with {}", status),
        Ok(Err(e)) => e.to_string(),
        Err(TryRecvError::Disconnected) => "exit watcher went away".to_string(),
    };
    Err(WorkerError::WorkerExited {
        pid: pid.as_raw(),
        reason,
    })
}
