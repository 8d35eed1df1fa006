//! Graceful stop of a running worker

use super::PollPolicy;
use crate::errors::{Result, WorkerError};
use crate::utils;
use log::{info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::thread;

/// Interrupt `pid` once and wait for it to disappear.
///
/// Failing to find or signal the process is logged and polling proceeds
/// anyway; only a process that outlives the whole policy is an error.
pub fn graceful_stop(pid: Pid, policy: PollPolicy) -> Result<()> {
    info!("Stopping worker process with PID {}", pid);

    if let Err(e) = utils::probe_process(pid) {
        warn!(
            "Failed to find worker process with PID {}: {}. May require manual cleanup.",
            pid, e
        );
    }

    if let Err(source) = kill(pid, Signal::SIGINT) {
        let err = WorkerError::Signal {
            pid: pid.as_raw(),
            source,
        };
        warn!("{}. May require manual cleanup.", err);
    }

    for _ in 0..policy.attempts {
        if !utils::process_exists(pid) {
            info!("Worker process {} stopped", pid);
            return Ok(());
        }
        thread::sleep(policy.interval);
    }

    Err(WorkerError::ShutdownTimeout {
        pid: pid.as_raw(),
        waited_ms: policy.budget().as_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{signal, SigHandler};
    use std::os::unix::process::CommandExt;
    use std::process::{Child, Command};
    use std::time::Duration;

    /// Spawn `sleep` and reap it in the background so it never lingers as a
    /// zombie that still answers signal 0
    fn spawn_reaped(ignore_sigint: bool) -> Pid {
        let mut command = Command::new("sleep");
        command.arg("30");
        if ignore_sigint {
            // SAFETY: signal(2) is async-signal-safe; an ignored disposition
            // survives exec
            unsafe {
                command.pre_exec(|| {
                    signal(Signal::SIGINT, SigHandler::SigIgn)
                        .map(|_| ())
                        .map_err(std::io::Error::from)
                });
            }
        }
        let mut child: Child = command.spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        thread::spawn(move || {
            let _ = child.wait();
        });
        pid
    }

    #[test]
    fn test_stops_cooperative_process() {
        let pid = spawn_reaped(false);
        graceful_stop(pid, PollPolicy::new(100, Duration::from_millis(50))).unwrap();
        assert!(!utils::process_exists(pid));
    }

    #[test]
    fn test_timeout_when_interrupt_is_ignored() {
        let pid = spawn_reaped(true);

        let err = graceful_stop(pid, PollPolicy::new(5, Duration::from_millis(20))).unwrap_err();
        match err {
            WorkerError::ShutdownTimeout { pid: p, waited_ms } => {
                assert_eq!(p, pid.as_raw());
                assert_eq!(waited_ms, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(utils::process_exists(pid));

        kill(pid, Signal::SIGKILL).unwrap();
    }

    #[test]
    fn test_missing_process_counts_as_stopped() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();

        graceful_stop(pid, PollPolicy::new(3, Duration::from_millis(10))).unwrap();
    }
}
