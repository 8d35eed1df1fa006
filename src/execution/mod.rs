//! Execution layer: launching, readiness and shutdown of the worker daemon
//!
//! # Features
//!
//! - **Detached launch**: re-run the current command in the background with
//!   output redirected to the environment log
//! - **Readiness**: poll the worker's `/pid` endpoint until it reports the
//!   launched PID
//! - **Shutdown**: interrupt a running worker and wait for it to go away
//!
//! # Examples
//!
//! ```ignore
//! use worker_env::execution::{launch_detached, LaunchSpec, PollPolicy, ReadinessPoller};
//!
//! let spec = LaunchSpec::new("/usr/local/bin/worker-ctl", args, "/srv/env/worker.out");
//! let child = launch_detached(&spec)?;
//! ReadinessPoller::new(PollPolicy::default())?.wait_for_child(&child, 5000)?;
//! ```

pub mod launcher;
pub mod readiness;
pub mod shutdown;

pub use launcher::{launch_detached, strip_detach_flags, ChildHandle, LaunchSpec, DETACH_FLAGS};
pub use readiness::{ReadinessPoller, StatusReply};
pub use shutdown::graceful_stop;

use std::time::Duration;

/// Bounded fixed-interval polling; `attempts * interval` is the whole budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    pub fn budget(&self) -> Duration {
        self.interval * self.attempts
    }
}

impl Default for PollPolicy {
    /// 300 attempts 100ms apart
    fn default() -> Self {
        Self::new(300, Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget_is_thirty_seconds() {
        let policy = PollPolicy::default();
        assert_eq!(policy.attempts, 300);
        assert_eq!(policy.budget(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_attempts() {
        assert_eq!(
            PollPolicy::new(0, Duration::from_millis(100)).budget(),
            Duration::ZERO
        );
    }
}
