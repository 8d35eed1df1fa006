//! Detached launch of the worker daemon

use crate::errors::{Result, WorkerError};
use log::{debug, info, warn};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// Flags that ask for a background launch; stripped from the child's argv
pub const DETACH_FLAGS: [&str; 2] = ["-d", "--detach"];

/// What to launch and where its output goes
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub log_path: PathBuf,
    /// Run the child in a private mount namespace so the worker's many
    /// mounts never show up in the host's mount table
    pub mount_namespace: bool,
}

impl LaunchSpec {
    pub fn new(program: impl AsRef<Path>, args: Vec<OsString>, log_path: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args,
            log_path: log_path.as_ref().to_path_buf(),
            mount_namespace: true,
        }
    }

    /// Re-run the current command line in the foreground.
    ///
    /// `argv` is the full invocation including `argv[0]`, which is replaced by
    /// `program`. Detach flags are removed.
    pub fn from_invocation<I>(program: impl AsRef<Path>, argv: I, log_path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::new(program, strip_detach_flags(argv.into_iter().skip(1)), log_path)
    }

    pub fn mount_namespace(mut self, enabled: bool) -> Self {
        self.mount_namespace = enabled;
        self
    }
}

/// Drop `-d`/`--detach` from an argument list
pub fn strip_detach_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .filter(|arg| !DETACH_FLAGS.iter().any(|flag| arg.as_os_str() == *flag))
        .collect()
}

/// A launched worker: its PID plus a one-shot exit notification
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
    log_path: PathBuf,
    exited: Receiver<io::Result<ExitStatus>>,
}

impl ChildHandle {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Exit channel written once by the watcher thread
    pub fn exit_signal(&self) -> &Receiver<io::Result<ExitStatus>> {
        &self.exited
    }

    /// Block until the child exits
    pub fn wait(self) -> io::Result<ExitStatus> {
        self.exited
            .recv()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "exit watcher went away")))
    }
}

/// Start the worker in the background and return immediately.
///
/// stdout and stderr of the child go to `spec.log_path` (truncated), stdin is
/// `/dev/null`. A watcher thread reaps the child and reports its exit.
pub fn launch_detached(spec: &LaunchSpec) -> Result<ChildHandle> {
    let log = File::create(&spec.log_path)?;
    let log_err = log.try_clone()?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));

    if spec.mount_namespace {
        // SAFETY: unshare(2) is async-signal-safe and touches only the child
        unsafe {
            command.pre_exec(|| unshare(CloneFlags::CLONE_NEWNS).map_err(io::Error::from));
        }
    }

    info!(
        "Starting process: program={} args={:?}",
        spec.program.display(),
        spec.args
    );
    let mut child = command.spawn().map_err(|e| {
        WorkerError::Spawn(format!("{}: {}", spec.program.display(), e))
    })?;

    let pid = Pid::from_raw(child.id() as i32);
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name(format!("worker-watch-{}", pid))
        .spawn(move || {
            let result = child.wait();
            match &result {
                Ok(status) => debug!("Worker {} exited: {}", pid, status),
                Err(e) => warn!("Waiting on worker {} failed: {}", pid, e),
            }
            // The receiver may already be gone once readiness is settled
            let _ = tx.send(result);
        })?;

    Ok(ChildHandle {
        pid,
        log_path: spec.log_path.clone(),
        exited: rx,
    })
}
