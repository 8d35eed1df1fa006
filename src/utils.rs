//! Utility functions for worker process bookkeeping

use crate::errors::{Result, WorkerError};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::Path;

/// Check if running as root
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Probe a process with signal 0.
///
/// Any probe failure, including `EPERM`, counts as "not alive": this is the
/// check the shutdown loop relies on to decide that a worker has exited.
pub fn process_exists(pid: Pid) -> bool {
    kill(pid, None).is_ok()
}

/// Like [`process_exists`] but keeps the errno for diagnostics
pub fn probe_process(pid: Pid) -> std::result::Result<(), Errno> {
    kill(pid, None)
}

/// Read a PID file written by the worker daemon
pub fn read_pid_file(path: &Path) -> Result<Pid> {
    let content = fs::read_to_string(path)?;

    let pid: i32 = content
        .trim()
        .parse()
        .map_err(|e| WorkerError::InvalidPidFile {
            path: path.to_path_buf(),
            reason: format!("{:?} is not a PID: {}", content.trim(), e),
        })?;

    if pid <= 0 {
        return Err(WorkerError::InvalidPidFile {
            path: path.to_path_buf(),
            reason: format!("{} is not a positive PID", pid),
        });
    }

    Ok(Pid::from_raw(pid))
}

/// Write a PID file the way the worker daemon does (decimal, no newline)
pub fn write_pid_file(path: &Path, pid: Pid) -> Result<()> {
    fs::write(path, pid.as_raw().to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_is_root_matches_euid() {
        assert_eq!(is_root(), unsafe { libc::geteuid() } == 0);
    }

    #[test]
    fn test_current_process_exists() {
        let me = Pid::from_raw(std::process::id() as i32);
        assert!(process_exists(me));
        assert!(probe_process(me).is_ok());
    }

    #[test]
    fn test_reaped_child_does_not_exist() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();
        assert_eq!(probe_process(pid), Err(Errno::ESRCH));
        assert!(!process_exists(pid));
    }

    #[test]
    fn test_pid_file_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("worker.pid");
        write_pid_file(&path, Pid::from_raw(4242)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242");
        assert_eq!(read_pid_file(&path).unwrap(), Pid::from_raw(4242));
    }

    #[test]
    fn test_read_pid_file_trims_whitespace() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("worker.pid");
        fs::write(&path, "  777\n").unwrap();
        assert_eq!(read_pid_file(&path).unwrap(), Pid::from_raw(777));
    }

    #[test]
    fn test_read_pid_file_rejects_garbage() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("worker.pid");

        fs::write(&path, "not-a-pid").unwrap();
        assert!(matches!(
            read_pid_file(&path),
            Err(WorkerError::InvalidPidFile { .. })
        ));

        fs::write(&path, "0").unwrap();
        assert!(matches!(
            read_pid_file(&path),
            Err(WorkerError::InvalidPidFile { .. })
        ));
    }

    #[test]
    fn test_read_pid_file_missing() {
        let tmp = tempdir().unwrap();
        let err = read_pid_file(&tmp.path().join("missing.pid")).unwrap_err();
        assert!(matches!(err, WorkerError::Io(_)));
    }
}
