//! Best-effort teardown of kernel resources left behind by a dead worker
//!
//! Every step is attempted regardless of what happened before it and its
//! outcome is recorded in a [`CleanupReport`]. Running the cleanup twice is
//! harmless: the second run only finds nothing to do.

use crate::environment::Environment;
use log::{info, warn};
use nix::errno::Errno;
use nix::mount::{umount2, MntFlags};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Overrides the cgroup v2 mount point, mainly for tests
pub const CGROUP_ROOT_ENV: &str = "WORKER_CGROUP_ROOT";

const CGROUP_V2_ROOT: &str = "/sys/fs/cgroup";
const CGROUP_CHILD_PREFIX: &str = "cg-";
const CGROUP_KILL_FILE: &str = "cgroup.kill";
const MOUNT_DIR: &str = "root-sandboxes";

fn cgroup_fs_root() -> PathBuf {
    std::env::var(CGROUP_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(CGROUP_V2_ROOT))
}

/// Where a worker environment keeps its kernel resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupTargets {
    pub cgroup_root: PathBuf,
    pub mount_dir: PathBuf,
    pub pid_file: PathBuf,
}

impl CleanupTargets {
    /// Resolve targets for `env`, falling back to the default worker
    /// directory when the config is unreadable
    pub fn for_environment(env: &Environment) -> Self {
        let worker_dir = match env.load_config() {
            Ok(config) => config.worker_dir,
            Err(e) => {
                warn!(
                    "Could not load config for {}: {}. Using default worker directory.",
                    env.root().display(),
                    e
                );
                env.default_worker_dir()
            }
        };

        Self {
            cgroup_root: cgroup_fs_root().join(format!("{}-sandboxes", env.name())),
            mount_dir: worker_dir.join(MOUNT_DIR),
            pid_file: worker_dir.join("worker.pid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    ListCgroups,
    KillCgroup,
    RemoveCgroup,
    ListMounts,
    Unmount,
    RemoveMountDir,
    RemovePidFile,
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanupAction::ListCgroups => "list cgroups",
            CleanupAction::KillCgroup => "kill cgroup",
            CleanupAction::RemoveCgroup => "remove cgroup",
            CleanupAction::ListMounts => "list mounts",
            CleanupAction::Unmount => "unmount",
            CleanupAction::RemoveMountDir => "remove mount dir",
            CleanupAction::RemovePidFile => "remove pid file",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Done,
    /// Target was already gone (or, for unmount, not mounted)
    NotFound,
    Failed(String),
}

impl CleanupOutcome {
    fn from_io(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => CleanupOutcome::Done,
            Err(e) if e.kind() == io::ErrorKind::NotFound => CleanupOutcome::NotFound,
            Err(e) => CleanupOutcome::Failed(e.to_string()),
        }
    }

    fn from_unmount(result: nix::Result<()>) -> Self {
        match result {
            Ok(()) => CleanupOutcome::Done,
            Err(Errno::ENOENT) | Err(Errno::EINVAL) => CleanupOutcome::NotFound,
            Err(e) => CleanupOutcome::Failed(e.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CleanupOutcome::Failed(_))
    }
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Done => f.write_str("done"),
            CleanupOutcome::NotFound => f.write_str("not found"),
            CleanupOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupEntry {
    pub action: CleanupAction,
    pub target: PathBuf,
    pub outcome: CleanupOutcome,
}

/// Ordered record of every attempted cleanup step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    entries: Vec<CleanupEntry>,
}

impl CleanupReport {
    pub fn entries(&self) -> &[CleanupEntry] {
        &self.entries
    }

    pub fn failures(&self) -> impl Iterator<Item = &CleanupEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }

    /// True when nothing failed; missing targets count as clean
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    fn record(&mut self, action: CleanupAction, target: &Path, outcome: CleanupOutcome) {
        match &outcome {
            CleanupOutcome::Failed(reason) => {
                warn!("Could not {} {}: {}", action, target.display(), reason)
            }
            CleanupOutcome::NotFound => {
                warn!("Could not {} {}: not found", action, target.display())
            }
            CleanupOutcome::Done => info!("{} {}: done", action, target.display()),
        }
        self.entries.push(CleanupEntry {
            action,
            target: target.to_path_buf(),
            outcome,
        });
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{:<16} {} => {}",
                entry.action.to_string(),
                entry.target.display(),
                entry.outcome
            )?;
        }
        Ok(())
    }
}

/// Kill and remove sandbox cgroups, detach sandbox mounts and drop the PID
/// file. Never fails; inspect the report instead.
pub fn force_cleanup(targets: &CleanupTargets) -> CleanupReport {
    let mut report = CleanupReport::default();

    info!("Cleaning up cgroups at {}", targets.cgroup_root.display());
    cleanup_cgroups(&targets.cgroup_root, &mut report);

    info!("Cleaning up mounts at {}", targets.mount_dir.display());
    cleanup_mounts(&targets.mount_dir, &mut report);

    report.record(
        CleanupAction::RemovePidFile,
        &targets.pid_file,
        CleanupOutcome::from_io(fs::remove_file(&targets.pid_file)),
    );

    report
}

fn cleanup_cgroups(root: &Path, report: &mut CleanupReport) {
    let children = match list_dir(root) {
        Ok(children) => children,
        Err(e) => {
            report.record(CleanupAction::ListCgroups, root, CleanupOutcome::from_io(Err(e)));
            return;
        }
    };

    let kill = root.join(CGROUP_KILL_FILE);
    report.record(
        CleanupAction::KillCgroup,
        &kill,
        CleanupOutcome::from_io(write_existing(&kill, "1")),
    );

    for child in children {
        let is_sandbox = child
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(CGROUP_CHILD_PREFIX))
            .unwrap_or(false);
        if is_sandbox {
            report.record(
                CleanupAction::RemoveCgroup,
                &child,
                CleanupOutcome::from_io(fs::remove_dir(&child)),
            );
        }
    }

    report.record(
        CleanupAction::RemoveCgroup,
        root,
        CleanupOutcome::from_io(fs::remove_dir(root)),
    );
}

fn cleanup_mounts(dir: &Path, report: &mut CleanupReport) {
    match list_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                report.record(
                    CleanupAction::Unmount,
                    &entry,
                    CleanupOutcome::from_unmount(umount2(&entry, MntFlags::MNT_DETACH)),
                );
                report.record(
                    CleanupAction::RemoveMountDir,
                    &entry,
                    CleanupOutcome::from_io(fs::remove_dir(&entry)),
                );
            }
        }
        Err(e) => report.record(CleanupAction::ListMounts, dir, CleanupOutcome::from_io(Err(e))),
    }

    // The sandbox root itself may be a bind mount
    report.record(
        CleanupAction::Unmount,
        dir,
        CleanupOutcome::from_unmount(umount2(dir, MntFlags::MNT_DETACH)),
    );
}

fn list_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        paths.push(entry?.path());
    }
    paths.sort();
    Ok(paths)
}

/// Write to a file that must already exist (cgroup control files)
fn write_existing(path: &Path, content: &str) -> io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).open(path)?;
    write!(file, "{}", content)
}
