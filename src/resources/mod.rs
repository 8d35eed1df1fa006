//! Kernel resources owned by a worker: sandbox cgroups and mounts

pub mod cleanup;

pub use cleanup::{
    force_cleanup, CleanupAction, CleanupEntry, CleanupOutcome, CleanupReport, CleanupTargets,
    CGROUP_ROOT_ENV,
};
