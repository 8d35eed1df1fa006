//! Character device nodes inside the base image

use crate::errors::{Result, WorkerError};
use nix::sys::stat::{makedev, mknod, Mode, SFlag};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Device node permissions: rw for owner, read for group and others
pub const DEVICE_MODE: u32 = 0o644;

/// A character device created under `<image>/dev`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    pub name: &'static str,
    pub major: u64,
    pub minor: u64,
}

/// Nodes every sandbox needs
pub const BASE_DEVICES: [DeviceNode; 3] = [
    DeviceNode {
        name: "null",
        major: 1,
        minor: 3,
    },
    DeviceNode {
        name: "random",
        major: 1,
        minor: 8,
    },
    DeviceNode {
        name: "urandom",
        major: 1,
        minor: 9,
    },
];

impl DeviceNode {
    /// Create the node in `dev_dir` with [`DEVICE_MODE`] regardless of umask
    pub fn create_in(&self, dev_dir: &Path) -> Result<()> {
        let path = dev_dir.join(self.name);
        mknod(
            &path,
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(DEVICE_MODE),
            makedev(self.major, self.minor),
        )
        .map_err(|source| WorkerError::DeviceNode {
            path: path.clone(),
            source,
        })?;

        fs::set_permissions(&path, fs::Permissions::from_mode(DEVICE_MODE))?;
        Ok(())
    }
}
