//! Worker environment: on-disk layout and one-time initialization
//!
//! An environment is a directory owning the worker configuration, the worker
//! data and registry directories and a base filesystem image. It is created
//! once by [`Environment::init`] and never removed automatically.
//!
//! # Layout
//!
//! ```text
//! <root>/config.json
//! <root>/config.json.overrides   (optional, authoritative when present)
//! <root>/worker.out              (log of a detached worker)
//! <worker_dir>/worker.pid
//! <base_image>/{handler,host,packages,etc/resolv.conf,dev/*}
//! ```

pub mod devices;

use crate::config::{WorkerConfig, CONFIG_FILE};
use crate::errors::{Result, WorkerError};
use crate::image::ImageExporter;
use devices::BASE_DEVICES;
use log::{debug, info};
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Resolver written into the base image; container images often ship none
pub const RESOLV_CONF: &str = "nameserver 8.8.8.8\n";

/// Subdirectories sandboxes bind-mount into
pub const IMAGE_SUBDIRS: [&str; 3] = ["handler", "host", "packages"];

const OVERRIDES_SUFFIX: &str = ".overrides";
const LOG_FILE: &str = "worker.out";

/// A worker environment rooted at a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    root: PathBuf,
}

impl Environment {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    /// Final path component, used to name the sandbox cgroup tree
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "worker".to_string())
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn overrides_path(&self) -> PathBuf {
        self.root.join(format!("{}{}", CONFIG_FILE, OVERRIDES_SUFFIX))
    }

    /// The overrides file when present, the base config otherwise
    pub fn active_config_path(&self) -> PathBuf {
        let overrides = self.overrides_path();
        if overrides.exists() {
            overrides
        } else {
            self.config_path()
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    /// Worker directory used when no config can be read
    pub fn default_worker_dir(&self) -> PathBuf {
        self.root.join("worker")
    }

    pub fn load_config(&self) -> Result<WorkerConfig> {
        let path = self.active_config_path();
        debug!("Loading worker config from {}", path.display());
        WorkerConfig::load(&path)
    }

    /// Create a fresh environment.
    ///
    /// Steps run strictly in order and the first failure is returned as is.
    /// Nothing created by earlier steps is rolled back.
    pub fn init(&self, image: &str, exporter: &dyn ImageExporter) -> Result<WorkerConfig> {
        if self.exists() {
            return Err(WorkerError::EnvironmentExists(self.root.clone()));
        }

        info!(
            "Init worker environment at {}, using image {} as base",
            self.root.display(),
            image
        );
        private_dir(&self.root)?;

        let config = WorkerConfig::defaults(&self.root);
        config.save(&self.config_path())?;

        private_dir(&config.worker_dir)?;
        private_dir(&config.registry)?;

        let base = &config.base_image;
        info!("Creating base image at {} (may take several minutes)", base.display());
        exporter.export(image, base)?;

        for sub in IMAGE_SUBDIRS {
            private_dir(&base.join(sub))?;
        }

        fs::write(base.join("etc").join("resolv.conf"), RESOLV_CONF)?;

        let dev = base.join("dev");
        for node in BASE_DEVICES.iter() {
            node.create_in(&dev)?;
        }

        info!("Worker environment ready at {}", self.root.display());
        Ok(config)
    }
}

fn private_dir(path: &Path) -> Result<()> {
    DirBuilder::new().mode(0o700).create(path)?;
    Ok(())
}
