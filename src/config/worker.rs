//! Typed worker configuration and its defaults

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the base configuration file inside an environment
pub const CONFIG_FILE: &str = "config.json";

/// Default listening port of the worker daemon
pub const DEFAULT_WORKER_PORT: u16 = 5000;

/// Resource limits handed to each sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub procs: u32,
    pub mem_mb: u32,
    pub cpu_percent: u32,
    pub max_runtime_default: u32,
    pub installer_mem_mb: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            procs: 10,
            mem_mb: 50,
            cpu_percent: 100,
            max_runtime_default: 30,
            installer_mem_mb: 500,
        }
    }
}

/// Optional worker behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub reuse_cgroups: bool,
    pub import_cache: String,
    pub downsize_paused_mem: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            reuse_cgroups: false,
            import_cache: "tree".to_string(),
            downsize_paused_mem: true,
        }
    }
}

/// Worker configuration as persisted in `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Port the worker daemon listens on
    pub worker_port: u16,
    /// Worker runtime data (PID file, sandbox roots)
    pub worker_dir: PathBuf,
    /// Handler registry
    pub registry: PathBuf,
    /// Extracted base filesystem shared by sandboxes
    pub base_image: PathBuf,
    pub server_mode: String,
    pub log_output: bool,
    pub mem_pool_mb: u32,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub features: Features,
}

impl WorkerConfig {
    /// Default configuration for an environment rooted at `env_root`
    pub fn defaults(env_root: &Path) -> Self {
        Self {
            worker_port: DEFAULT_WORKER_PORT,
            worker_dir: env_root.join("worker"),
            registry: env_root.join("registry"),
            base_image: env_root.join("base"),
            server_mode: "lambda".to_string(),
            log_output: true,
            mem_pool_mb: 1024,
            limits: Limits::default(),
            features: Features::default(),
        }
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save with the same tab-indented layout the override engine produces
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        out.push(b'\n');
        fs::write(path, out)?;
        Ok(())
    }

    /// Human-readable dump for the CLI
    pub fn dump(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// PID file the worker daemon maintains
    pub fn pid_file(&self) -> PathBuf {
        self.worker_dir.join("worker.pid")
    }

    /// Directory holding per-sandbox root mounts
    pub fn root_sandboxes_dir(&self) -> PathBuf {
        self.worker_dir.join("root-sandboxes")
    }
}
