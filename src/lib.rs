//! worker-env: lifecycle manager for a sandboxing worker daemon
//!
//! Prepares an on-disk worker environment from a container image, starts the
//! worker in the foreground or detached, confirms it is the process answering
//! on its port, stops it and tears down whatever kernel resources a crashed
//! worker left behind.
//!
//! # Modules
//!
//! - **config**: worker configuration and `key=value` overrides
//! - **environment**: environment layout and one-time initialization
//! - **image**: base image extraction
//! - **execution**: detached launch, readiness polling, graceful shutdown
//! - **resources**: forced cleanup of cgroups and mounts
//! - **server**: the worker's HTTP surface
//!
//! # Example
//!
//! ```ignore
//! use worker_env::{Environment, PollPolicy, graceful_stop, utils};
//!
//! let env = Environment::new("/srv/default-worker");
//! let config = env.load_config()?;
//! let pid = utils::read_pid_file(&config.pid_file())?;
//! graceful_stop(pid, PollPolicy::default())?;
//! ```

// Core modules
pub mod errors;
pub mod utils;

pub mod config;
pub mod environment;
pub mod execution;
pub mod image;
pub mod resources;
pub mod server;

// Public API
pub use config::{apply_overrides, ConfigValue, WorkerConfig};
pub use environment::Environment;
pub use errors::{Result, WorkerError};
pub use execution::{
    graceful_stop, launch_detached, ChildHandle, LaunchSpec, PollPolicy, ReadinessPoller,
};
pub use image::{DockerExporter, ImageExporter, DEFAULT_BASE_IMAGE};
pub use resources::{force_cleanup, CleanupReport, CleanupTargets};
pub use server::WorkerServer;
