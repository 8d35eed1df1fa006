//! Error types for worker lifecycle operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for worker lifecycle operations
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors that can occur while preparing, launching or stopping a worker
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not parse key=val: '{0}'")]
    InvalidOverride(String),

    #[error("key '{0}' not found")]
    KeyNotFound(String),

    #[error("{key} refers to a {found}, not a map")]
    NotAMap { key: String, found: &'static str },

    #[error("invalid option: '{0}'")]
    UnknownOption(String),

    #[error("'{value}' for {key} is not a valid integer: {source}")]
    InvalidInteger {
        key: String,
        value: String,
        source: std::num::ParseIntError,
    },

    #[error("'{value}' for {key} is not a valid boolean value")]
    InvalidBoolean { key: String, value: String },

    #[error("config values of type {kind} ({key}) must be edited manually in the config file")]
    ManualEditRequired { key: String, kind: &'static str },

    #[error("environment already exists at {}", .0.display())]
    EnvironmentExists(PathBuf),

    #[error("Image export error: {0}")]
    ImageExport(String),

    #[error("Failed to create device node {}: {source}", .path.display())]
    DeviceNode { path: PathBuf, source: nix::Error },

    #[error("Failed to start worker process: {0}")]
    Spawn(String),

    #[error("Failed to signal process {pid}: {source}")]
    Signal { pid: i32, source: nix::Error },

    #[error("Invalid PID file {}: {reason}", .path.display())]
    InvalidPidFile { path: PathBuf, reason: String },

    #[error("worker process {pid} does not appear to be running ({reason}), check the worker log")]
    WorkerExited { pid: i32, reason: String },

    #[error("/pid did not return an int: {0}")]
    InvalidPidResponse(String),

    #[error("expected PID {expected} but found {found} (port conflict?)")]
    PidMismatch { expected: i32, found: i32 },

    #[error("worker still not reachable on port {port} after {waited_ms}ms{}", last_error_suffix(.last_error))]
    ReadinessTimeout {
        port: u16,
        waited_ms: u128,
        last_error: Option<String>,
    },

    #[error("worker {pid} didn't stop after {waited_ms}ms, may require manual cleanup")]
    ShutdownTimeout { pid: i32, waited_ms: u128 },
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" :: {}", e),
        None => String::new(),
    }
}
