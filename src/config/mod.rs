//! Configuration layer: typed worker config and command-line overrides
//!
//! - **worker**: `WorkerConfig`, the defaults provider and load/save
//! - **value**: `ConfigValue`, a tagged JSON tree used to patch configs
//! - **overrides**: dotted `key=value` overrides with type coercion

pub mod overrides;
pub mod value;
pub mod worker;

pub use overrides::{apply_overrides, parse_overrides, Override};
pub use value::{ConfigValue, ValueKind};
pub use worker::{Features, Limits, WorkerConfig, CONFIG_FILE, DEFAULT_WORKER_PORT};
