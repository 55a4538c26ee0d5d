//! Strata Core Library
//!
//! Configuration, error types, and the storage backend selector shared by the
//! storage core and its callers.

pub mod config;
pub mod error;
pub mod storage_types;
pub mod telemetry;

pub use config::StorageConfig;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
pub use telemetry::init_tracing;
