//! Common utilities and types shared across replifs

pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, GroupConfig, NodeConfig};
pub use error::{Error, Result};
pub use utils::{format_bytes, resource_key, timestamp_now_millis, validate_file_name};
