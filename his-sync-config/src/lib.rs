//! Layered configuration loader: environment variables override a TOML
//! file, which overrides built-in defaults (SPEC_FULL.md §4.8).

mod config;
mod error;

pub use config::{CacheBackend, HisSyncConfig};
pub use error::{ConfigError, ConfigResult};
