//! Configuration module for the Trellis runtime.
//!
//! TOML files, environment variables, and programmatic defaults are
//! merged in layers; later sources override earlier ones.

pub mod loader;
pub mod schema;

pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{LogFormat, LogOutput, LoggingConfig, RouterSection, TrellisConfig};

pub use crate::error::{ConfigError, ConfigResult};
