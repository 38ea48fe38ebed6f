//! Trellis runtime - orchestration layer for the Trellis event router.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `TrellisConfig`)
//! - Logging setup (`logging`)
//! - Runtime orchestration (`TrellisRuntime`)
//!
//! ```rust,ignore
//! use trellis_runtime::TrellisRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = TrellisRuntime::builder()
//!         .sender(my_sender)
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigLoader, TrellisConfig, load_config, load_config_from_file};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use runtime::{RuntimeBuilder, TrellisRuntime};
