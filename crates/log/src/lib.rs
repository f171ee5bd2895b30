#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Steward Log
//!
//! Installs the process-wide `tracing` subscriber for Steward binaries:
//! an `EnvFilter` plus a pretty, compact or JSON fmt layer.
//!
//! ```no_run
//! let _guard = steward_log::init_with(steward_log::Config::from_env())?;
//! tracing::info!(node = "worker-1", "agent starting");
//! # Ok::<(), steward_log::LogError>(())
//! ```

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Fields, Format, WriterConfig};
pub use error::{LogError, LogResult};

/// Install the logger from environment variables, falling back to the
/// development preset in debug builds and the production preset otherwise.
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var_os("STEWARD_LOG").is_some() || std::env::var_os("RUST_LOG").is_some() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Install the logger with `config`.
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}
