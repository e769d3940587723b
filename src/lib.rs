//! Corduroy - Gateway Client Library
//!
//! Root crate of the workspace. It re-exports the gateway and REST libraries
//! and hosts the shared plumbing used by the binaries.
//!
//! ## Architecture
//!
//! - **hypergate**: gateway session, heartbeat, readiness and dispatch (re-exported)
//! - **hyperrest**: rate-limited REST client (re-exported)
//! - **bin_common**: config loading, logging, shutdown and runner utilities
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use corduroy::bin_common::{load_config_from_env, ClientConfig, ConfigType};
//!
//! let path = load_config_from_env(ConfigType::Gateway);
//! let config = ClientConfig::load(&path)?;
//! let client = config.builder()?.build()?;
//! ```

// Re-export workspace libraries for convenience
pub use hypergate;
pub use hyperrest;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod runner;
    pub mod shutdown;

    pub use cli::{load_config_from_env, ConfigType};
    pub use config::{ClientConfig, ConfigError, ReconnectConfig, ReconnectKind};
    pub use logging::init_logging_with_level;
    pub use runner::{BinaryRunner, RunConfig};
    pub use shutdown::ShutdownManager;
}
