//! Configuration for the Anvil runtime.
//!
//! Settings are layered with figment from built-in defaults, an optional
//! `anvil.toml` (or YAML) file, `ANVIL_*` environment variables and
//! programmatic overrides, then validated before use.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AnvilConfig, BotConfig, InteractionConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RetryConfig, SpanEventConfig,
};
pub use validation::validate_config;
