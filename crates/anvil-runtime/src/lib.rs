//! Anvil Runtime - configuration, logging and the event loop.
//!
//! This crate provides:
//! - Layered configuration ([`ConfigLoader`], [`AnvilConfig`])
//! - Logging setup ([`LoggingBuilder`], [`logging::init_from_config`])
//! - [`AnvilRuntime`], which feeds platform events through dispatch and delivery
//!
//! ```ignore
//! use anvil_runtime::AnvilRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (events_tx, events) = tokio::sync::mpsc::channel(64);
//!     let platform = MyPlatform::connect(events_tx).await?;
//!
//!     let runtime = AnvilRuntime::builder()
//!         .platform(platform)
//!         .commands(registry)
//!         .build()?;
//!
//!     runtime.run(events).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{AnvilConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{AnvilRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
