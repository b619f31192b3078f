//! Runtime error types.

use anvil_framework::DeliveryError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The runtime was built without a platform.
    #[error("No platform configured")]
    MissingPlatform,

    /// The initial send of a response failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
