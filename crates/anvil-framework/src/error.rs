//! Error types for the Anvil framework.

use anvil_core::{BlueprintError, PlatformError};
use thiserror::Error;
use tower::BoxError;

/// Errors a command handler can return.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A recoverable failure the user should see verbatim.
    #[error("{0}")]
    User(String),

    /// An unexpected failure. The user sees a generic message; the detail
    /// goes to the fault reporter.
    #[error("internal error: {0}")]
    Internal(BoxError),
}

impl CommandError {
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    pub fn internal(error: impl Into<BoxError>) -> Self {
        Self::Internal(error.into())
    }
}

/// The initial send of a response failed. Fatal to the invocation.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to send response: {0}")]
    Send(#[source] PlatformError),

    #[error("failed to replace response: {0}")]
    Replace(#[source] PlatformError),
}

/// Errors seen by follow-up work on a sent message.
#[derive(Debug, Clone, Error)]
pub enum InteractionError {
    /// The interaction was cancelled, by replacement or shutdown.
    #[error("interaction cancelled")]
    Cancelled,

    /// A follow-up platform call failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl InteractionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised while building a [`CommandRegistry`](crate::CommandRegistry).
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A command or shortcut with this name already exists.
    #[error("'{0}' is already registered")]
    DuplicateName(String),

    /// A shortcut's argument list is not a valid blueprint.
    #[error("invalid shortcut: {0}")]
    Blueprint(#[from] BlueprintError),

    /// A shortcut template refers to an argument it does not declare.
    #[error("shortcut '{shortcut}' uses undeclared placeholder '{placeholder}'")]
    UnknownPlaceholder { shortcut: String, placeholder: String },
}

/// Result type for follow-up interactions.
pub type InteractionResult<T> = Result<T, InteractionError>;

/// Result type for registry construction.
pub type RegistryResult<T> = Result<T, RegistryError>;
