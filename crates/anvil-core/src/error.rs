//! Error types for the Anvil core.
//!
//! Framework-level errors (delivery, dispatch, interaction) are defined in
//! anvil-framework.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Blueprint Errors
// =============================================================================

/// Errors raised while constructing a [`Blueprint`](crate::Blueprint).
///
/// These are programming errors in a command definition and are reported at
/// registration time, never while matching user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlueprintError {
    /// The command name is empty or contains whitespace.
    #[error("invalid command name: {0:?}")]
    InvalidName(String),

    /// Two options in one variant share a name.
    #[error("variant {variant}: duplicate option '{option}'")]
    DuplicateOption {
        /// Index of the offending variant.
        variant: usize,
        /// The repeated option name.
        option: String,
    },

    /// A split or merged argument is followed by another argument.
    #[error("variant {variant}: trailing argument '{argument}' must be the last argument")]
    TrailingNotLast {
        /// Index of the offending variant.
        variant: usize,
        /// The split or merged argument.
        argument: String,
    },

    /// An option name is empty or contains whitespace.
    #[error("variant {variant}: invalid option name {option:?}")]
    InvalidOption {
        /// Index of the offending variant.
        variant: usize,
        /// The rejected option name.
        option: String,
    },
}

// =============================================================================
// Match Failures
// =============================================================================

/// Why input could not be matched against a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchFailure {
    /// The blueprint declares no variants.
    #[error("'{command}' has no usable syntax")]
    NoVariants {
        /// The command name.
        command: String,
    },

    /// No variant accepted the input. Carries the usages for display.
    #[error("invalid syntax for '{command}'")]
    SyntaxMismatch {
        /// The command name.
        command: String,
        /// One usage line per variant, in declaration order.
        usage: Vec<String>,
    },

    /// An argument check rejected a captured value.
    #[error("{message}")]
    Validation {
        /// The argument whose check failed.
        argument: String,
        /// The check's message.
        message: String,
    },
}

impl MatchFailure {
    /// Text shown to the user for this failure.
    pub fn display_message(&self) -> String {
        match self {
            Self::NoVariants { command } => format!("`{command}` cannot be used right now."),
            Self::SyntaxMismatch { command, usage } => {
                let mut text = format!("Invalid syntax for `{command}`. Usage:");
                for line in usage {
                    text.push_str("\n`");
                    text.push_str(line);
                    text.push('`');
                }
                text
            }
            Self::Validation { message, .. } => message.clone(),
        }
    }
}

// =============================================================================
// Platform Errors
// =============================================================================

/// Errors reported by a [`Platform`](crate::Platform) implementation.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform throttled the request.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Platform-suggested wait, if any.
        retry_after: Option<Duration>,
    },

    /// The target message or channel no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bot lacks permission for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The platform connection is unavailable.
    #[error("platform is not connected")]
    NotConnected,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Only rate limits are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// The platform's suggested delay for a rate limit.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for blueprint construction.
pub type BlueprintResult<T> = Result<T, BlueprintError>;

/// Result type for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;
