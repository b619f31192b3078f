//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A file has an extension no enabled format handles.
    #[error("No enabled configuration format reads .{extension} files")]
    UnsupportedFormat { extension: String },

    /// A source could not be read into [`AnvilConfig`](super::AnvilConfig).
    #[error("Failed to read configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A setting holds a value the runtime cannot work with.
    #[error("Invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// A setting that must be non-empty is empty.
    #[error("Setting `{key}` must not be empty")]
    Empty { key: &'static str },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// The dotted key of the offending setting, if there is one.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } | Self::Empty { key } => Some(key),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Extract(Box::new(error))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
