//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anvil_framework::{DriverConfig, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnvilConfig {
    #[serde(default)]
    pub bot: BotConfig,

    /// Timing of the response state machine.
    #[serde(default)]
    pub interaction: InteractionConfig,

    /// Backoff for rate-limited platform calls.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Free-form sections owned by the bot's own code, keyed by name:
    ///
    /// ```toml
    /// [plugins.course_bot]
    /// show_edited_messages = true
    /// ```
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

impl AnvilConfig {
    /// Deserializes the `plugins.<name>` section, or `T::default()` if the
    /// section is absent.
    ///
    /// Use `#[serde(default)]` on `T` to make every field optional.
    pub fn plugin_config<T>(&self, name: &str) -> serde_json::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.plugins.get(name) {
            Some(section) => T::deserialize(section),
            None => Ok(T::default()),
        }
    }

    /// The state machine settings described by this configuration.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            edit_interval: Duration::from_millis(self.interaction.edit_interval_ms),
            interactive_timeout: Duration::from_secs(self.interaction.interactive_timeout_secs),
            wait_timeout: Duration::from_secs(self.interaction.wait_timeout_secs),
            edit_retention: Duration::from_secs(self.interaction.edit_retention_secs),
            retry: self.retry.to_policy(),
        }
    }
}

// =============================================================================
// Bot
// =============================================================================

/// How the bot recognizes commands addressed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that marks a message as a command.
    #[serde(default = "default_invoker")]
    pub invoker: String,

    /// The bot's own user id, if the platform does not report it.
    #[serde(default)]
    pub self_id: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            invoker: default_invoker(),
            self_id: None,
        }
    }
}

fn default_invoker() -> String {
    "!".to_string()
}

// =============================================================================
// Interaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionConfig {
    /// Minimum spacing between edits of one message, in milliseconds.
    #[serde(default = "default_edit_interval_ms")]
    pub edit_interval_ms: u64,

    /// Inactivity timeout of interactive responses, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub interactive_timeout_secs: u64,

    /// Default timeout of wait responses, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// How long a normal response can be updated by editing its command, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub edit_retention_secs: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            edit_interval_ms: default_edit_interval_ms(),
            interactive_timeout_secs: default_timeout_secs(),
            wait_timeout_secs: default_timeout_secs(),
            edit_retention_secs: default_timeout_secs(),
        }
    }
}

fn default_edit_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    300
}

// =============================================================================
// Retry
// =============================================================================

/// Backoff for platform calls that come back rate limited. Any field left
/// out keeps the framework's default policy value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Wait before the first retry when the platform gives no hint, in milliseconds.
    pub initial_delay_ms: u64,
    /// Cap on any single wait, in milliseconds.
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetryPolicy::default())
    }
}

impl From<&RetryPolicy> for RetryConfig {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            initial_delay_ms: u64::try_from(policy.initial_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_multiplier: policy.multiplier,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file when `output = "file"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in log lines.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `anvil_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnvilConfig::default();
        assert_eq!(config.bot.invoker, "!");
        assert_eq!(config.interaction.edit_interval_ms, 1000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Greeter {
        greeting: String,
        loud: bool,
    }

    #[test]
    fn test_plugin_config_sections() {
        let mut config = AnvilConfig::default();
        assert_eq!(config.plugin_config::<Greeter>("greeter").unwrap(), Greeter::default());

        config
            .plugins
            .insert("greeter".into(), serde_json::json!({ "loud": true }));
        let greeter: Greeter = config.plugin_config("greeter").unwrap();
        assert!(greeter.loud);
        assert_eq!(greeter.greeting, "");

        config
            .plugins
            .insert("greeter".into(), serde_json::json!({ "loud": "very" }));
        assert!(config.plugin_config::<Greeter>("greeter").is_err());
    }

    #[test]
    fn test_driver_config_conversion() {
        let mut config = AnvilConfig::default();
        config.interaction.edit_interval_ms = 250;
        config.interaction.wait_timeout_secs = 30;
        config.retry.initial_delay_ms = 500;

        let driver = config.driver_config();
        assert_eq!(driver.edit_interval, Duration::from_millis(250));
        assert_eq!(driver.wait_timeout, Duration::from_secs(30));
        assert_eq!(driver.interactive_timeout, Duration::from_secs(300));
        assert_eq!(driver.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(driver.retry.max_delay, Duration::from_secs(30));
    }
}
