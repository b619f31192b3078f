//! Checks a loaded [`AnvilConfig`] before the runtime starts on it.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AnvilConfig, LogOutput};

/// Rejects settings the dispatcher or the response driver cannot run with.
pub fn validate_config(config: &AnvilConfig) -> ConfigResult<()> {
    let bot = &config.bot;
    if bot.invoker.is_empty() {
        return Err(ConfigError::Empty { key: "bot.invoker" });
    }
    if bot.invoker.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(
            "bot.invoker",
            "an invoker cannot contain whitespace",
        ));
    }
    if bot.self_id.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::Empty { key: "bot.self_id" });
    }

    let interaction = &config.interaction;
    for (key, value) in [
        ("interaction.edit_interval_ms", interaction.edit_interval_ms),
        ("interaction.interactive_timeout_secs", interaction.interactive_timeout_secs),
        ("interaction.wait_timeout_secs", interaction.wait_timeout_secs),
        ("interaction.edit_retention_secs", interaction.edit_retention_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::invalid(key, "must be greater than 0"));
        }
    }

    let retry = &config.retry;
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::invalid("retry.initial_delay_ms", "must be greater than 0"));
    }
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::invalid(
            "retry.max_delay_ms",
            format!("must be at least retry.initial_delay_ms ({})", retry.initial_delay_ms),
        ));
    }
    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::invalid("retry.backoff_multiplier", "must be at least 1.0"));
    }

    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::Empty { key: "logging.file_path" });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_key(config: &AnvilConfig) -> Option<&'static str> {
        validate_config(config).err().and_then(|e| e.key())
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&AnvilConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_invoker() {
        let mut config = AnvilConfig::default();
        config.bot.invoker = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Empty { key: "bot.invoker" })
        ));

        config.bot.invoker = "! ".to_string();
        assert_eq!(rejected_key(&config), Some("bot.invoker"));

        config.bot.invoker = "bot,".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_self_id() {
        let mut config = AnvilConfig::default();
        config.bot.self_id = Some(String::new());
        assert_eq!(rejected_key(&config), Some("bot.self_id"));
    }

    #[test]
    fn test_validate_zero_intervals() {
        let mut config = AnvilConfig::default();
        config.interaction.edit_interval_ms = 0;
        assert_eq!(rejected_key(&config), Some("interaction.edit_interval_ms"));

        let mut config = AnvilConfig::default();
        config.interaction.wait_timeout_secs = 0;
        assert_eq!(rejected_key(&config), Some("interaction.wait_timeout_secs"));
    }

    #[test]
    fn test_validate_retry() {
        let mut config = AnvilConfig::default();
        config.retry.max_delay_ms = config.retry.initial_delay_ms - 1;
        assert_eq!(rejected_key(&config), Some("retry.max_delay_ms"));

        let mut config = AnvilConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert_eq!(rejected_key(&config), Some("retry.backoff_multiplier"));
        config.retry.backoff_multiplier = f64::NAN;
        assert_eq!(rejected_key(&config), Some("retry.backoff_multiplier"));
        config.retry.backoff_multiplier = 1.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = AnvilConfig::default();
        config.logging.output = LogOutput::File;
        assert_eq!(rejected_key(&config), Some("logging.file_path"));

        config.logging.file_path = Some("anvil.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
