//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, SolderConfig};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validates a loaded configuration.
///
/// Catches mistakes figment cannot: values that parse fine but make the
/// runtime unusable (zero intervals, file output without a path, enabled
/// platforms without credentials).
pub fn validate_config(config: &SolderConfig) -> ConfigResult<()> {
    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        return Err(ConfigError::validation(format!(
            "Unknown log level '{}'",
            config.logging.level
        )));
    }

    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::MissingField {
            field: "logging.file_path".to_string(),
        });
    }

    if config.bot.prefix.is_empty() {
        return Err(ConfigError::validation("bot.prefix must not be empty"));
    }

    for (name, platform) in &config.platforms {
        if platform.enabled && platform.token.is_none() {
            return Err(ConfigError::MissingField {
                field: format!("platforms.{name}.token"),
            });
        }
    }

    if config.pubsub.enabled {
        if config.pubsub.url.is_empty() {
            return Err(ConfigError::validation("pubsub.url must not be empty"));
        }
        if config.pubsub.ping_interval_secs == 0 {
            return Err(ConfigError::validation(
                "pubsub.ping_interval_secs must be positive",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PlatformConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&SolderConfig::default()).is_ok());
    }

    #[test]
    fn file_output_requires_a_path() {
        let mut config = SolderConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));
    }

    #[test]
    fn enabled_platform_requires_a_token() {
        let mut config = SolderConfig::default();
        config.platforms.insert(
            "twitch".to_string(),
            PlatformConfig {
                enabled: true,
                username: Some("solderbot".to_string()),
                token: None,
            },
        );
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "platforms.twitch.token"
        ));
    }

    #[test]
    fn zero_ping_interval_is_rejected() {
        let mut config = SolderConfig::default();
        config.pubsub.enabled = true;
        config.pubsub.ping_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
