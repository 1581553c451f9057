//! Configuration validation rules.

use super::schema::Config;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.bus.dispatch_interval_ms == 0 {
        errors.push("bus.dispatch_interval_ms must be > 0".to_string());
    }
    if config.agent.max_message_length == 0 {
        errors.push("agent.max_message_length must be > 0".to_string());
    }

    if config.channels.console.enabled {
        if config.channels.console.sender_id.trim().is_empty() {
            errors.push(
                "channels.console.sender_id is required when console is enabled".to_string(),
            );
        }
        if config.channels.console.chat_id.trim().is_empty() {
            errors
                .push("channels.console.chat_id is required when console is enabled".to_string());
        }
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(format!(
            "logging.level must be one of {}",
            LOG_LEVELS.join(", ")
        ));
    }
    if !matches!(config.logging.format.to_ascii_lowercase().as_str(), "text" | "json") {
        errors.push("logging.format must be text or json".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        validate_config(&Config::default()).unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_dispatch_interval() {
        let mut config = Config::default();
        config.bus.dispatch_interval_ms = 0;

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("bus.dispatch_interval_ms"));
    }

    #[test]
    fn test_validate_aggregates_errors() {
        let mut config = Config::default();
        config.channels.console.chat_id = " ".to_string();
        config.logging.format = "xml".to_string();

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("channels.console.chat_id"));
        assert!(err.contains("logging.format"));
    }

    #[test]
    fn test_disabled_console_skips_its_checks() {
        let mut config = Config::default();
        config.channels.console.enabled = false;
        config.channels.console.sender_id = String::new();
        validate_config(&config).unwrap();
    }
}
