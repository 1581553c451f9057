//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for switchboard
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Message bus configuration
    #[serde(default)]
    pub bus: BusConfig,
    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Channel configuration
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Message bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bounded wait of the outbound dispatcher, in milliseconds
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
}

fn default_dispatch_interval_ms() -> u64 {
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: default_dispatch_interval_ms(),
        }
    }
}

/// How the agent hands its replies to the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// `send_direct`: wait for the adapter and learn about failures
    #[default]
    Direct,
    /// `publish_outbound`: fire-and-forget through the dispatcher
    Queued,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Reply delivery path
    #[serde(default)]
    pub delivery: DeliveryMode,
    /// Longest reply chunk a channel receives in one message
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

fn default_max_message_length() -> usize {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::default(),
            max_message_length: default_max_message_length(),
        }
    }
}

/// Channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Local console channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub allow_from: Vec<String>,
    /// Sender id attached to lines read from the console
    #[serde(default = "default_console_sender")]
    pub sender_id: String,
    /// Chat id attached to lines read from the console
    #[serde(default = "default_console_chat")]
    pub chat_id: String,
    /// Print a marker while a reply is being prepared
    #[serde(default)]
    pub show_typing: bool,
}

fn default_true() -> bool {
    true
}

fn default_console_sender() -> String {
    "local".to_string()
}

fn default_console_chat() -> String {
    "direct".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            allow_from: Vec::new(),
            sender_id: default_console_sender(),
            chat_id: default_console_chat(),
            show_typing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"agent":{"delivery":"queued"}}"#).unwrap();

        assert_eq!(config.agent.delivery, DeliveryMode::Queued);
        assert_eq!(config.agent.max_message_length, 2000);
        assert_eq!(config.bus.dispatch_interval_ms, 1000);
        assert!(config.channels.console.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_delivery_mode_is_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"agent":{"delivery":"carrier-pigeon"}}"#);
        assert!(result.is_err());
    }
}
