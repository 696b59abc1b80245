use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Mute the user's microphone until the agent's greeting has finished.
    pub gate_mic_first_utterance: bool,
    pub event_queue_capacity: usize,
    pub urgent_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: Level::INFO,
            gate_mic_first_utterance: true,
            event_queue_capacity: 128,
            urgent_queue_capacity: 16,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(value) => value
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?,
            Err(_) => defaults.bind_address,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let gate_mic_first_utterance = match std::env::var("MIC_GATE_FIRST_UTTERANCE") {
            Ok(value) => parse_bool("MIC_GATE_FIRST_UTTERANCE", &value)?,
            Err(_) => defaults.gate_mic_first_utterance,
        };

        let event_queue_capacity =
            capacity_var("EVENT_QUEUE_CAPACITY", defaults.event_queue_capacity)?;
        let urgent_queue_capacity =
            capacity_var("URGENT_QUEUE_CAPACITY", defaults.urgent_queue_capacity)?;

        Ok(Self {
            bind_address,
            log_level,
            gate_mic_first_utterance,
            event_queue_capacity,
            urgent_queue_capacity,
        })
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            var.to_string(),
            format!("'{}' is not a boolean", value),
        )),
    }
}

/// Channel capacities must be positive; tokio panics on a zero-sized channel.
fn capacity_var(var: &str, default: usize) -> Result<usize, ConfigError> {
    let Ok(value) = std::env::var(var) else {
        return Ok(default);
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue(
            var.to_string(),
            format!("'{}' is not a positive integer", value),
        )),
    }
}
