use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::RelayError;

/// Runtime options shared by every run of a [`crate::Relay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Bounded wait of the buffered protocol.
    pub aggregate_timeout: Duration,
    /// Outbound event buffer of the streaming protocol.
    pub stream_buffer_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            aggregate_timeout: Duration::from_secs(60),
            stream_buffer_capacity: 128,
        }
    }
}

impl RelayConfig {
    /// Overrides the buffered protocol wait.
    pub fn aggregate_timeout(mut self, timeout: Duration) -> Self {
        self.aggregate_timeout = timeout;
        self
    }

    /// Overrides the streaming buffer capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Reads overrides from the process environment.
    ///
    /// - `CHATRELAY_AGGREGATE_TIMEOUT_SECS`
    /// - `CHATRELAY_STREAM_BUFFER`
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RelayError> {
        let mut config = Self::default();
        if let Some(secs) = parse_var::<u64>(&lookup, "CHATRELAY_AGGREGATE_TIMEOUT_SECS")? {
            config.aggregate_timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "CHATRELAY_STREAM_BUFFER")? {
            config.stream_buffer_capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.aggregate_timeout.is_zero() {
            return Err(RelayError::Config(
                "aggregate_timeout must be greater than 0".into(),
            ));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(RelayError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Logging options consumed by [`crate::observability::init_observability_with`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Install a subscriber at all.
    pub enabled: bool,
    /// `tracing_subscriber::EnvFilter` directives.
    pub filter: String,
    /// JSON lines file; console output when `None`.
    pub json_log_path: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: "info".into(),
            json_log_path: None,
        }
    }
}

impl ObservabilityConfig {
    /// Reads the process environment.
    ///
    /// - `CHATRELAY_OBSERVABILITY_ENABLED`: `true`/`false` (also `1`/`0`,
    ///   `yes`/`no`, `on`/`off`), default enabled
    /// - `CHATRELAY_LOG_LEVEL`, falling back to `RUST_LOG`, then `info`
    /// - `CHATRELAY_JSON_LOG_PATH`
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RelayError> {
        let mut config = Self::default();
        if let Some(raw) = non_blank(&lookup, "CHATRELAY_OBSERVABILITY_ENABLED") {
            config.enabled = parse_flag(&raw).ok_or_else(|| {
                RelayError::Config(format!(
                    "invalid CHATRELAY_OBSERVABILITY_ENABLED={raw}: expected a boolean"
                ))
            })?;
        }
        if let Some(filter) = non_blank(&lookup, "CHATRELAY_LOG_LEVEL")
            .or_else(|| non_blank(&lookup, "RUST_LOG"))
        {
            config.filter = filter;
        }
        config.json_log_path = non_blank(&lookup, "CHATRELAY_JSON_LOG_PATH").map(PathBuf::from);
        Ok(config)
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, RelayError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RelayError::Config(format!("invalid {key}={raw}: {e}"))),
        _ => Ok(None),
    }
}
