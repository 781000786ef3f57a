// Connector configuration with environment and YAML overrides.
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::error::ConfigError;

pub(crate) const DEFAULT_COMMAND_THREADS: usize = 10;
pub(crate) const DEFAULT_INITIAL_PERMITS: u64 = 1000;
pub(crate) const DEFAULT_NEW_PERMITS: u64 = 500;
pub(crate) const DEFAULT_NEW_PERMITS_THRESHOLD: u64 = 500;

/// Starting capacity of the inbound priority queue; growth hysteresis only,
/// the queue itself is unbounded.
pub(crate) const QUEUE_INITIAL_CAPACITY: usize = 1000;
pub(crate) const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Identity, credit-flow, and worker settings for the router connection.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Identity for server-side tracking.
    pub client_id: String,
    /// Logical service group this client belongs to.
    pub component_name: String,
    /// Access token attached to every call, when set.
    pub token: Option<String>,
    /// Routing context attached to every call, when set.
    pub context: Option<String>,
    /// Number of workers draining the inbound command queue.
    pub command_threads: usize,
    /// Credit granted when the subscriber stream opens.
    pub initial_permits: u64,
    /// Credit granted on each replenishment.
    pub new_permits: u64,
    /// Command responses sent between replenishments.
    pub new_permits_threshold: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct RouterConfigOverride {
    token: Option<String>,
    context: Option<String>,
    command_threads: Option<usize>,
    initial_permits: Option<u64>,
    new_permits: Option<u64>,
    new_permits_threshold: Option<u64>,
}

impl RouterConfig {
    pub fn new(client_id: impl Into<String>, component_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            component_name: component_name.into(),
            token: None,
            context: None,
            command_threads: DEFAULT_COMMAND_THREADS,
            initial_permits: DEFAULT_INITIAL_PERMITS,
            new_permits: DEFAULT_NEW_PERMITS,
            new_permits_threshold: DEFAULT_NEW_PERMITS_THRESHOLD,
        }
    }

    pub fn from_env(
        client_id: impl Into<String>,
        component_name: impl Into<String>,
    ) -> Self {
        let mut config = Self::new(client_id, component_name);
        if let Ok(value) = std::env::var("COURIER_TOKEN") {
            config.token = Some(value);
        }
        if let Ok(value) = std::env::var("COURIER_CONTEXT") {
            config.context = Some(value);
        }
        if let Some(value) = read_usize_env("COURIER_COMMAND_THREADS") {
            config.command_threads = value;
        }
        if let Some(value) = read_u64_env("COURIER_INITIAL_PERMITS") {
            config.initial_permits = value;
        }
        if let Some(value) = read_u64_env("COURIER_NEW_PERMITS") {
            config.new_permits = value;
        }
        if let Some(value) = read_u64_env("COURIER_NEW_PERMITS_THRESHOLD") {
            config.new_permits_threshold = value;
        }
        config
    }

    /// Environment settings first, then an optional YAML override file
    /// (explicit path or `COURIER_CLIENT_CONFIG`).
    pub fn from_env_or_yaml(
        client_id: impl Into<String>,
        component_name: impl Into<String>,
        config_path: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::from_env(client_id, component_name);
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("COURIER_CLIENT_CONFIG").ok());
        if let Some(path) = override_path {
            let contents = fs::read_to_string(&path)
                .map_err(|source| ConfigError::Io { path, source })?;
            let override_cfg: RouterConfigOverride = serde_yaml::from_str(&contents)?;
            override_cfg.apply(&mut config);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_threads == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.initial_permits == 0 {
            return Err(ConfigError::NonPositivePermits("initial_permits"));
        }
        if self.new_permits == 0 {
            return Err(ConfigError::NonPositivePermits("new_permits"));
        }
        if self.new_permits_threshold == 0 {
            return Err(ConfigError::NonPositivePermits("new_permits_threshold"));
        }
        if self.new_permits_threshold > self.initial_permits {
            return Err(ConfigError::ThresholdTooHigh {
                threshold: self.new_permits_threshold,
                initial: self.initial_permits,
            });
        }
        Ok(())
    }
}

impl RouterConfigOverride {
    fn apply(&self, config: &mut RouterConfig) {
        if let Some(value) = &self.token {
            config.token = Some(value.clone());
        }
        if let Some(value) = &self.context {
            config.context = Some(value.clone());
        }
        if let Some(value) = self.command_threads
            && value > 0
        {
            config.command_threads = value;
        }
        if let Some(value) = self.initial_permits
            && value > 0
        {
            config.initial_permits = value;
        }
        if let Some(value) = self.new_permits
            && value > 0
        {
            config.new_permits = value;
        }
        if let Some(value) = self.new_permits_threshold
            && value > 0
        {
            config.new_permits_threshold = value;
        }
    }
}

fn read_u64_env(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}

fn read_usize_env(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RouterConfig::new("client-1", "orders");
        config.validate().expect("valid defaults");
        assert_eq!(config.command_threads, DEFAULT_COMMAND_THREADS);
        assert_eq!(config.initial_permits, DEFAULT_INITIAL_PERMITS);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = RouterConfig::new("client-1", "orders");
        config.command_threads = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkers)));
    }

    #[test]
    fn threshold_above_initial_permits_is_rejected() {
        let mut config = RouterConfig::new("client-1", "orders");
        config.initial_permits = 10;
        config.new_permits_threshold = 11;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdTooHigh {
                threshold: 11,
                initial: 10
            })
        ));
    }

    #[test]
    fn zero_permit_values_are_rejected() {
        let mut config = RouterConfig::new("client-1", "orders");
        config.new_permits = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositivePermits("new_permits"))
        ));
    }

    #[test]
    fn yaml_override_applies_positive_values_only() {
        let mut config = RouterConfig::new("client-1", "orders");
        let override_cfg: RouterConfigOverride = serde_yaml::from_str(
            "token: secret\ncommand_threads: 4\nnew_permits: 0\n",
        )
        .expect("parse override");
        override_cfg.apply(&mut config);
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.command_threads, 4);
        // Zero values are ignored rather than breaking the flow control.
        assert_eq!(config.new_permits, DEFAULT_NEW_PERMITS);
    }
}
