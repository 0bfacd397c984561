use std::time::Duration;

use serde::{Deserialize, Serialize};

use metronome_core::ConfigError;

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Executor threads shared by all scheduled tasks.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Cap on concurrently registered periodic tasks.
    #[serde(default = "default_max_tasks")]
    pub max_concurrent_tasks: usize,
    /// Milliseconds granted to drain in-flight work at shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_pool_size() -> usize {
    4
}
fn default_max_tasks() -> usize {
    20
}
fn default_shutdown_grace() -> u64 {
    5_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_concurrent_tasks: default_max_tasks(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroField { field: "pool_size" });
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::ZeroField {
                field: "max_concurrent_tasks",
            });
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.max_concurrent_tasks, 20);
    }

    #[test]
    fn rejects_zero_pool_size() {
        let config = SchedulerConfig {
            pool_size: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
