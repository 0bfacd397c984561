use std::time::Duration;

use serde::{Deserialize, Serialize};

use metronome_core::ConfigError;

/// Worker pool configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Smallest worker count the pool may shrink to.
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    /// Largest worker count the pool may grow to.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Worker count at startup.
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,
    /// Capacity of the bounded work queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Milliseconds between autoscaling decisions.
    #[serde(default = "default_adjust_interval")]
    pub adjust_interval_ms: u64,
    /// CPU fraction above which the pool sheds a worker.
    #[serde(default = "default_high_cpu")]
    pub high_cpu_threshold: f64,
    /// CPU fraction below which queue pressure may add a worker.
    #[serde(default = "default_low_cpu")]
    pub low_cpu_threshold: f64,
    /// Queue depth that counts as backlog when deciding to grow.
    #[serde(default = "default_high_queue")]
    pub high_queue_threshold: usize,
    /// Milliseconds granted to drain outstanding work at shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_min_size() -> usize {
    2
}
fn default_max_size() -> usize {
    4
}
fn default_initial_size() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    100
}
fn default_adjust_interval() -> u64 {
    30_000
}
fn default_high_cpu() -> f64 {
    0.75
}
fn default_low_cpu() -> f64 {
    0.40
}
fn default_high_queue() -> usize {
    20
}
fn default_shutdown_grace() -> u64 {
    10_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            max_size: default_max_size(),
            initial_size: default_initial_size(),
            queue_capacity: default_queue_capacity(),
            adjust_interval_ms: default_adjust_interval(),
            high_cpu_threshold: default_high_cpu(),
            low_cpu_threshold: default_low_cpu(),
            high_queue_threshold: default_high_queue(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl PoolConfig {
    /// Check the construction invariants. A pool is never created from a
    /// config that fails here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size == 0 {
            return Err(ConfigError::ZeroField { field: "min_size" });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroField {
                field: "queue_capacity",
            });
        }
        if self.adjust_interval_ms == 0 {
            return Err(ConfigError::ZeroField {
                field: "adjust_interval_ms",
            });
        }
        if self.min_size > self.initial_size || self.initial_size > self.max_size {
            return Err(ConfigError::SizeOrdering {
                min: self.min_size,
                initial: self.initial_size,
                max: self.max_size,
            });
        }
        for (field, value) in [
            ("high_cpu_threshold", self.high_cpu_threshold),
            ("low_cpu_threshold", self.low_cpu_threshold),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::RatioRange { field, value });
            }
        }
        if self.low_cpu_threshold >= self.high_cpu_threshold {
            return Err(ConfigError::ThresholdOrdering {
                low: self.low_cpu_threshold,
                high: self.high_cpu_threshold,
            });
        }
        Ok(())
    }

    pub fn adjust_interval(&self) -> Duration {
        Duration::from_millis(self.adjust_interval_ms)
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
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_initial_above_max() {
        let config = PoolConfig {
            min_size: 2,
            initial_size: 8,
            max_size: 4,
            ..PoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SizeOrdering { .. })
        ));
    }

    #[test]
    fn rejects_min_above_initial() {
        let config = PoolConfig {
            min_size: 3,
            initial_size: 2,
            max_size: 4,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_sizes_and_inverted_thresholds() {
        let zero = PoolConfig {
            min_size: 0,
            initial_size: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::ZeroField { field: "min_size" })
        ));

        let inverted = PoolConfig {
            low_cpu_threshold: 0.8,
            high_cpu_threshold: 0.5,
            ..PoolConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::ThresholdOrdering { .. })
        ));
    }
}
