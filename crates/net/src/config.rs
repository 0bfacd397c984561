use std::time::Duration;

use serde::{Deserialize, Serialize};

use metronome_core::ConfigError;

/// Probe configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Default probe target.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Probes per quality check.
    #[serde(default = "default_samples")]
    pub samples: usize,
    /// Per-probe connect timeout in milliseconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

fn default_host() -> String {
    "1.1.1.1".to_string()
}
fn default_port() -> u16 {
    80
}
fn default_samples() -> usize {
    5
}
fn default_probe_timeout() -> u64 {
    2_000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            samples: default_samples(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples == 0 {
            return Err(ConfigError::ZeroField { field: "samples" });
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroField {
                field: "probe_timeout_ms",
            });
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
