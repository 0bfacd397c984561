use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use metronome_net::ProbeConfig;
use metronome_pool::PoolConfig;
use metronome_scheduler::SchedulerConfig;

/// Full runtime configuration, parsed from `metronome.toml`.
///
/// Every section and field is optional; missing pieces fall back to
/// their defaults. Validation happens at component construction, not
/// here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetronomeConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub net: ProbeConfig,
}

impl MetronomeConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = MetronomeConfig::load(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(config.scheduler.max_concurrent_tasks, 20);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: MetronomeConfig = toml::from_str(
            r#"
            [pool]
            max_size = 8
            initial_size = 3

            [net]
            host = "example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_size, 8);
        assert_eq!(config.pool.initial_size, 3);
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(config.net.host, "example.com");
        assert_eq!(config.net.port, 80);
        assert_eq!(config.scheduler.pool_size, 4);
    }
}
