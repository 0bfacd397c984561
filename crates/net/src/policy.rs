//! Cached adaptive policy over the latest observed tier.

use std::sync::RwLock;

use tracing::info;

use crate::monitor::NetworkQualityMonitor;
use crate::tier::{recommended_retries, recommended_timeout, QualityTier};

/// Caches the most recent quality tier so hot paths read timeout and
/// retry policy without probing.
///
/// Owns no timer: register [`refresh`](Self::refresh) as a periodic
/// monitor task on the shared scheduler instead.
pub struct AdaptivePolicy {
    monitor: NetworkQualityMonitor,
    current: RwLock<QualityTier>,
}

impl AdaptivePolicy {
    /// Starts from `Good` until the first refresh lands.
    pub fn new(monitor: NetworkQualityMonitor) -> Self {
        Self {
            monitor,
            current: RwLock::new(QualityTier::Good),
        }
    }

    /// Re-probe the configured target and swap the cached tier.
    pub fn refresh(&self) {
        let report = self.monitor.check_default();
        if let Ok(mut current) = self.current.write() {
            let previous = *current;
            *current = report.tier;
            if previous != report.tier {
                info!(
                    from = %previous,
                    to = %report.tier,
                    avg_ms = report.avg_latency_ms,
                    loss = report.loss_rate,
                    "network quality tier changed"
                );
            }
        }
    }

    pub fn current(&self) -> QualityTier {
        // A poisoned lock degrades to a cautious reading.
        self.current
            .read()
            .map(|tier| *tier)
            .unwrap_or(QualityTier::Poor)
    }

    pub fn timeout_for(&self, base_ms: u64) -> u64 {
        recommended_timeout(self.current(), base_ms)
    }

    pub fn retries_for(&self, base: u32) -> u32 {
        recommended_retries(self.current(), base)
    }
}
