//! Concurrent connect-latency probing.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use serde::Serialize;
use tracing::{debug, warn};

use metronome_core::{ConfigError, PriorityHint, ThreadFactory};

use crate::config::ProbeConfig;
use crate::tier::QualityTier;

/// Extra time past the per-probe timeout before the collector stops
/// waiting for stragglers. A probe that misses the collective deadline
/// counts as lost, not awaited.
const COLLECT_MARGIN: Duration = Duration::from_millis(500);

/// Loss above this forces the bottom tier outright.
const SEVERE_LOSS: f64 = 0.20;
/// Loss above this degrades the tier to at least `Poor`.
const ELEVATED_LOSS: f64 = 0.10;

/// Immutable snapshot returned per quality check. Best-effort by
/// construction: individual probe failures feed the loss rate instead
/// of surfacing as errors.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    /// Average over successful probes only; 0 when none succeeded.
    pub avg_latency_ms: u64,
    /// `(probes - successes) / probes`.
    pub loss_rate: f64,
    pub tier: QualityTier,
    /// Latencies of the successful probes, in milliseconds.
    pub samples: Vec<u64>,
}

impl std::fmt::Display for QualityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "network quality: {} (avg {} ms, loss {:.1}%)",
            self.tier,
            self.avg_latency_ms,
            self.loss_rate * 100.0
        )
    }
}

/// Measures connect latency and packet loss with short-lived concurrent
/// probe threads. Stateless between calls; thread-safe.
pub struct NetworkQualityMonitor {
    config: ProbeConfig,
    factory: ThreadFactory,
}

impl NetworkQualityMonitor {
    pub fn new(config: ProbeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            factory: ThreadFactory::new("net-probe", PriorityHint::Normal),
        })
    }

    /// Check against the configured default target.
    pub fn check_default(&self) -> QualityReport {
        self.check_quality(&self.config.host, self.config.port, self.config.samples)
    }

    /// Run `sample_count` concurrent probes against `host:port` and
    /// aggregate them. Blocks until every probe reports or the
    /// collective deadline elapses.
    pub fn check_quality(&self, host: &str, port: u16, sample_count: usize) -> QualityReport {
        let count = sample_count.max(1);
        let timeout = self.config.probe_timeout();

        let Some(addr) = resolve(host, port) else {
            warn!(host, port, "address resolution failed; counting all probes as lost");
            return aggregate(count, Vec::new());
        };

        let (tx, rx) = bounded(count);
        let mut launched = 0;
        for _ in 0..count {
            let probe_tx = tx.clone();
            match self.factory.spawn(move || {
                let _ = probe_tx.send(probe(addr, timeout));
            }) {
                Ok(_) => launched += 1,
                Err(error) => warn!(%error, "failed to spawn probe thread"),
            }
        }
        drop(tx);

        let deadline = Instant::now() + timeout + COLLECT_MARGIN;
        let mut successes = Vec::new();
        let mut received = 0;
        while received < launched {
            match rx.recv_deadline(deadline) {
                Ok(Some(latency_ms)) => {
                    received += 1;
                    successes.push(latency_ms);
                }
                Ok(None) => received += 1,
                // Deadline elapsed; stragglers count as lost.
                Err(_) => break,
            }
        }

        let report = aggregate(count, successes);
        debug!(host, port, %report, "quality check complete");
        report
    }

    /// Single best-effort connectivity probe.
    pub fn is_reachable(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match resolve(host, port) {
            Some(addr) => TcpStream::connect_timeout(&addr, timeout).is_ok(),
            None => false,
        }
    }
}

fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    (host, port).to_socket_addrs().ok()?.next()
}

/// One probe: connect latency in ms, or `None` on failure.
fn probe(addr: SocketAddr, timeout: Duration) -> Option<u64> {
    let start = Instant::now();
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(_) => Some(start.elapsed().as_millis() as u64),
        Err(error) => {
            debug!(%addr, %error, "probe failed");
            None
        }
    }
}

/// Fold probe outcomes into a report. Loss degrades the latency-derived
/// tier: severe loss forces the bottom tier, elevated loss forces at
/// least `Poor`.
fn aggregate(count: usize, successes: Vec<u64>) -> QualityReport {
    let loss_rate = (count - successes.len()) as f64 / count as f64;
    let avg_latency_ms = if successes.is_empty() {
        0
    } else {
        successes.iter().sum::<u64>() / successes.len() as u64
    };

    let mut tier = if successes.is_empty() {
        QualityTier::VeryPoor
    } else {
        QualityTier::from_latency(avg_latency_ms)
    };
    if loss_rate > SEVERE_LOSS {
        tier = QualityTier::VeryPoor;
    } else if loss_rate > ELEVATED_LOSS {
        tier = tier.max(QualityTier::Poor);
    }

    QualityReport {
        avg_latency_ms,
        loss_rate,
        tier,
        samples: successes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn fast_monitor() -> NetworkQualityMonitor {
        NetworkQualityMonitor::new(ProbeConfig {
            probe_timeout_ms: 250,
            ..ProbeConfig::default()
        })
        .unwrap()
    }

    /// A local port with nothing listening on it.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn all_probes_failing_reports_total_loss() {
        let monitor = fast_monitor();
        let report = monitor.check_quality("127.0.0.1", closed_port(), 5);

        assert_eq!(report.loss_rate, 1.0);
        assert_eq!(report.tier, QualityTier::VeryPoor);
        assert_eq!(report.avg_latency_ms, 0);
        assert!(report.samples.is_empty());
    }

    #[test]
    fn loopback_probes_classify_excellent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let monitor = fast_monitor();
        let report = monitor.check_quality("127.0.0.1", port, 4);

        assert_eq!(report.loss_rate, 0.0);
        assert_eq!(report.tier, QualityTier::Excellent);
        assert_eq!(report.samples.len(), 4);
    }

    #[test]
    fn unresolvable_host_counts_as_lost() {
        let monitor = fast_monitor();
        let report = monitor.check_quality("host.invalid.", 80, 3);
        assert_eq!(report.loss_rate, 1.0);
        assert_eq!(report.tier, QualityTier::VeryPoor);
    }

    #[test]
    fn zero_samples_are_coerced_to_one() {
        let monitor = fast_monitor();
        let report = monitor.check_quality("127.0.0.1", closed_port(), 0);
        assert_eq!(report.loss_rate, 1.0);
    }

    #[test]
    fn is_reachable_distinguishes_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let open = listener.local_addr().unwrap().port();
        let monitor = fast_monitor();
        let timeout = Duration::from_millis(250);

        assert!(monitor.is_reachable("127.0.0.1", open, timeout));
        assert!(!monitor.is_reachable("127.0.0.1", closed_port(), timeout));
        assert!(!monitor.is_reachable("host.invalid.", 80, timeout));
    }

    // ── aggregate ───────────────────────────────────────────────────

    #[test]
    fn average_covers_successful_probes_only() {
        let report = aggregate(5, vec![10, 20, 30, 40]);
        assert_eq!(report.avg_latency_ms, 25);
        assert_eq!(report.loss_rate, 0.2);
    }

    #[test]
    fn severe_loss_forces_the_bottom_tier() {
        // Fast samples, but 2 of 5 lost: latency alone says excellent,
        // loss overrides to the bottom tier.
        let report = aggregate(5, vec![10, 12, 14]);
        assert!(report.loss_rate > SEVERE_LOSS);
        assert_eq!(report.tier, QualityTier::VeryPoor);
    }

    #[test]
    fn elevated_loss_degrades_to_at_least_poor() {
        let report = aggregate(10, vec![10, 11, 12, 13, 14, 15, 16, 17]);
        assert_eq!(report.loss_rate, 0.2);
        assert_eq!(report.tier, QualityTier::Poor);
    }

    #[test]
    fn elevated_loss_never_improves_a_bad_tier() {
        // Average 600ms is already the bottom tier; 20% loss must not
        // pull it up to poor.
        let report = aggregate(10, vec![600, 600, 600, 600, 600, 600, 600, 600]);
        assert_eq!(report.tier, QualityTier::VeryPoor);
    }

    #[test]
    fn clean_fast_probes_stay_excellent() {
        let report = aggregate(4, vec![10, 20, 30, 40]);
        assert_eq!(report.avg_latency_ms, 25);
        assert_eq!(report.loss_rate, 0.0);
        assert_eq!(report.tier, QualityTier::Excellent);
    }
}
