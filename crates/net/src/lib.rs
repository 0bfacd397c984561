//! Network quality measurement and adaptive timeout/retry policy.
//!
//! [`NetworkQualityMonitor`] measures round-trip connect latency and
//! packet loss against a target host and classifies the link into a
//! [`QualityTier`]. The pure policy functions map a tier to scaled
//! timeout and retry budgets; [`AdaptivePolicy`] caches the latest tier
//! so hot paths can read policy without probing.

pub mod config;
pub mod monitor;
pub mod policy;
pub mod tier;

pub use config::ProbeConfig;
pub use monitor::{NetworkQualityMonitor, QualityReport};
pub use policy::AdaptivePolicy;
pub use tier::{recommended_retries, recommended_timeout, QualityTier};
