//! Quality tiers and the pure policy functions over them.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Discrete classification of measured link quality.
///
/// Ordering compares severity explicitly — a "greater" tier is a worse
/// link — so comparisons never lean on declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Average latency 0–50 ms.
    Excellent,
    /// 51–100 ms.
    Good,
    /// 101–200 ms.
    Fair,
    /// 201–500 ms.
    Poor,
    /// Above 500 ms, or heavy packet loss.
    VeryPoor,
}

impl QualityTier {
    /// Explicit severity rank; higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            QualityTier::Excellent => 0,
            QualityTier::Good => 1,
            QualityTier::Fair => 2,
            QualityTier::Poor => 3,
            QualityTier::VeryPoor => 4,
        }
    }

    /// Classify an average latency in milliseconds.
    pub fn from_latency(avg_ms: u64) -> Self {
        match avg_ms {
            0..=50 => QualityTier::Excellent,
            51..=100 => QualityTier::Good,
            101..=200 => QualityTier::Fair,
            201..=500 => QualityTier::Poor,
            _ => QualityTier::VeryPoor,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Poor => "poor",
            QualityTier::VeryPoor => "very poor",
        }
    }
}

impl PartialOrd for QualityTier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QualityTier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Scale a base timeout for the observed tier: a good link shrinks the
/// budget, a bad link grows it.
pub fn recommended_timeout(tier: QualityTier, base_ms: u64) -> u64 {
    let multiplier = match tier {
        QualityTier::Excellent => 0.5,
        QualityTier::Good => 0.8,
        QualityTier::Fair => 1.0,
        QualityTier::Poor => 1.5,
        QualityTier::VeryPoor => 2.0,
    };
    (base_ms as f64 * multiplier).round() as u64
}

/// Scale a base retry budget for the observed tier, floored at one
/// attempt.
pub fn recommended_retries(tier: QualityTier, base: u32) -> u32 {
    let scaled = match tier {
        QualityTier::Excellent => base.saturating_sub(1),
        QualityTier::Good | QualityTier::Fair => base,
        QualityTier::Poor => base.saturating_add(1),
        QualityTier::VeryPoor => base.saturating_add(2),
    };
    scaled.max(1)
}
