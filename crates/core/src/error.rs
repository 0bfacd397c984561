use thiserror::Error;

/// Construction-time validation failure.
///
/// Raised before any threads are spawned; a component with an invalid
/// config is never created.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroField { field: &'static str },

    #[error("pool sizes must satisfy min <= initial <= max, got {min}/{initial}/{max}")]
    SizeOrdering {
        min: usize,
        initial: usize,
        max: usize,
    },

    #[error("{field} must lie within (0, 1), got {value}")]
    RatioRange { field: &'static str, value: f64 },

    #[error("low_cpu_threshold ({low}) must be below high_cpu_threshold ({high})")]
    ThresholdOrdering { low: f64, high: f64 },
}
