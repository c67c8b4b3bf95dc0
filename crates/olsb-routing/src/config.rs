//! Protocol configuration
//!
//! [`OlsbConfig`] holds every tunable of the protocol as a typed field. It is
//! validated once, when the engine is constructed.
//!
//! Protocol variants are expressed by factor values rather than by separate
//! implementations: see [`OlsbConfig::shortest_path_only`],
//! [`OlsbConfig::backpressure_only`] and [`OlsbConfig::blended`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for every configured delay, and for the route lifetime
pub const MAX_DURATION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const ROUTE_LIFETIME: &str = "periodic_update_interval * hold_times";

/// Configuration for the OLSB routing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OlsbConfig {
    /// Interval between full-table broadcasts
    pub periodic_update_interval: Duration,
    /// Delay before a triggered update is broadcast
    pub settling_time: Duration,
    /// Weight of the hop-count term of the metric
    pub shortest_path_factor: f64,
    /// Weight of the queue-size term of the metric
    pub backpressure_factor: f64,
    /// Route lifetime as a multiple of the periodic update interval
    ///
    /// With a 15s interval and 3 hold times, a route not refreshed for 45s
    /// becomes unusable.
    pub hold_times: u32,
    /// Global cap on packets buffered while waiting for a route
    pub max_queue_len: usize,
    /// Cap on buffered packets per destination
    pub max_queued_packets_per_dst: usize,
    /// Maximum time a packet may wait for a route
    pub max_queue_time: Duration,
    /// Buffer packets without a route (when false, lookups simply fail)
    pub enable_buffering: bool,
    /// Derive the settling delay from the destination's update history
    pub enable_weighted_settling_time: bool,
    /// Multiplier applied to the time since the previous update
    pub weighted_factor: f64,
    /// Lower clamp for the weighted settling delay
    pub min_settling_time: Duration,
    /// Batch triggered changes into one broadcast
    pub enable_route_aggregation: bool,
    /// Aggregation window, measured from the first unflushed change
    pub route_aggregation_time: Duration,
    /// Hop count at which the hop term of the metric saturates
    pub max_hop_count: u32,
    /// Seed for the jitter generator (None = OS entropy)
    pub rng_seed: Option<u64>,
}

impl Default for OlsbConfig {
    fn default() -> Self {
        Self {
            periodic_update_interval: Duration::from_secs(15),
            settling_time: Duration::from_secs(5),
            shortest_path_factor: 0.5,
            backpressure_factor: 0.5,
            hold_times: 3,
            max_queue_len: 500,
            max_queued_packets_per_dst: 5,
            max_queue_time: Duration::from_secs(30),
            enable_buffering: true,
            enable_weighted_settling_time: false,
            weighted_factor: 0.875,
            min_settling_time: Duration::from_millis(100),
            enable_route_aggregation: false,
            route_aggregation_time: Duration::from_secs(1),
            max_hop_count: 64,
            rng_seed: None,
        }
    }
}

impl OlsbConfig {
    /// Plain shortest-path routing (queue size ignored)
    pub fn shortest_path_only() -> Self {
        Self::blended(1.0, 0.0)
    }

    /// Pure backpressure routing (hop count ignored)
    pub fn backpressure_only() -> Self {
        Self::blended(0.0, 1.0)
    }

    /// Blend of both metric terms with the given weights
    pub fn blended(shortest_path_factor: f64, backpressure_factor: f64) -> Self {
        Self {
            shortest_path_factor,
            backpressure_factor,
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML
    ///
    /// Missing fields take their default values.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Set the periodic update interval
    pub fn with_periodic_update_interval(mut self, interval: Duration) -> Self {
        self.periodic_update_interval = interval;
        self
    }

    /// Set the settling time
    pub fn with_settling_time(mut self, settling_time: Duration) -> Self {
        self.settling_time = settling_time;
        self
    }

    /// Enable weighted settling time with the given factor
    pub fn with_weighted_settling_time(mut self, factor: f64) -> Self {
        self.enable_weighted_settling_time = true;
        self.weighted_factor = factor;
        self
    }

    /// Enable route aggregation with the given window
    pub fn with_route_aggregation(mut self, window: Duration) -> Self {
        self.enable_route_aggregation = true;
        self.route_aggregation_time = window;
        self
    }

    /// Set the packet queue bounds
    pub fn with_queue_limits(mut self, max_len: usize, per_dst: usize, max_time: Duration) -> Self {
        self.max_queue_len = max_len;
        self.max_queued_packets_per_dst = per_dst;
        self.max_queue_time = max_time;
        self
    }

    /// Enable or disable buffering
    pub fn with_buffering(mut self, enabled: bool) -> Self {
        self.enable_buffering = enabled;
        self
    }

    /// Fix the jitter seed
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// How long an accepted route stays usable without a refresh
    pub fn route_lifetime(&self) -> Duration {
        self.periodic_update_interval
            .checked_mul(self.hold_times)
            .unwrap_or(Duration::MAX)
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.periodic_update_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("periodic_update_interval"));
        }
        if self.hold_times == 0 {
            return Err(ConfigError::ZeroHoldTimes);
        }
        let lifetime = self.periodic_update_interval.checked_mul(self.hold_times);
        if lifetime.is_none_or(|l| l > MAX_DURATION) {
            return Err(ConfigError::DurationTooLong {
                name: ROUTE_LIFETIME,
                max: MAX_DURATION,
            });
        }
        for (name, value) in [
            ("settling_time", self.settling_time),
            ("min_settling_time", self.min_settling_time),
            ("max_queue_time", self.max_queue_time),
            ("route_aggregation_time", self.route_aggregation_time),
        ] {
            if value > MAX_DURATION {
                return Err(ConfigError::DurationTooLong {
                    name,
                    max: MAX_DURATION,
                });
            }
        }
        for (name, value) in [
            ("shortest_path_factor", self.shortest_path_factor),
            ("backpressure_factor", self.backpressure_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidFactor { name, value });
            }
        }
        if self.shortest_path_factor == 0.0 && self.backpressure_factor == 0.0 {
            return Err(ConfigError::NoMetricWeight);
        }
        if self.max_queue_len == 0 || self.max_queued_packets_per_dst == 0 {
            return Err(ConfigError::ZeroQueueBound);
        }
        if self.max_queued_packets_per_dst > self.max_queue_len {
            return Err(ConfigError::PerDestinationCapExceedsGlobal {
                per_dst: self.max_queued_packets_per_dst,
                global: self.max_queue_len,
            });
        }
        if self.max_queue_time.is_zero() {
            return Err(ConfigError::ZeroDuration("max_queue_time"));
        }
        if !(self.weighted_factor > 0.0 && self.weighted_factor <= 1.0) {
            return Err(ConfigError::InvalidFactor {
                name: "weighted_factor",
                value: self.weighted_factor,
            });
        }
        if self.enable_route_aggregation && self.route_aggregation_time.is_zero() {
            return Err(ConfigError::ZeroDuration("route_aggregation_time"));
        }
        if self.max_hop_count == 0 {
            return Err(ConfigError::ZeroHopBound);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("hold_times must be at least 1")]
    ZeroHoldTimes,

    #[error("{name} must not exceed {max:?}")]
    DurationTooLong { name: &'static str, max: Duration },

    #[error("{name} must be a finite non-negative number, got {value}")]
    InvalidFactor { name: &'static str, value: f64 },

    #[error("shortest_path_factor and backpressure_factor cannot both be zero")]
    NoMetricWeight,

    #[error("queue bounds must be greater than zero")]
    ZeroQueueBound,

    #[error("max_queued_packets_per_dst ({per_dst}) exceeds max_queue_len ({global})")]
    PerDestinationCapExceedsGlobal { per_dst: usize, global: usize },

    #[error("max_hop_count must be greater than zero")]
    ZeroHopBound,

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}
