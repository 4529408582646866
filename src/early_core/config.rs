//! Explicit per-invocation configuration for extraction and classification

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

/// Classification thresholds, passed explicitly to every scoring call
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// Latest acceptable time to first trade, in seconds
    pub ttf_ceil_s: f64,
    pub min_swaps_per_min: f64,
    pub min_uniques_10m: f64,
    pub buy_ratio_center: f64,
    pub buy_ratio_tol: f64,
    pub max_concentration: f64,
    /// Minimum `early_score` (0-100) for "Early Leader"
    pub leader_score_min: f64,
}

impl Thresholds {
    pub fn new(
        ttf_ceil_s: f64,
        min_swaps_per_min: f64,
        min_uniques_10m: f64,
        buy_ratio_center: f64,
        buy_ratio_tol: f64,
        max_concentration: f64,
        leader_score_min: f64,
    ) -> Result<Self, ConfigError> {
        let thresholds = Self {
            ttf_ceil_s,
            min_swaps_per_min,
            min_uniques_10m,
            buy_ratio_center,
            buy_ratio_tol,
            max_concentration,
            leader_score_min,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("ttf_ceil_s", self.ttf_ceil_s),
            ("min_swaps_per_min", self.min_swaps_per_min),
            ("min_uniques_10m", self.min_uniques_10m),
            ("buy_ratio_center", self.buy_ratio_center),
            ("buy_ratio_tol", self.buy_ratio_tol),
            ("max_concentration", self.max_concentration),
            ("leader_score_min", self.leader_score_min),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::InvalidThreshold(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if self.ttf_ceil_s < 0.0 {
            return Err(invalid("ttf_ceil_s must be >= 0", self.ttf_ceil_s));
        }
        if self.min_swaps_per_min <= 0.0 {
            return Err(invalid("min_swaps_per_min must be > 0", self.min_swaps_per_min));
        }
        if self.min_uniques_10m <= 0.0 {
            return Err(invalid("min_uniques_10m must be > 0", self.min_uniques_10m));
        }
        if self.buy_ratio_tol <= 0.0 {
            return Err(invalid("buy_ratio_tol must be > 0", self.buy_ratio_tol));
        }
        if !(0.0..=1.0).contains(&self.max_concentration) {
            return Err(invalid("max_concentration must be within [0, 1]", self.max_concentration));
        }
        if !(0.0..=100.0).contains(&self.leader_score_min) {
            return Err(invalid("leader_score_min must be within [0, 100]", self.leader_score_min));
        }

        Ok(())
    }
}

fn invalid(rule: &str, value: f64) -> ConfigError {
    ConfigError::InvalidThreshold(format!("{}, got {}", rule, value))
}

/// Window lengths anchored on the first trade / effective creation instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractorConfig {
    pub burst_window_s: i64,
    pub uniques_window_m: i64,
    pub buy_ratio_window_m: i64,
    pub lp_window_m: i64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            burst_window_s: 120,
            uniques_window_m: 10,
            buy_ratio_window_m: 15,
            lp_window_m: 15,
        }
    }
}

const SECONDS_PER_DAY: i64 = 86_400;
const MINUTES_PER_DAY: i64 = 1_440;

impl ExtractorConfig {
    /// Every window must be positive and at most one day
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("burst_window_s", self.burst_window_s, SECONDS_PER_DAY),
            ("uniques_window_m", self.uniques_window_m, MINUTES_PER_DAY),
            ("buy_ratio_window_m", self.buy_ratio_window_m, MINUTES_PER_DAY),
            ("lp_window_m", self.lp_window_m, MINUTES_PER_DAY),
        ];
        match fields.iter().find(|(_, v, max)| *v <= 0 || v > max) {
            Some((name, value, max)) => Err(ConfigError::InvalidValue(format!(
                "{} must be in 1..={}, got {}",
                name, max, value
            ))),
            None => Ok(()),
        }
    }
}
