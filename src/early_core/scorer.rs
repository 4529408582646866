//! Composite early score (0-100)
//!
//! # Components
//! - Velocity: burst swaps/min against `min_swaps_per_min` (weight 0.35)
//! - Uniques: distinct traders against `min_uniques_10m` (weight 0.35)
//! - Buy ratio: distance from `buy_ratio_center` in tolerances (weight 0.10)
//! - Concentration: dispersion of top-5 buy volume (weight 0.20)
//!
//! Any LP removal in the window applies a 90% haircut to the weighted sum.

use super::config::Thresholds;
use super::extractor::{EarlyMetrics, EPSILON};
use serde::Serialize;

pub const WEIGHT_VELOCITY: f64 = 0.35;
pub const WEIGHT_UNIQUES: f64 = 0.35;
pub const WEIGHT_BUY_RATIO: f64 = 0.10;
pub const WEIGHT_CONCENTRATION: f64 = 0.20;

pub const LP_REMOVAL_HAIRCUT: f64 = 0.9;

/// Sub-score used when the underlying feature is unavailable
pub const NEUTRAL_SUBSCORE: f64 = 0.5;

/// Concentration at which the concentration sub-score starts to fall
pub const CONCENTRATION_PIVOT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub velocity: f64,
    pub uniques: f64,
    pub buy_ratio: f64,
    pub concentration: f64,
    /// 1.0 when any liquidity was removed in the window, else 0.0
    pub lp_removal_penalty: f64,
}

impl SubScores {
    pub fn compute(metrics: &EarlyMetrics, thresholds: &Thresholds) -> Self {
        let velocity = clamp01(
            zero_if_nan(metrics.swaps_per_min_burst) / thresholds.min_swaps_per_min.max(EPSILON),
        );
        let uniques =
            clamp01(metrics.uniq_traders_10m as f64 / thresholds.min_uniques_10m.max(EPSILON));

        let buy_ratio = metrics
            .buy_ratio_15m
            .filter(|br| !br.is_nan())
            .map(|br| {
                clamp01(
                    1.0 - (br - thresholds.buy_ratio_center).abs()
                        / thresholds.buy_ratio_tol.max(EPSILON),
                )
            })
            .unwrap_or(NEUTRAL_SUBSCORE);

        let concentration = metrics
            .top5_concentration
            .filter(|c| !c.is_nan())
            .map(|c| clamp01(1.0 - (c - CONCENTRATION_PIVOT) / CONCENTRATION_PIVOT))
            .unwrap_or(NEUTRAL_SUBSCORE);

        let lp_removal_penalty = if metrics.lp_remove_usd_15 > 0.0 { 1.0 } else { 0.0 };

        Self {
            velocity,
            uniques,
            buy_ratio,
            concentration,
            lp_removal_penalty,
        }
    }

    /// Weighted sum after the LP haircut, clamped to [0, 1]
    pub fn composite(&self) -> f64 {
        let raw = WEIGHT_VELOCITY * self.velocity
            + WEIGHT_UNIQUES * self.uniques
            + WEIGHT_BUY_RATIO * self.buy_ratio
            + WEIGHT_CONCENTRATION * self.concentration;

        clamp01(raw * (1.0 - LP_REMOVAL_HAIRCUT * self.lp_removal_penalty))
    }
}

/// `early_score` in [0, 100], one decimal place
pub fn early_score(metrics: &EarlyMetrics, thresholds: &Thresholds) -> f64 {
    round_one_decimal(SubScores::compute(metrics, thresholds).composite() * 100.0)
}

/// Round half to even at one decimal place
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn zero_if_nan(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}
