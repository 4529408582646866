//! Gate evaluation and the ordered classification procedure
//!
//! # Priority
//! Rules are evaluated top to bottom and the first match wins:
//! 1. Early Leader: velocity, uniques, buy ratio and concentration gates pass
//!    and the score reaches `leader_score_min`
//! 2. Hype / Risky: score >= 35, or velocity passes with uniques or buy ratio
//! 3. Loser (no early trades): first trade later than `ttf_ceil_s` or never
//! 4. Loser (early LP remove): liquidity removed inside the LP window
//! 5. Loser

use super::config::Thresholds;
use super::extractor::{EarlyMetrics, PairMetrics};
use super::scorer::{early_score, CONCENTRATION_PIVOT};
use serde::{Serialize, Serializer};
use std::fmt;

/// Minimum score for "Hype / Risky" regardless of gates
pub const HYPE_SCORE_MIN: f64 = 35.0;

pub const LEADER_REASON: &str = "Velocity+Uniques+Balance+Dispersion";
pub const NO_TRADE_REASON: &str = "No trade within horizon.";
pub const LP_REMOVED_REASON: &str = "LP removed within window.";
pub const BORDERLINE_REASON: &str = "Borderline";
pub const WEAK_REASON: &str = "Weak";

const REASON_SEPARATOR: &str = " & ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    EarlyLeader,
    HypeRisky,
    LoserNoEarlyTrades,
    LoserEarlyLpRemove,
    Loser,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::EarlyLeader => "Early Leader",
            Classification::HypeRisky => "Hype / Risky",
            Classification::LoserNoEarlyTrades => "Loser (no early trades)",
            Classification::LoserEarlyLpRemove => "Loser (early LP remove)",
            Classification::Loser => "Loser",
        }
    }

    pub fn is_loser(&self) -> bool {
        matches!(
            self,
            Classification::LoserNoEarlyTrades
                | Classification::LoserEarlyLpRemove
                | Classification::Loser
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Independent pass/fail checks on raw features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gates {
    pub tradeable: bool,
    pub velocity_ok: bool,
    pub uniques_ok: bool,
    /// True when no buy ratio could be derived
    pub buy_ratio_ok: bool,
    /// Missing concentration is compared as 0.50
    pub concentration_ok: bool,
    pub lp_ok: bool,
}

impl Gates {
    pub fn evaluate(metrics: &EarlyMetrics, thresholds: &Thresholds) -> Self {
        let ttf = if metrics.time_to_first_trade_s.is_nan() {
            f64::INFINITY
        } else {
            metrics.time_to_first_trade_s
        };

        let buy_ratio_ok = match metrics.buy_ratio_15m.filter(|br| !br.is_nan()) {
            Some(br) => {
                br >= thresholds.buy_ratio_center - thresholds.buy_ratio_tol
                    && br <= thresholds.buy_ratio_center + thresholds.buy_ratio_tol
            }
            None => true,
        };

        let concentration = metrics
            .top5_concentration
            .filter(|c| !c.is_nan())
            .unwrap_or(CONCENTRATION_PIVOT);

        Self {
            tradeable: ttf <= thresholds.ttf_ceil_s,
            velocity_ok: metrics.swaps_per_min_burst >= thresholds.min_swaps_per_min,
            uniques_ok: metrics.uniq_traders_10m as f64 >= thresholds.min_uniques_10m,
            buy_ratio_ok,
            concentration_ok: concentration <= thresholds.max_concentration,
            lp_ok: !(metrics.lp_remove_usd_15 > 0.0),
        }
    }

    fn all_leader_gates(&self) -> bool {
        self.velocity_ok && self.uniques_ok && self.buy_ratio_ok && self.concentration_ok
    }
}

/// Label and reason for one pair
pub fn classify(gates: &Gates, score: f64, thresholds: &Thresholds) -> (Classification, String) {
    if gates.all_leader_gates() && score >= thresholds.leader_score_min {
        return (Classification::EarlyLeader, LEADER_REASON.to_string());
    }

    if score >= HYPE_SCORE_MIN || (gates.velocity_ok && (gates.uniques_ok || gates.buy_ratio_ok)) {
        let failed = [
            (!gates.concentration_ok, "Concentration"),
            (!gates.uniques_ok, "Uniques"),
            (!gates.buy_ratio_ok, "BuyRatio"),
        ];
        return (Classification::HypeRisky, join_failed(&failed, BORDERLINE_REASON));
    }

    if !gates.tradeable {
        return (Classification::LoserNoEarlyTrades, NO_TRADE_REASON.to_string());
    }

    if !gates.lp_ok {
        return (Classification::LoserEarlyLpRemove, LP_REMOVED_REASON.to_string());
    }

    let failed = [
        (!gates.velocity_ok, "Low velocity"),
        (!gates.uniques_ok, "Low uniques"),
        (!gates.buy_ratio_ok, "Unbalanced flow"),
    ];
    (Classification::Loser, join_failed(&failed, WEAK_REASON))
}

fn join_failed(checks: &[(bool, &str)], fallback: &str) -> String {
    let failed: Vec<&str> = checks
        .iter()
        .filter(|(failed, _)| *failed)
        .map(|(_, name)| *name)
        .collect();

    if failed.is_empty() {
        fallback.to_string()
    } else {
        failed.join(REASON_SEPARATOR)
    }
}

/// A pair with its metrics, score, label and reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPair {
    #[serde(flatten)]
    pub row: PairMetrics,
    pub early_score: f64,
    pub classification: Classification,
    pub reason: String,
}

/// Score and label every row; output order and length match the input
pub fn score_and_classify(rows: Vec<PairMetrics>, thresholds: &Thresholds) -> Vec<ScoredPair> {
    rows.into_iter()
        .map(|row| {
            let score = early_score(&row.metrics, thresholds);
            let gates = Gates::evaluate(&row.metrics, thresholds);
            let (classification, reason) = classify(&gates, score, thresholds);

            log::trace!(
                "{:?} score={} gates={:?} -> {}",
                row.pair.pair_address,
                score,
                gates,
                classification
            );

            ScoredPair {
                row,
                early_score: score,
                classification,
                reason,
            }
        })
        .collect()
}
