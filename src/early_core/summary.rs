//! Ranking, post-filters and per-batch summary of classified pairs

use super::classifier::{Classification, ScoredPair};
use serde::Serialize;
use std::fmt;

/// Sort by `early_score` descending; ties keep their input order
pub fn rank_by_score(rows: &mut [ScoredPair]) {
    rows.sort_by(|a, b| b.early_score.total_cmp(&a.early_score));
}

/// Drop pairs below `min_market_cap_usd` (unknown market cap counts as 0), then keep the first `max_rows`
pub fn filter_by_market_cap(
    rows: Vec<ScoredPair>,
    min_market_cap_usd: f64,
    max_rows: usize,
) -> Vec<ScoredPair> {
    rows.into_iter()
        .filter(|row| {
            let market_cap = row.row.pair.market_cap_usd;
            let market_cap = if market_cap.is_nan() { 0.0 } else { market_cap };
            market_cap >= min_market_cap_usd
        })
        .take(max_rows)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub leaders: usize,
    pub hype: usize,
    pub losers: usize,
    pub avg_score: Option<f64>,
    pub max_score: Option<f64>,
}

impl BatchSummary {
    pub fn from_scored(rows: &[ScoredPair]) -> Self {
        let total = rows.len();
        let count = |wanted: fn(&Classification) -> bool| {
            rows.iter().filter(|r| wanted(&r.classification)).count()
        };

        let scores = rows.iter().map(|r| r.early_score);
        let max_score = scores.clone().reduce(f64::max);
        let avg_score = (total > 0).then(|| scores.sum::<f64>() / total as f64);

        Self {
            total,
            leaders: count(|c| *c == Classification::EarlyLeader),
            hype: count(|c| *c == Classification::HypeRisky),
            losers: count(Classification::is_loser),
            avg_score,
            max_score,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pairs={} leaders={} hype={} losers={}",
            self.total, self.leaders, self.hype, self.losers
        )?;
        match (self.avg_score, self.max_score) {
            (Some(avg), Some(max)) => write!(f, " avg_score={:.1} max_score={:.1}", avg, max),
            _ => Ok(()),
        }
    }
}
