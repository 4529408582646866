//! Windowed feature extraction
//!
//! Every pair is processed independently by [`compute_pair_metrics`], a pure
//! function of the pair and its own events. [`compute_early_metrics`] groups
//! the event tables by pair once and maps that function over the batch.
//!
//! ```text
//! effective_created_at
//!   ├─ swaps (ts >= created) ─ first trade ─┬─ burst window    → swaps_in_burst, swaps_per_min_burst
//!   │                                       ├─ uniques window  → uniq_traders_10m
//!   │                                       └─ ratio window    → buy_ratio_15m, top5_concentration
//!   ├─ window metrics [created, +ratio]     → buy_ratio_15m fallback
//!   └─ liquidity events [created, +lp]      → lp_add_usd_15, lp_remove_usd_15
//! ```

use super::config::ExtractorConfig;
use super::fallback::{first_available, BuyRatioSource, AMOUNT_PRIORITY, BUY_RATIO_SOURCES};
use super::types::{
    finite_or_null, LiquidityEvent, LpAction, Pair, Swap, TradeSide, WindowMetric,
};
use super::window::{seconds_between, TimeWindow};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Number of top traders in the concentration ratio
pub const TOP_TRADERS: usize = 5;

/// Guards divisions by user-configurable lengths and thresholds
pub const EPSILON: f64 = 1e-9;

/// Derived early-behavior features for one pair
///
/// Every field has a defined sentinel so scoring never branches on absence:
/// `time_to_first_trade_s` is `+inf` when the pair never traded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarlyMetrics {
    #[serde(serialize_with = "finite_or_null")]
    pub time_to_first_trade_s: f64,
    pub first_trade_ts: Option<DateTime<Utc>>,
    pub swaps_in_burst: u64,
    pub swaps_per_min_burst: f64,
    pub uniq_traders_10m: u64,
    pub buy_ratio_15m: Option<f64>,
    pub top5_concentration: Option<f64>,
    #[serde(serialize_with = "finite_or_null")]
    pub lp_add_usd_15: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub lp_remove_usd_15: f64,
}

impl Default for EarlyMetrics {
    fn default() -> Self {
        Self {
            time_to_first_trade_s: f64::INFINITY,
            first_trade_ts: None,
            swaps_in_burst: 0,
            swaps_per_min_burst: 0.0,
            uniq_traders_10m: 0,
            buy_ratio_15m: None,
            top5_concentration: None,
            lp_add_usd_15: 0.0,
            lp_remove_usd_15: 0.0,
        }
    }
}

/// A pair augmented with its early metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairMetrics {
    #[serde(flatten)]
    pub pair: Pair,
    pub effective_created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metrics: EarlyMetrics,
}

/// Events belonging to one pair
#[derive(Debug, Default, Clone)]
pub struct PairEvents<'a> {
    pub swaps: Vec<&'a Swap>,
    pub window_metrics: Vec<&'a WindowMetric>,
    pub liquidity_events: Vec<&'a LiquidityEvent>,
}

/// Read-only event tables grouped by pair address
#[derive(Debug, Default)]
pub struct EventIndex<'a> {
    by_pair: HashMap<&'a str, PairEvents<'a>>,
}

impl<'a> EventIndex<'a> {
    pub fn build(
        swaps: &'a [Swap],
        window_metrics: &'a [WindowMetric],
        liquidity_events: &'a [LiquidityEvent],
    ) -> Self {
        let mut by_pair: HashMap<&'a str, PairEvents<'a>> = HashMap::new();

        for swap in swaps {
            if let Some(pair) = swap.pair_address.as_deref() {
                by_pair.entry(pair).or_default().swaps.push(swap);
            }
        }
        for metric in window_metrics {
            if let Some(pair) = metric.pair_address.as_deref() {
                by_pair.entry(pair).or_default().window_metrics.push(metric);
            }
        }
        for event in liquidity_events {
            if let Some(pair) = event.pair_address.as_deref() {
                by_pair.entry(pair).or_default().liquidity_events.push(event);
            }
        }

        Self { by_pair }
    }

    pub fn events_for(&self, pair_address: &str) -> PairEvents<'a> {
        self.by_pair.get(pair_address).cloned().unwrap_or_default()
    }
}

/// Compute the early metrics of every pair; output order and length match `pairs`
pub fn compute_early_metrics(
    pairs: &[Pair],
    swaps: &[Swap],
    window_metrics: &[WindowMetric],
    liquidity_events: &[LiquidityEvent],
    config: &ExtractorConfig,
) -> Vec<PairMetrics> {
    let index = EventIndex::build(swaps, window_metrics, liquidity_events);

    log::debug!(
        "🧮 Extracting early metrics: pairs={} swaps={} window_metrics={} lp_events={}",
        pairs.len(),
        swaps.len(),
        window_metrics.len(),
        liquidity_events.len()
    );

    pairs
        .iter()
        .map(|pair| {
            let events = pair
                .pair_address
                .as_deref()
                .map(|address| index.events_for(address))
                .unwrap_or_default();

            PairMetrics {
                pair: pair.clone(),
                effective_created_at: pair.effective_created_at(),
                metrics: compute_pair_metrics(pair, &events, config),
            }
        })
        .collect()
}

/// Early metrics of a single pair from its own events
pub fn compute_pair_metrics(
    pair: &Pair,
    events: &PairEvents<'_>,
    config: &ExtractorConfig,
) -> EarlyMetrics {
    let mut metrics = EarlyMetrics::default();

    let created = match (pair.pair_address.as_ref(), pair.effective_created_at()) {
        (Some(_), Some(created)) => created,
        _ => return metrics,
    };

    let mut swaps: Vec<&Swap> = events
        .swaps
        .iter()
        .copied()
        .filter(|s| s.ts.map_or(false, |ts| ts >= created))
        .collect();
    swaps.sort_by(|a, b| compare_swaps(a, b));

    if let Some(first_trade) = swaps.first().and_then(|s| s.ts) {
        metrics.first_trade_ts = Some(first_trade);
        metrics.time_to_first_trade_s = seconds_between(created, first_trade).max(0.0);

        let burst = TimeWindow::anchored(first_trade, Duration::seconds(config.burst_window_s));
        let burst_count = burst.select(&swaps, |s| s.ts).len() as u64;
        metrics.swaps_in_burst = burst_count;
        metrics.swaps_per_min_burst =
            burst_count as f64 / (config.burst_window_s as f64 / 60.0).max(EPSILON);

        let uniques = TimeWindow::anchored(first_trade, Duration::minutes(config.uniques_window_m));
        let traders: HashSet<&str> = uniques
            .select(&swaps, |s| s.ts)
            .into_iter()
            .filter_map(|s| s.trader_wallet.as_deref())
            .collect();
        metrics.uniq_traders_10m = traders.len() as u64;

        let ratio_window =
            TimeWindow::anchored(first_trade, Duration::minutes(config.buy_ratio_window_m));
        let ratio_swaps = ratio_window.select(&swaps, |s| s.ts);
        let fallback_window =
            TimeWindow::anchored(created, Duration::minutes(config.buy_ratio_window_m));

        metrics.buy_ratio_15m = buy_ratio(&ratio_swaps, &events.window_metrics, fallback_window);
        metrics.top5_concentration = top_trader_concentration(&ratio_swaps, TOP_TRADERS);
    }

    let lp_window = TimeWindow::anchored(created, Duration::minutes(config.lp_window_m));
    let (added, removed) = liquidity_totals(&events.liquidity_events, lp_window);
    metrics.lp_add_usd_15 = added;
    metrics.lp_remove_usd_15 = removed;

    metrics
}

/// Total order over swaps so windowing never depends on fetch order
fn compare_swaps(a: &Swap, b: &Swap) -> Ordering {
    a.ts.cmp(&b.ts)
        .then_with(|| a.trader_wallet.cmp(&b.trader_wallet))
        .then_with(|| a.side.cmp(&b.side))
        .then_with(|| a.amount_usd.total_cmp(&b.amount_usd))
        .then_with(|| a.amount_in.total_cmp(&b.amount_in))
        .then_with(|| a.amount_out.total_cmp(&b.amount_out))
}

fn has_side_data(swaps: &[&Swap]) -> bool {
    swaps.iter().any(|s| s.side.is_some())
}

fn buy_ratio(
    ratio_swaps: &[&Swap],
    window_metrics: &[&WindowMetric],
    fallback_window: TimeWindow,
) -> Option<f64> {
    first_available(&BUY_RATIO_SOURCES, |source| match source {
        BuyRatioSource::SwapSides => ratio_from_sides(ratio_swaps),
        BuyRatioSource::WindowMetrics => ratio_from_window_metrics(window_metrics, fallback_window),
    })
    .map(|(source, ratio)| {
        log::trace!("buy ratio {:.3} from {:?}", ratio, source);
        ratio
    })
}

fn ratio_from_sides(swaps: &[&Swap]) -> Option<f64> {
    if !has_side_data(swaps) {
        return None;
    }

    let buys = swaps.iter().filter(|s| s.side == Some(TradeSide::Buy)).count() as f64;
    let sells = swaps.len() as f64 - buys;
    Some(buys / (buys + sells).max(1.0))
}

fn ratio_from_window_metrics(metrics: &[&WindowMetric], window: TimeWindow) -> Option<f64> {
    let in_window = window.select(metrics, |m| m.snapshot_ts);
    if in_window.is_empty() {
        return None;
    }

    let buys: f64 = in_window.iter().map(|m| nan_to_zero(m.buys)).sum();
    let sells: f64 = in_window.iter().map(|m| nan_to_zero(m.sells)).sum();
    let total = buys + sells;
    if total > 0.0 {
        Some(buys / total.max(1.0))
    } else {
        None
    }
}

/// Buy-side swaps of a window: labelled buys when any side is known,
/// otherwise every other swap in time order starting with the first
fn buy_side<'a>(swaps: &[&'a Swap]) -> Vec<&'a Swap> {
    if has_side_data(swaps) {
        swaps
            .iter()
            .copied()
            .filter(|s| s.side == Some(TradeSide::Buy))
            .collect()
    } else {
        swaps.iter().copied().step_by(2).collect()
    }
}

fn top_trader_concentration(swaps: &[&Swap], top_n: usize) -> Option<f64> {
    let buys = buy_side(swaps);
    if buys.is_empty() {
        return None;
    }

    let weight_field = first_available(&AMOUNT_PRIORITY, |field| {
        buys.iter().any(|s| !s.amount(field).is_nan()).then_some(())
    })
    .map(|(field, _)| field);
    log::trace!(
        "concentration weight: {}",
        weight_field.map_or("uniform", |field| field.column())
    );

    let mut per_trader: HashMap<&str, f64> = HashMap::new();
    for swap in &buys {
        let Some(trader) = swap.trader_wallet.as_deref() else {
            continue;
        };
        let weight = weight_field.map_or(1.0, |field| nan_to_zero(swap.amount(field)));
        *per_trader.entry(trader).or_insert(0.0) += weight;
    }

    let mut volumes: Vec<f64> = per_trader.into_values().collect();
    volumes.sort_by(|a, b| b.total_cmp(a));

    let total: f64 = volumes.iter().sum();
    if total > 0.0 {
        let top: f64 = volumes.iter().take(top_n).sum();
        Some(top / total)
    } else {
        None
    }
}

fn liquidity_totals(events: &[&LiquidityEvent], window: TimeWindow) -> (f64, f64) {
    window
        .select(events, |e| e.ts)
        .into_iter()
        .fold((0.0, 0.0), |(added, removed), event| match event.action {
            Some(LpAction::Add) => (added + nan_to_zero(event.value_usd), removed),
            Some(LpAction::Remove) => (added, removed + nan_to_zero(event.value_usd)),
            None => (added, removed),
        })
}

fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}
