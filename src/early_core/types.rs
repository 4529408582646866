//! Typed views over the four input tables
//!
//! Decoding never fails: a missing or malformed cell becomes `None` or `NaN`.

use super::fallback::{first_available, AmountField};
use super::normalizer::{instant_cell, numeric_cell, text_cell, Row};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Columns that may carry the base-token identifier, in lookup order
pub const TOKEN_COLUMNS: [&str; 6] = [
    "base_token",
    "token_address",
    "token",
    "token_addr",
    "mint",
    "mint_address",
];

/// Numeric columns of the pairs table
pub const PAIR_NUMERIC_COLUMNS: [&str; 3] = ["price_usd", "fdv_usd", "market_cap_usd"];

/// Numeric columns of the swaps table
pub const SWAP_NUMERIC_COLUMNS: [&str; 4] = ["amount_in", "amount_out", "amount_usd", "price_usd"];

/// Numeric columns of the window-metrics table
pub const WINDOW_METRIC_NUMERIC_COLUMNS: [&str; 4] =
    ["price_change_pct", "buys", "sells", "volume_usd"];

/// Numeric columns of the liquidity-events table
pub const LIQUIDITY_NUMERIC_COLUMNS: [&str; 1] = ["value_usd"];

/// Serialize `NaN`/infinite floats as `null`
pub(crate) fn finite_or_null<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pair {
    pub pair_address: Option<String>,
    pub base_token: Option<String>,
    pub base_token_name: Option<String>,
    pub base_token_symbol: Option<String>,
    pub pair_created_at: Option<DateTime<Utc>>,
    pub snapshot_ts: Option<DateTime<Utc>>,
    #[serde(serialize_with = "finite_or_null")]
    pub price_usd: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub fdv_usd: f64,
    #[serde(serialize_with = "finite_or_null")]
    pub market_cap_usd: f64,
}

impl Pair {
    pub fn from_row(row: &Row) -> Self {
        let base_token = first_available(&TOKEN_COLUMNS, |col| text_cell(row, col)).map(|(_, t)| t);

        Self {
            pair_address: text_cell(row, "pair_address"),
            base_token,
            base_token_name: text_cell(row, "base_token_name"),
            base_token_symbol: text_cell(row, "base_token_symbol"),
            pair_created_at: instant_cell(row, "pair_created_at"),
            snapshot_ts: instant_cell(row, "snapshot_ts"),
            price_usd: numeric_cell(row, "price_usd"),
            fdv_usd: numeric_cell(row, "fdv_usd"),
            market_cap_usd: numeric_cell(row, "market_cap_usd"),
        }
    }

    /// Venue-reported creation instant, else the first observed snapshot
    pub fn effective_created_at(&self) -> Option<DateTime<Utc>> {
        self.pair_created_at.or(self.snapshot_ts)
    }
}

/// Trade direction. Any non-empty side other than `buy` counts as a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn parse(raw: &str) -> Option<Self> {
        let side = raw.trim();
        if side.is_empty() {
            None
        } else if side.eq_ignore_ascii_case("buy") {
            Some(TradeSide::Buy)
        } else {
            Some(TradeSide::Sell)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Swap {
    pub pair_address: Option<String>,
    pub ts: Option<DateTime<Utc>>,
    pub trader_wallet: Option<String>,
    pub side: Option<TradeSide>,
    pub amount_in: f64,
    pub amount_out: f64,
    pub amount_usd: f64,
}

impl Swap {
    pub fn from_row(row: &Row) -> Self {
        Self {
            pair_address: text_cell(row, "pair_address"),
            ts: instant_cell(row, "ts"),
            trader_wallet: text_cell(row, "trader_wallet"),
            side: text_cell(row, "side").and_then(|s| TradeSide::parse(&s)),
            amount_in: numeric_cell(row, "amount_in"),
            amount_out: numeric_cell(row, "amount_out"),
            amount_usd: numeric_cell(row, "amount_usd"),
        }
    }

    pub fn amount(&self, field: AmountField) -> f64 {
        match field {
            AmountField::Usd => self.amount_usd,
            AmountField::In => self.amount_in,
            AmountField::Out => self.amount_out,
        }
    }
}

/// Periodic pre-aggregated bucket for one pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowMetric {
    pub pair_address: Option<String>,
    pub window_code: Option<String>,
    pub price_change_pct: f64,
    pub buys: f64,
    pub sells: f64,
    pub volume_usd: f64,
    pub snapshot_ts: Option<DateTime<Utc>>,
}

impl WindowMetric {
    pub fn from_row(row: &Row) -> Self {
        Self {
            pair_address: text_cell(row, "pair_address"),
            window_code: text_cell(row, "window_code"),
            price_change_pct: numeric_cell(row, "price_change_pct"),
            buys: numeric_cell(row, "buys"),
            sells: numeric_cell(row, "sells"),
            volume_usd: numeric_cell(row, "volume_usd"),
            snapshot_ts: instant_cell(row, "snapshot_ts"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LpAction {
    Add,
    Remove,
}

impl LpAction {
    /// Case-insensitive; anything other than add/remove is ignored
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "add" => Some(LpAction::Add),
            "remove" => Some(LpAction::Remove),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityEvent {
    pub pair_address: Option<String>,
    pub ts: Option<DateTime<Utc>>,
    pub action: Option<LpAction>,
    pub value_usd: f64,
}

impl LiquidityEvent {
    pub fn from_row(row: &Row) -> Self {
        Self {
            pair_address: text_cell(row, "pair_address"),
            ts: instant_cell(row, "ts"),
            action: text_cell(row, "action").and_then(|a| LpAction::parse(&a)),
            value_usd: numeric_cell(row, "value_usd"),
        }
    }
}
