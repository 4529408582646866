//! Chunked fetches that assemble the input tables for one scoring pass
//!
//! Identifier lists are split into fixed-size chunks so `in.(...)` predicates
//! stay under upstream URL/payload limits; each chunk is paged by row range
//! until a short page comes back. Results are concatenated in chunk order.
//! Chunk and page sizes never change the assembled tables.
//!
//! Event-table chunk failures are logged and skipped (the core accepts empty
//! tables). Candidate-pair failures propagate.

use crate::early_core::normalizer::{
    floor_to_second, format_iso_utc, instant_cell, text_cell, to_numeric_columns, Row,
};
use crate::early_core::types::{
    LiquidityEvent, Pair, Swap, WindowMetric, LIQUIDITY_NUMERIC_COLUMNS, PAIR_NUMERIC_COLUMNS,
    SWAP_NUMERIC_COLUMNS, WINDOW_METRIC_NUMERIC_COLUMNS,
};
use crate::source::{Filter, SourceError, TableQuery, TableSource};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const PAIR_COLUMNS: [&str; 9] = [
    "pair_address",
    "base_token",
    "base_token_name",
    "base_token_symbol",
    "pair_created_at",
    "snapshot_ts",
    "price_usd",
    "fdv_usd",
    "market_cap_usd",
];

pub const SWAP_COLUMNS: [&str; 7] = [
    "pair_address",
    "ts",
    "trader_wallet",
    "side",
    "amount_in",
    "amount_out",
    "amount_usd",
];

pub const WINDOW_METRIC_COLUMNS: [&str; 7] = [
    "pair_address",
    "window_code",
    "price_change_pct",
    "buys",
    "sells",
    "volume_usd",
    "snapshot_ts",
];

pub const LIQUIDITY_COLUMNS: [&str; 4] = ["pair_address", "ts", "action", "value_usd"];

/// Tiebreak keys after the time column so row ranges page deterministically
const SWAP_TIEBREAK: [&str; 5] = ["pair_address", "trader_wallet", "side", "amount_usd", "amount_in"];
const WINDOW_METRIC_TIEBREAK: [&str; 1] = ["pair_address"];
const LIQUIDITY_TIEBREAK: [&str; 3] = ["pair_address", "action", "value_usd"];

/// Periodic aggregate bucket used for the buy-ratio fallback
pub const WINDOW_CODE: &str = "m5";

/// Row cap for launch-radar candidate queries
pub const RADAR_FETCH_LIMIT: usize = 2000;

/// Rows fetched per token when resolving the latest pair of each token
const PAIRS_PER_TOKEN: usize = 6;

/// Chunk and page sizes for batch fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub swap_chunk: usize,
    pub event_chunk: usize,
    pub token_chunk: usize,
    pub pair_map_chunk: usize,
    pub swap_page: usize,
    pub window_metric_page: usize,
    pub liquidity_page: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            swap_chunk: 120,
            event_chunk: 200,
            token_chunk: 150,
            pair_map_chunk: 120,
            swap_page: 10_000,
            window_metric_page: 5_000,
            liquidity_page: 20_000,
        }
    }
}

/// The three event tables for a batch of pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTables {
    pub swaps: Vec<Swap>,
    pub window_metrics: Vec<WindowMetric>,
    pub liquidity_events: Vec<LiquidityEvent>,
}

/// Parameters of early-leader candidate selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateWindow {
    pub max_pairs: usize,
    pub recency_hours: i64,
    pub max_age_minutes: i64,
}

/// Distinct non-empty identifiers, first occurrence order
pub fn unique_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Fetch every row matching `query`, `page_size` rows at a time
///
/// `query` should be ordered on a unique key so row ranges do not overlap.
/// A failure on the first page is an error; a failure on a later page keeps
/// the rows already fetched.
pub async fn fetch_all_pages(
    source: &dyn TableSource,
    query: &TableQuery,
    page_size: usize,
) -> Result<Vec<Row>, SourceError> {
    let page_size = page_size.max(1);
    let mut rows = Vec::new();
    let mut offset = query.offset;

    loop {
        let page = match source.fetch(&query.clone().limit(page_size).offset(offset)).await {
            Ok(page) => page,
            Err(e) if rows.is_empty() => return Err(e),
            Err(e) => {
                log::warn!(
                    "⚠️  {} page at offset {} failed, keeping {} rows: {}",
                    query.table,
                    offset,
                    rows.len(),
                    e
                );
                break;
            }
        };
        let returned = page.len();
        rows.extend(page);

        if returned < page_size {
            break;
        }
        offset += page_size;
    }

    Ok(rows)
}

fn ordered(query: TableQuery, time_column: &str, tiebreak: &[&str]) -> TableQuery {
    tiebreak
        .iter()
        .fold(query.order_by(time_column, false), |q, column| q.order_by(column, false))
}

/// Run `base` once per chunk of `ids` (as an `in` filter on `key_column`) and concatenate
pub async fn fetch_chunked(
    source: &dyn TableSource,
    base: &TableQuery,
    key_column: &str,
    ids: &[String],
    chunk_size: usize,
    page_size: usize,
) -> Vec<Row> {
    let mut rows = Vec::new();
    let chunks = ids.chunks(chunk_size.max(1));
    let chunk_count = chunks.len();

    for (idx, chunk) in chunks.enumerate() {
        let query = base.clone().filter(Filter::any_of(key_column, chunk));
        match fetch_all_pages(source, &query, page_size).await {
            Ok(page) => {
                log::debug!(
                    "   ├─ {} chunk {}/{}: {} ids → {} rows",
                    base.table,
                    idx + 1,
                    chunk_count,
                    chunk.len(),
                    page.len()
                );
                rows.extend(page);
            }
            Err(e) => {
                log::warn!(
                    "⚠️  {} chunk {}/{} failed, continuing without it: {}",
                    base.table,
                    idx + 1,
                    chunk_count,
                    e
                );
            }
        }
    }

    rows
}

pub async fn fetch_swaps_for_pairs(
    source: &dyn TableSource,
    pair_ids: &[String],
    since: DateTime<Utc>,
    options: &BatchOptions,
) -> Vec<Swap> {
    let base = TableQuery::new("swaps")
        .select(&SWAP_COLUMNS)
        .filter(Filter::gte("ts", format_iso_utc(since)));
    let base = ordered(base, "ts", &SWAP_TIEBREAK);

    let mut rows = fetch_chunked(
        source,
        &base,
        "pair_address",
        pair_ids,
        options.swap_chunk,
        options.swap_page,
    )
    .await;
    to_numeric_columns(&mut rows, &SWAP_NUMERIC_COLUMNS);
    rows.iter().map(Swap::from_row).collect()
}

pub async fn fetch_window_metrics_for_pairs(
    source: &dyn TableSource,
    pair_ids: &[String],
    since: DateTime<Utc>,
    options: &BatchOptions,
) -> Vec<WindowMetric> {
    let base = TableQuery::new("pair_window_metrics")
        .select(&WINDOW_METRIC_COLUMNS)
        .filter(Filter::eq("window_code", WINDOW_CODE))
        .filter(Filter::gte("snapshot_ts", format_iso_utc(since)));
    let base = ordered(base, "snapshot_ts", &WINDOW_METRIC_TIEBREAK);

    let mut rows = fetch_chunked(
        source,
        &base,
        "pair_address",
        pair_ids,
        options.event_chunk,
        options.window_metric_page,
    )
    .await;
    to_numeric_columns(&mut rows, &WINDOW_METRIC_NUMERIC_COLUMNS);
    rows.iter().map(WindowMetric::from_row).collect()
}

pub async fn fetch_liquidity_events_for_pairs(
    source: &dyn TableSource,
    pair_ids: &[String],
    since: DateTime<Utc>,
    options: &BatchOptions,
) -> Vec<LiquidityEvent> {
    let base = TableQuery::new("liquidity_events")
        .select(&LIQUIDITY_COLUMNS)
        .filter(Filter::gte("ts", format_iso_utc(since)));
    let base = ordered(base, "ts", &LIQUIDITY_TIEBREAK);

    let mut rows = fetch_chunked(
        source,
        &base,
        "pair_address",
        pair_ids,
        options.event_chunk,
        options.liquidity_page,
    )
    .await;
    to_numeric_columns(&mut rows, &LIQUIDITY_NUMERIC_COLUMNS);
    rows.iter().map(LiquidityEvent::from_row).collect()
}

/// Swaps, m5 window metrics and liquidity events for `pair_ids`, all at or after `since`
pub async fn fetch_event_tables(
    source: &dyn TableSource,
    pair_ids: &[String],
    since: DateTime<Utc>,
    options: &BatchOptions,
) -> EventTables {
    if pair_ids.is_empty() {
        return EventTables::default();
    }

    let (swaps, window_metrics, liquidity_events) = tokio::join!(
        fetch_swaps_for_pairs(source, pair_ids, since, options),
        fetch_window_metrics_for_pairs(source, pair_ids, since, options),
        fetch_liquidity_events_for_pairs(source, pair_ids, since, options),
    );

    log::info!(
        "📊 Event tables: pairs={} swaps={} window_metrics={} lp_events={}",
        pair_ids.len(),
        swaps.len(),
        window_metrics.len(),
        liquidity_events.len()
    );

    EventTables {
        swaps,
        window_metrics,
        liquidity_events,
    }
}

fn decode_pairs(mut rows: Vec<Row>) -> Vec<Pair> {
    to_numeric_columns(&mut rows, &PAIR_NUMERIC_COLUMNS);
    let pairs: Vec<Pair> = rows.iter().map(Pair::from_row).collect();

    // One row per pair; the first (most recent snapshot) wins
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(|p| match p.pair_address.as_deref() {
            Some(address) => seen.insert(address.to_string()),
            None => true,
        })
        .collect()
}

/// Pairs observed in the last `recency_hours`, created (or first seen) within `max_age_minutes`
pub async fn fetch_recent_pairs(
    source: &dyn TableSource,
    window: &CandidateWindow,
    now: DateTime<Utc>,
) -> Result<Vec<Pair>, SourceError> {
    let since = now - Duration::hours(window.recency_hours);
    let query = TableQuery::new("pairs")
        .select(&PAIR_COLUMNS)
        .filter(Filter::gte("snapshot_ts", format_iso_utc(since)))
        .order_by("snapshot_ts", true)
        .limit(window.max_pairs);

    let rows = source.fetch(&query).await?;
    let fetched = rows.len();
    let cutoff = now - Duration::minutes(window.max_age_minutes);

    let pairs: Vec<Pair> = decode_pairs(rows)
        .into_iter()
        .filter(|p| p.effective_created_at().map_or(false, |created| created >= cutoff))
        .collect();

    log::info!(
        "🔎 Candidate pairs: {} fetched, {} created within {}m",
        fetched,
        pairs.len(),
        window.max_age_minutes
    );

    Ok(pairs)
}

/// Pairs created within the lookback; falls back to snapshot time when no creation instants exist
pub async fn fetch_launch_radar_pairs(
    source: &dyn TableSource,
    lookback_minutes: i64,
    now: DateTime<Utc>,
) -> Result<Vec<Pair>, SourceError> {
    let since = format_iso_utc(now - Duration::minutes(lookback_minutes));

    let by_created = TableQuery::new("pairs")
        .select(&PAIR_COLUMNS)
        .filter(Filter::gte("pair_created_at", since.clone()))
        .order_by("pair_created_at", true)
        .limit(RADAR_FETCH_LIMIT);
    let mut rows = source.fetch(&by_created).await?;

    if rows.iter().all(|r| instant_cell(r, "pair_created_at").is_none()) {
        log::info!("ℹ️  No creation instants in the last {}m; using snapshot_ts", lookback_minutes);
        let by_snapshot = TableQuery::new("pairs")
            .select(&PAIR_COLUMNS)
            .filter(Filter::gte("snapshot_ts", since))
            .order_by("snapshot_ts", true)
            .limit(RADAR_FETCH_LIMIT);
        let extra = source.fetch(&by_snapshot).await?;
        if !extra.is_empty() {
            rows = extra;
        }
    }

    let pairs: Vec<Pair> = decode_pairs(rows)
        .into_iter()
        .filter(|p| p.effective_created_at().is_some())
        .collect();

    log::info!("📡 Launch radar candidates: {}", pairs.len());
    Ok(pairs)
}

/// `pair_address → base_token` from the pairs table
pub async fn base_token_map_for_pairs(
    source: &dyn TableSource,
    pair_ids: &[String],
    options: &BatchOptions,
) -> HashMap<String, String> {
    let ids = unique_ids(pair_ids.iter().map(String::as_str));
    let base = TableQuery::new("pairs")
        .select(&["pair_address", "base_token"])
        .order_by("pair_address", false)
        .order_by("base_token", false);
    let rows = fetch_chunked(source, &base, "pair_address", &ids, options.token_chunk, options.token_chunk).await;

    let mut map = HashMap::new();
    for row in &rows {
        if let (Some(pair), Some(token)) = (text_cell(row, "pair_address"), text_cell(row, "base_token")) {
            map.entry(pair).or_insert(token);
        }
    }
    map
}

fn cmp_desc_nulls_last(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Most recent pair per token: sort by (token asc, snapshot desc, created desc), keep the first
pub fn latest_pair_per_token(pairs: &[Pair]) -> HashMap<String, String> {
    let mut candidates: Vec<&Pair> = pairs
        .iter()
        .filter(|p| p.base_token.is_some() && p.pair_address.is_some())
        .collect();

    candidates.sort_by(|a, b| {
        a.base_token
            .cmp(&b.base_token)
            .then_with(|| cmp_desc_nulls_last(a.snapshot_ts, b.snapshot_ts))
            .then_with(|| cmp_desc_nulls_last(a.pair_created_at, b.pair_created_at))
    });

    let mut map = HashMap::new();
    for pair in candidates {
        if let (Some(token), Some(address)) = (&pair.base_token, &pair.pair_address) {
            map.entry(token.clone()).or_insert_with(|| address.clone());
        }
    }
    map
}

/// `base_token → pair_address` of each token's latest pair
pub async fn latest_pair_map_for_tokens(
    source: &dyn TableSource,
    tokens: &[String],
    options: &BatchOptions,
) -> HashMap<String, String> {
    let mut tokens = unique_ids(tokens.iter().map(String::as_str));
    tokens.sort();

    let mut map = HashMap::new();
    for chunk in tokens.chunks(options.pair_map_chunk.max(1)) {
        let query = TableQuery::new("pairs")
            .select(&["pair_address", "base_token", "snapshot_ts", "pair_created_at"])
            .filter(Filter::any_of("base_token", chunk))
            .order_by("snapshot_ts", true)
            .limit(chunk.len() * PAIRS_PER_TOKEN);

        match source.fetch(&query).await {
            Ok(rows) => {
                let pairs: Vec<Pair> = rows.iter().map(Pair::from_row).collect();
                map.extend(latest_pair_per_token(&pairs));
            }
            Err(e) => log::warn!("⚠️  pair lookup for {} tokens failed: {}", chunk.len(), e),
        }
    }
    map
}

/// `token_address → (name, symbol)` from the tokens table
pub async fn token_names_for_addresses(
    source: &dyn TableSource,
    tokens: &[String],
    options: &BatchOptions,
) -> HashMap<String, (Option<String>, Option<String>)> {
    let ids = unique_ids(tokens.iter().map(String::as_str));
    let base = TableQuery::new("tokens")
        .select(&["token_address", "name", "symbol"])
        .order_by("token_address", false);
    let rows = fetch_chunked(source, &base, "token_address", &ids, options.token_chunk, options.token_chunk).await;

    // Later rows win, as with a keep-last dedupe
    rows.iter()
        .filter_map(|row| {
            text_cell(row, "token_address")
                .map(|token| (token, (text_cell(row, "name"), text_cell(row, "symbol"))))
        })
        .collect()
}

/// Lookback instant for event fetches: one minute before the earliest effective creation, whole seconds
pub fn events_since(pairs: &[Pair]) -> Option<DateTime<Utc>> {
    pairs
        .iter()
        .filter_map(Pair::effective_created_at)
        .min()
        .map(|earliest| floor_to_second(earliest - Duration::minutes(1)))
}
