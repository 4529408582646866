//! Chunk and page sizes must not change the assembled feature table
//!
//! Seeds a SQLite database (schema from `sql/`) with 500 pairs and their
//! events, then fetches through the read-only SQLite source with different
//! batch options.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection};
use tempfile::{tempdir, TempDir};
use trenchfeed::early_core::{compute_early_metrics, format_iso_utc, ExtractorConfig, Pair};
use trenchfeed::pipeline::batch::{fetch_all_pages, fetch_event_tables, BatchOptions};
use trenchfeed::pipeline::db::{default_schema_dir, run_schema_migrations};
use trenchfeed::source::{SqliteTableSource, TableQuery};

const PAIR_COUNT: usize = 500;
const SWAPS_PER_PAIR: usize = 3;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn created_at(i: usize) -> DateTime<Utc> {
    t0() + Duration::seconds(i as i64 * 10)
}

fn pair_id(i: usize) -> String {
    format!("pair{:04}", i)
}

fn create_test_db() -> (TempDir, SqliteTableSource) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("chunking.db");

    let mut conn = Connection::open(&db_path).unwrap();
    run_schema_migrations(&mut conn, default_schema_dir()).unwrap();

    let tx = conn.transaction().unwrap();
    for i in 0..PAIR_COUNT {
        let pair = pair_id(i);
        let created = created_at(i);
        tx.execute(
            "INSERT INTO pairs (pair_address, base_token, pair_created_at, snapshot_ts) VALUES (?, ?, ?, ?)",
            params![pair, format!("tok{:04}", i), format_iso_utc(created), format_iso_utc(created)],
        )
        .unwrap();

        for j in 0..SWAPS_PER_PAIR {
            let side = if (i + j) % 3 == 0 { "sell" } else { "buy" };
            tx.execute(
                "INSERT INTO swaps (pair_address, ts, trader_wallet, side, amount_usd) VALUES (?, ?, ?, ?, ?)",
                params![
                    pair,
                    format_iso_utc(created + Duration::seconds(j as i64 + 1)),
                    format!("wallet{}", (i * 7 + j) % 40),
                    side,
                    (i % 13 + j) as f64 * 10.0
                ],
            )
            .unwrap();
        }

        if i % 4 == 0 {
            tx.execute(
                "INSERT INTO pair_window_metrics (pair_address, window_code, buys, sells, snapshot_ts) VALUES (?, 'm5', ?, ?, ?)",
                params![pair, (i % 5) as f64, 2.0, format_iso_utc(created + Duration::seconds(60))],
            )
            .unwrap();
        }

        if i % 10 == 0 {
            let action = if i % 20 == 0 { "remove" } else { "add" };
            tx.execute(
                "INSERT INTO liquidity_events (pair_address, ts, action, value_usd) VALUES (?, ?, ?, ?)",
                params![pair, format_iso_utc(created + Duration::seconds(120)), action, 250.0],
            )
            .unwrap();
        }
    }
    tx.commit().unwrap();
    drop(conn);

    let source = SqliteTableSource::open(&db_path).unwrap();
    (dir, source)
}

fn test_pairs() -> Vec<Pair> {
    (0..PAIR_COUNT)
        .map(|i| Pair {
            pair_address: Some(pair_id(i)),
            base_token: Some(format!("tok{:04}", i)),
            base_token_name: None,
            base_token_symbol: None,
            pair_created_at: Some(created_at(i)),
            snapshot_ts: Some(created_at(i)),
            price_usd: f64::NAN,
            fdv_usd: f64::NAN,
            market_cap_usd: f64::NAN,
        })
        .collect()
}

async fn feature_table(source: &SqliteTableSource, options: &BatchOptions) -> (usize, String) {
    let pairs = test_pairs();
    let ids: Vec<String> = (0..PAIR_COUNT).map(pair_id).collect();

    let events = fetch_event_tables(source, &ids, t0() - Duration::minutes(1), options).await;
    let metrics = compute_early_metrics(
        &pairs,
        &events.swaps,
        &events.window_metrics,
        &events.liquidity_events,
        &ExtractorConfig::default(),
    );

    (events.swaps.len(), serde_json::to_string(&metrics).unwrap())
}

#[tokio::test]
async fn test_chunk_size_does_not_change_features() {
    let (_dir, source) = create_test_db();

    let chunked = BatchOptions {
        swap_chunk: 120,
        event_chunk: 120,
        ..BatchOptions::default()
    };
    let single = BatchOptions {
        swap_chunk: 500,
        event_chunk: 500,
        ..BatchOptions::default()
    };
    let small_pages = BatchOptions {
        swap_chunk: 500,
        event_chunk: 500,
        swap_page: 97,
        window_metric_page: 13,
        liquidity_page: 7,
        ..BatchOptions::default()
    };

    let (chunked_swaps, chunked_table) = feature_table(&source, &chunked).await;
    let (single_swaps, single_table) = feature_table(&source, &single).await;
    let (paged_swaps, paged_table) = feature_table(&source, &small_pages).await;

    assert_eq!(chunked_swaps, PAIR_COUNT * SWAPS_PER_PAIR);
    assert_eq!(single_swaps, PAIR_COUNT * SWAPS_PER_PAIR);
    assert_eq!(paged_swaps, PAIR_COUNT * SWAPS_PER_PAIR);
    assert_eq!(chunked_table, single_table);
    assert_eq!(single_table, paged_table);
}

#[tokio::test]
async fn test_paging_returns_every_row() {
    let (_dir, source) = create_test_db();

    let query = TableQuery::new("pairs").order_by("pair_created_at", false);
    let rows = fetch_all_pages(&source, &query, 7).await.unwrap();

    assert_eq!(rows.len(), PAIR_COUNT);
    assert_eq!(rows[0]["pair_address"], serde_json::json!("pair0000"));
    assert_eq!(rows[PAIR_COUNT - 1]["pair_address"], serde_json::json!("pair0499"));
}
