//! Result sinks for scored pairs
//!
//! Routes writes to either a JSONL file or the `early_scores` SQLite table.

use super::config::OutputBackend;
use super::PipelineError;
use crate::early_core::normalizer::format_iso_utc;
use crate::early_core::ScoredPair;
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait ResultWriterBackend: Send {
    /// Write one pass worth of scored pairs
    async fn write_batch(
        &mut self,
        rows: &[ScoredPair],
        scored_at: DateTime<Utc>,
    ) -> Result<usize, PipelineError>;

    async fn flush(&mut self) -> Result<(), PipelineError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

/// Appends one JSON object per scored pair
pub struct JsonlResultWriter {
    writer: BufWriter<File>,
}

impl JsonlResultWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("📝 Writing scored pairs to: {}", path.display());

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_rows(&mut self, rows: &[ScoredPair], scored_at: DateTime<Utc>) -> Result<usize, PipelineError> {
        let scored_at = format_iso_utc(scored_at);
        for row in rows {
            let mut value = serde_json::to_value(row)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("scored_at".to_string(), scored_at.clone().into());
            }
            writeln!(self.writer, "{}", serde_json::to_string(&value)?)?;
        }
        self.writer.flush()?;
        Ok(rows.len())
    }
}

impl Drop for JsonlResultWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[async_trait]
impl ResultWriterBackend for JsonlResultWriter {
    async fn write_batch(
        &mut self,
        rows: &[ScoredPair],
        scored_at: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        self.write_rows(rows, scored_at)
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        self.writer.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

/// Upserts scored pairs into `early_scores`, keyed by pair address
pub struct SqliteResultWriter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultWriter {
    /// Open the database; the schema must already exist (see `run_schema_migrations`)
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;

        log::info!("📝 Upserting scored pairs into: {}", db_path.as_ref().display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn finite(value: f64) -> Option<f64> {
        value.is_finite().then_some(value)
    }

    fn upsert_rows(&self, rows: &[ScoredPair], scored_at: DateTime<Utc>) -> Result<usize, PipelineError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| PipelineError::Lock(e.to_string()))?;

        let scored_at = format_iso_utc(scored_at);
        let tx = conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO early_scores (
                    pair_address, base_token, base_token_name, base_token_symbol,
                    effective_created_at, market_cap_usd,
                    time_to_first_trade_s, first_trade_ts,
                    swaps_in_burst, swaps_per_min_burst, uniq_traders_10m,
                    buy_ratio_15m, top5_concentration,
                    lp_add_usd_15, lp_remove_usd_15,
                    early_score, classification, reason, scored_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(pair_address) DO UPDATE SET
                    base_token = excluded.base_token,
                    base_token_name = excluded.base_token_name,
                    base_token_symbol = excluded.base_token_symbol,
                    effective_created_at = excluded.effective_created_at,
                    market_cap_usd = excluded.market_cap_usd,
                    time_to_first_trade_s = excluded.time_to_first_trade_s,
                    first_trade_ts = excluded.first_trade_ts,
                    swaps_in_burst = excluded.swaps_in_burst,
                    swaps_per_min_burst = excluded.swaps_per_min_burst,
                    uniq_traders_10m = excluded.uniq_traders_10m,
                    buy_ratio_15m = excluded.buy_ratio_15m,
                    top5_concentration = excluded.top5_concentration,
                    lp_add_usd_15 = excluded.lp_add_usd_15,
                    lp_remove_usd_15 = excluded.lp_remove_usd_15,
                    early_score = excluded.early_score,
                    classification = excluded.classification,
                    reason = excluded.reason,
                    scored_at = excluded.scored_at
                "#,
            )?;

            for scored in rows {
                let pair = &scored.row.pair;
                let metrics = &scored.row.metrics;

                let Some(address) = pair.pair_address.as_deref() else {
                    log::debug!("Skipping scored row without pair_address");
                    continue;
                };

                stmt.execute(params![
                    address,
                    pair.base_token,
                    pair.base_token_name,
                    pair.base_token_symbol,
                    scored.row.effective_created_at.map(format_iso_utc),
                    Self::finite(pair.market_cap_usd),
                    Self::finite(metrics.time_to_first_trade_s),
                    metrics.first_trade_ts.map(format_iso_utc),
                    metrics.swaps_in_burst as i64,
                    metrics.swaps_per_min_burst,
                    metrics.uniq_traders_10m as i64,
                    metrics.buy_ratio_15m.and_then(Self::finite),
                    metrics.top5_concentration.and_then(Self::finite),
                    Self::finite(metrics.lp_add_usd_15).unwrap_or(0.0),
                    Self::finite(metrics.lp_remove_usd_15).unwrap_or(0.0),
                    scored.early_score,
                    scored.classification.as_str(),
                    scored.reason,
                    scored_at,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;

        Ok(written)
    }
}

#[async_trait]
impl ResultWriterBackend for SqliteResultWriter {
    async fn write_batch(
        &mut self,
        rows: &[ScoredPair],
        scored_at: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        self.upsert_rows(rows, scored_at)
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        // Each batch commits its own transaction
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

/// Unified writer that routes to either JSONL or SQLite backend
pub enum ResultWriter {
    Jsonl(JsonlResultWriter),
    Sqlite(SqliteResultWriter),
}

impl ResultWriter {
    pub fn new(backend: OutputBackend, path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        match backend {
            OutputBackend::Jsonl => Ok(ResultWriter::Jsonl(JsonlResultWriter::new(path)?)),
            OutputBackend::Sqlite => Ok(ResultWriter::Sqlite(SqliteResultWriter::new(path)?)),
        }
    }

    pub async fn write_batch(
        &mut self,
        rows: &[ScoredPair],
        scored_at: DateTime<Utc>,
    ) -> Result<usize, PipelineError> {
        match self {
            ResultWriter::Jsonl(w) => w.write_batch(rows, scored_at).await,
            ResultWriter::Sqlite(w) => w.write_batch(rows, scored_at).await,
        }
    }

    pub async fn flush(&mut self) -> Result<(), PipelineError> {
        match self {
            ResultWriter::Jsonl(w) => w.flush().await,
            ResultWriter::Sqlite(w) => w.flush().await,
        }
    }

    /// Get backend type for logging
    pub fn backend_type(&self) -> &'static str {
        match self {
            ResultWriter::Jsonl(w) => w.backend_type(),
            ResultWriter::Sqlite(w) => w.backend_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::early_core::{Classification, EarlyMetrics, Pair, PairMetrics};
    use crate::pipeline::db::{default_schema_dir, run_schema_migrations};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn scored_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn create_test_scored(address: Option<&str>, score: f64, class: Classification) -> ScoredPair {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ScoredPair {
            row: PairMetrics {
                pair: Pair {
                    pair_address: address.map(str::to_string),
                    base_token: Some("tok1".to_string()),
                    base_token_name: Some("Token One".to_string()),
                    base_token_symbol: None,
                    pair_created_at: Some(created),
                    snapshot_ts: Some(created),
                    price_usd: f64::NAN,
                    fdv_usd: f64::NAN,
                    market_cap_usd: 42_000.0,
                },
                effective_created_at: Some(created),
                metrics: EarlyMetrics::default(),
            },
            early_score: score,
            classification: class,
            reason: "No trade within horizon.".to_string(),
        }
    }

    fn create_test_db() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("scores.db");
        let mut conn = Connection::open(&db_path).unwrap();
        run_schema_migrations(&mut conn, default_schema_dir()).unwrap();
        (dir, db_path)
    }

    #[tokio::test]
    async fn test_jsonl_writes_one_object_per_pair() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/early_scores.jsonl");

        let mut writer = ResultWriter::new(OutputBackend::Jsonl, &path).unwrap();
        assert_eq!(writer.backend_type(), "JSONL");

        let rows = vec![
            create_test_scored(Some("p1"), 15.0, Classification::LoserNoEarlyTrades),
            create_test_scored(Some("p2"), 72.5, Classification::EarlyLeader),
        ];
        assert_eq!(writer.write_batch(&rows, scored_at()).await.unwrap(), 2);
        writer.flush().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["pair_address"], "p1");
        assert_eq!(lines[0]["classification"], "Loser (no early trades)");
        assert_eq!(lines[0]["time_to_first_trade_s"], serde_json::Value::Null);
        assert_eq!(lines[0]["price_usd"], serde_json::Value::Null);
        assert_eq!(lines[0]["swaps_in_burst"], 0);
        assert_eq!(lines[1]["early_score"], 72.5);
        assert_eq!(lines[1]["scored_at"], "2024-05-01T13:00:00Z");
    }

    #[tokio::test]
    async fn test_sqlite_upsert_by_pair_address() {
        let (_dir, db_path) = create_test_db();
        let mut writer = ResultWriter::new(OutputBackend::Sqlite, &db_path).unwrap();
        assert_eq!(writer.backend_type(), "SQLite");

        let first = vec![create_test_scored(Some("p1"), 15.0, Classification::LoserNoEarlyTrades)];
        writer.write_batch(&first, scored_at()).await.unwrap();

        let second = vec![
            create_test_scored(Some("p1"), 40.0, Classification::HypeRisky),
            create_test_scored(None, 99.0, Classification::EarlyLeader),
        ];
        assert_eq!(writer.write_batch(&second, scored_at()).await.unwrap(), 1);

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM early_scores", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let (score, class, ttf, mcap): (f64, String, Option<f64>, Option<f64>) = conn
            .query_row(
                "SELECT early_score, classification, time_to_first_trade_s, market_cap_usd
                 FROM early_scores WHERE pair_address = ?",
                ["p1"],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();

        assert_eq!(score, 40.0);
        assert_eq!(class, "Hype / Risky");
        assert!(ttf.is_none());
        assert_eq!(mcap, Some(42_000.0));
    }
}
