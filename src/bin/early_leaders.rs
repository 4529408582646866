//! Early Leaders - scoring runtime
//!
//! Selects candidate pairs, computes their early-behavior metrics, labels
//! them and writes the ranked result to JSONL or SQLite.
//!
//! Usage:
//!   cargo run --release --bin early_leaders
//!
//! Environment variables (see `PipelineConfig::from_env`):
//!   TRENCHFEED_SOURCE - rest | sqlite (default: rest)
//!   TRENCHFEED_MODE - early_leaders | launch_radar (default: early_leaders)
//!   OUTPUT_BACKEND - jsonl | sqlite (default: jsonl)
//!   REFRESH_INTERVAL_SECS - seconds between passes, 0 runs once (default: 0)

use dotenv::dotenv;
use log::{error, info};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use trenchfeed::pipeline::{
    run_schema_migrations, CandidateMode, EarlyLeadersEngine, OutputBackend, PipelineConfig,
    PipelineError, ResultWriter, SourceKind,
};
use trenchfeed::source::{RestTableSource, SqliteTableSource, TableSource};

fn build_source(config: &PipelineConfig) -> Result<Arc<dyn TableSource>, PipelineError> {
    match (config.source, &config.rest) {
        (SourceKind::Rest, Some(rest)) => Ok(Arc::new(RestTableSource::new(
            &rest.base_url,
            &rest.api_key,
            &rest.schema,
            config.request_timeout,
        )?)),
        _ => Ok(Arc::new(SqliteTableSource::open(&config.db_path)?)),
    }
}

async fn run_pass(
    engine: &EarlyLeadersEngine,
    mode: &CandidateMode,
    writer: &mut ResultWriter,
) -> Result<(), PipelineError> {
    let output = engine.run(mode).await?;
    let written = writer.write_batch(&output.scored, output.scored_at).await?;
    writer.flush().await?;

    info!("💾 Wrote {} scored pairs ({})", written, writer.backend_type());
    for leader in output.scored.iter().take(5) {
        info!(
            "   ├─ {:>5.1} {:<24} {} ({})",
            leader.early_score,
            leader.classification,
            leader.row.pair.pair_address.as_deref().unwrap_or("-"),
            leader.reason
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = PipelineConfig::from_env()?;
    let mode = config.candidate_mode();

    info!("🚀 Early Leaders starting...");
    info!("   ├─ Source: {:?}", config.source);
    info!("   ├─ Mode: {:?}", config.mode);
    info!("   ├─ Output: {:?} → {}", config.output_backend, config.output_path.display());
    info!(
        "   ├─ Thresholds: ttf≤{}s swaps/min≥{} uniques≥{} buy ratio {}±{} conc≤{} leader≥{}",
        config.thresholds.ttf_ceil_s,
        config.thresholds.min_swaps_per_min,
        config.thresholds.min_uniques_10m,
        config.thresholds.buy_ratio_center,
        config.thresholds.buy_ratio_tol,
        config.thresholds.max_concentration,
        config.thresholds.leader_score_min
    );
    info!("   └─ Refresh: {}s", config.refresh_interval_secs);

    if config.output_backend == OutputBackend::Sqlite {
        info!("🔧 Initializing output database...");
        if let Some(parent) = config.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(&config.output_path)?;
        run_schema_migrations(&mut conn, &config.schema_dir)?;
        drop(conn);
    }

    let source = build_source(&config)?;
    let engine = EarlyLeadersEngine::new(source, config.thresholds, config.extractor, config.batch)?;
    let mut writer = ResultWriter::new(config.output_backend, &config.output_path)?;

    if config.refresh_interval_secs == 0 {
        run_pass(&engine, &mode, &mut writer).await?;
        return Ok(());
    }

    info!("🔄 Starting refresh loop (Ctrl+C to stop)...");
    loop {
        match run_pass(&engine, &mode, &mut writer).await {
            Ok(()) => log::debug!("✅ Scoring cycle completed"),
            Err(e) => error!("❌ Scoring cycle failed: {}", e),
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(config.refresh_interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️  Received CTRL+C, shutting down...");
                break;
            }
        }
    }

    writer.flush().await?;
    Ok(())
}
