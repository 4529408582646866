//! One scoring pass: candidates → enrichment → events → metrics → labels

use super::batch::{
    base_token_map_for_pairs, events_since, fetch_event_tables, fetch_launch_radar_pairs,
    fetch_recent_pairs, latest_pair_map_for_tokens, token_names_for_addresses, unique_ids,
    BatchOptions, CandidateWindow,
};
use super::PipelineError;
use crate::early_core::{
    compute_early_metrics, filter_by_market_cap, floor_to_second, rank_by_score,
    score_and_classify, BatchSummary, ExtractorConfig, Pair, ScoredPair, Thresholds,
};
use crate::source::TableSource;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// How candidate pairs are selected for a pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandidateMode {
    /// Recently observed pairs created within `max_age_minutes`
    EarlyLeaders(CandidateWindow),
    /// Pairs created within the lookback, post-filtered by market cap
    LaunchRadar {
        lookback_minutes: i64,
        max_rows: usize,
        min_market_cap_usd: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassOutput {
    /// Ranked by `early_score`, descending
    pub scored: Vec<ScoredPair>,
    pub summary: BatchSummary,
    pub scored_at: DateTime<Utc>,
}

pub struct EarlyLeadersEngine {
    source: Arc<dyn TableSource>,
    thresholds: Thresholds,
    extractor: ExtractorConfig,
    batch: BatchOptions,
}

impl EarlyLeadersEngine {
    pub fn new(
        source: Arc<dyn TableSource>,
        thresholds: Thresholds,
        extractor: ExtractorConfig,
        batch: BatchOptions,
    ) -> Result<Self, PipelineError> {
        thresholds.validate()?;
        extractor.validate()?;

        Ok(Self {
            source,
            thresholds,
            extractor,
            batch,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub async fn run(&self, mode: &CandidateMode) -> Result<PassOutput, PipelineError> {
        self.run_at(mode, Utc::now()).await
    }

    /// Run a pass as of `now`
    pub async fn run_at(
        &self,
        mode: &CandidateMode,
        now: DateTime<Utc>,
    ) -> Result<PassOutput, PipelineError> {
        let source = self.source.as_ref();

        let (mut pairs, since) = match mode {
            CandidateMode::EarlyLeaders(window) => {
                let pairs = fetch_recent_pairs(source, window, now).await?;
                let since = events_since(&pairs);
                (pairs, since)
            }
            CandidateMode::LaunchRadar { lookback_minutes, .. } => {
                let pairs = fetch_launch_radar_pairs(source, *lookback_minutes, now).await?;
                let since = floor_to_second(now - Duration::minutes(*lookback_minutes));
                (pairs, Some(since))
            }
        };

        self.enrich_pairs(&mut pairs).await;

        let pair_ids = unique_ids(pairs.iter().filter_map(|p| p.pair_address.as_deref()));
        let events = match since {
            Some(since) => fetch_event_tables(source, &pair_ids, since, &self.batch).await,
            None => Default::default(),
        };

        let metrics = compute_early_metrics(
            &pairs,
            &events.swaps,
            &events.window_metrics,
            &events.liquidity_events,
            &self.extractor,
        );
        let mut scored = score_and_classify(metrics, &self.thresholds);
        rank_by_score(&mut scored);

        if let CandidateMode::LaunchRadar {
            max_rows,
            min_market_cap_usd,
            ..
        } = mode
        {
            let before = scored.len();
            scored = filter_by_market_cap(scored, *min_market_cap_usd, *max_rows);
            log::debug!(
                "Launch radar post-filter: {} → {} (mcap >= {})",
                before,
                scored.len(),
                min_market_cap_usd
            );
        }

        let summary = BatchSummary::from_scored(&scored);
        log::info!("🏁 Scoring pass complete ({}): {}", self.source.source_type(), summary);

        Ok(PassOutput {
            scored,
            summary,
            scored_at: now,
        })
    }

    /// Fill missing base tokens, pair addresses and token names from lookup tables
    async fn enrich_pairs(&self, pairs: &mut [Pair]) {
        let source = self.source.as_ref();

        let missing_token: Vec<String> = pairs
            .iter()
            .filter(|p| p.base_token.is_none())
            .filter_map(|p| p.pair_address.clone())
            .collect();
        if !missing_token.is_empty() {
            let tokens = base_token_map_for_pairs(source, &missing_token, &self.batch).await;
            for pair in pairs.iter_mut().filter(|p| p.base_token.is_none()) {
                if let Some(address) = &pair.pair_address {
                    pair.base_token = tokens.get(address).cloned();
                }
            }
            log::debug!("Backfilled base tokens for {}/{} pairs", tokens.len(), missing_token.len());
        }

        let missing_address: Vec<String> = pairs
            .iter()
            .filter(|p| p.pair_address.is_none())
            .filter_map(|p| p.base_token.clone())
            .collect();
        if !missing_address.is_empty() {
            let latest = latest_pair_map_for_tokens(source, &missing_address, &self.batch).await;
            for pair in pairs.iter_mut().filter(|p| p.pair_address.is_none()) {
                if let Some(token) = &pair.base_token {
                    pair.pair_address = latest.get(token).cloned();
                }
            }
        }

        let missing_name: Vec<String> = pairs
            .iter()
            .filter(|p| p.base_token_name.is_none() || p.base_token_symbol.is_none())
            .filter_map(|p| p.base_token.clone())
            .collect();
        if !missing_name.is_empty() {
            let names = token_names_for_addresses(source, &missing_name, &self.batch).await;
            for pair in pairs.iter_mut() {
                let Some((name, symbol)) = pair.base_token.as_ref().and_then(|t| names.get(t)) else {
                    continue;
                };
                if pair.base_token_name.is_none() {
                    pair.base_token_name = name.clone();
                }
                if pair.base_token_symbol.is_none() {
                    pair.base_token_symbol = symbol.clone();
                }
            }
        }
    }
}
