//! Pipeline configuration from environment variables

use super::batch::{BatchOptions, CandidateWindow};
use super::engine::CandidateMode;
use crate::early_core::{ConfigError, ExtractorConfig, Thresholds};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where the input tables are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rest,
    Sqlite,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rest" | "supabase" => Ok(SourceKind::Rest),
            "sqlite" => Ok(SourceKind::Sqlite),
            other => Err(ConfigError::InvalidValue(format!(
                "TRENCHFEED_SOURCE must be rest or sqlite, got {}",
                other
            ))),
        }
    }
}

/// Where scored pairs are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBackend {
    Jsonl,
    Sqlite,
}

impl OutputBackend {
    /// Output file used when `OUTPUT_PATH` is unset
    pub fn default_path(&self) -> PathBuf {
        match self {
            OutputBackend::Jsonl => PathBuf::from("early_scores.jsonl"),
            OutputBackend::Sqlite => PathBuf::from("data/early_scores.db"),
        }
    }
}

impl FromStr for OutputBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jsonl" => Ok(OutputBackend::Jsonl),
            "sqlite" => Ok(OutputBackend::Sqlite),
            other => Err(ConfigError::InvalidValue(format!(
                "OUTPUT_BACKEND must be jsonl or sqlite, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    EarlyLeaders,
    LaunchRadar,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "early_leaders" => Ok(RunMode::EarlyLeaders),
            "launch_radar" | "radar" => Ok(RunMode::LaunchRadar),
            other => Err(ConfigError::InvalidValue(format!(
                "TRENCHFEED_MODE must be early_leaders or launch_radar, got {}",
                other
            ))),
        }
    }
}

/// Connection settings for the PostgREST source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSettings {
    pub base_url: String,
    pub api_key: String,
    pub schema: String,
}

/// Configuration for the scoring runtime
///
/// Loaded from environment variables; thresholds are validated on load.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub source: SourceKind,

    /// Present when `source` is `Rest`
    pub rest: Option<RestSettings>,

    /// SQLite database for the `sqlite` source
    pub db_path: PathBuf,

    pub mode: RunMode,

    pub max_pairs: usize,
    pub recency_hours: i64,
    pub max_age_minutes: i64,

    pub radar_lookback_minutes: i64,
    pub radar_max_rows: usize,
    pub radar_min_market_cap_usd: f64,

    pub batch: BatchOptions,
    pub request_timeout: Duration,

    /// Zero runs a single pass
    pub refresh_interval_secs: u64,

    pub output_backend: OutputBackend,
    pub output_path: PathBuf,

    /// Schema files applied to a SQLite output database
    pub schema_dir: PathBuf,

    pub thresholds: Thresholds,
    pub extractor: ExtractorConfig,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TRENCHFEED_SOURCE` (default: rest)
    /// - `SUPABASE_URL`, `SUPABASE_SERVICE_ROLE` (required for rest), `SUPABASE_SCHEMA` (default: public)
    /// - `TRENCHFEED_DB_PATH` (default: data/trenchfeed.db)
    /// - `TRENCHFEED_MODE` (default: early_leaders)
    /// - `MAX_PAIRS` (2000), `RECENCY_HOURS` (2), `MAX_AGE_MINUTES` (30)
    /// - `RADAR_LOOKBACK_MINUTES` (120), `RADAR_MAX_ROWS` (120), `RADAR_MIN_MARKET_CAP_USD` (30000)
    /// - `SWAP_CHUNK_SIZE` (120), `EVENT_CHUNK_SIZE` (200), `REQUEST_TIMEOUT_SECS` (30)
    /// - `REFRESH_INTERVAL_SECS` (default: 0, run once)
    /// - `OUTPUT_BACKEND` (default: jsonl), `OUTPUT_PATH` (default: early_scores.jsonl,
    ///   or data/early_scores.db for sqlite)
    /// - `SCHEMA_DIR` (default: sql)
    /// - `TTF_CEIL_S` (600), `MIN_SWAPS_PER_MIN` (20), `MIN_UNIQUES_10M` (50),
    ///   `BUY_RATIO_CENTER` (0.55), `BUY_RATIO_TOL` (0.25), `MAX_CONCENTRATION` (0.70),
    ///   `LEADER_SCORE_MIN` (60)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source = match lookup("TRENCHFEED_SOURCE") {
            Some(raw) => raw.parse()?,
            None => SourceKind::Rest,
        };

        let rest = match source {
            SourceKind::Rest => {
                let required = |key: &str| {
                    lookup(key)
                        .filter(|v| !v.trim().is_empty())
                        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
                };
                Some(RestSettings {
                    base_url: required("SUPABASE_URL")?,
                    api_key: required("SUPABASE_SERVICE_ROLE")?,
                    schema: lookup("SUPABASE_SCHEMA").unwrap_or_else(|| "public".to_string()),
                })
            }
            SourceKind::Sqlite => None,
        };

        let mode = match lookup("TRENCHFEED_MODE") {
            Some(raw) => raw.parse()?,
            None => RunMode::EarlyLeaders,
        };

        let output_backend = match lookup("OUTPUT_BACKEND") {
            Some(raw) => raw.parse()?,
            None => OutputBackend::Jsonl,
        };

        let batch = BatchOptions {
            swap_chunk: parse_or(&lookup, "SWAP_CHUNK_SIZE", 120),
            event_chunk: parse_or(&lookup, "EVENT_CHUNK_SIZE", 200),
            ..BatchOptions::default()
        };
        if batch.swap_chunk == 0 || batch.event_chunk == 0 {
            return Err(ConfigError::InvalidValue("chunk sizes must be > 0".to_string()));
        }

        let thresholds = Thresholds::new(
            parse_or(&lookup, "TTF_CEIL_S", 600.0),
            parse_or(&lookup, "MIN_SWAPS_PER_MIN", 20.0),
            parse_or(&lookup, "MIN_UNIQUES_10M", 50.0),
            parse_or(&lookup, "BUY_RATIO_CENTER", 0.55),
            parse_or(&lookup, "BUY_RATIO_TOL", 0.25),
            parse_or(&lookup, "MAX_CONCENTRATION", 0.70),
            parse_or(&lookup, "LEADER_SCORE_MIN", 60.0),
        )?;

        Ok(Self {
            source,
            rest,
            db_path: lookup("TRENCHFEED_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/trenchfeed.db")),
            mode,
            max_pairs: parse_or(&lookup, "MAX_PAIRS", 2000),
            recency_hours: parse_or(&lookup, "RECENCY_HOURS", 2),
            max_age_minutes: parse_or(&lookup, "MAX_AGE_MINUTES", 30),
            radar_lookback_minutes: parse_or(&lookup, "RADAR_LOOKBACK_MINUTES", 120),
            radar_max_rows: parse_or(&lookup, "RADAR_MAX_ROWS", 120),
            radar_min_market_cap_usd: parse_or(&lookup, "RADAR_MIN_MARKET_CAP_USD", 30_000.0),
            batch,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)),
            refresh_interval_secs: parse_or(&lookup, "REFRESH_INTERVAL_SECS", 0),
            output_backend,
            output_path: lookup("OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| output_backend.default_path()),
            schema_dir: lookup("SCHEMA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("sql")),
            thresholds,
            extractor: ExtractorConfig::default(),
        })
    }

    /// Candidate selection for the configured run mode
    pub fn candidate_mode(&self) -> CandidateMode {
        match self.mode {
            RunMode::EarlyLeaders => CandidateMode::EarlyLeaders(CandidateWindow {
                max_pairs: self.max_pairs,
                recency_hours: self.recency_hours,
                max_age_minutes: self.max_age_minutes,
            }),
            RunMode::LaunchRadar => CandidateMode::LaunchRadar {
                lookback_minutes: self.radar_lookback_minutes,
                max_rows: self.radar_max_rows,
                min_market_cap_usd: self.radar_min_market_cap_usd,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("TRENCHFEED_SOURCE", "sqlite")])).unwrap();

        assert_eq!(config.source, SourceKind::Sqlite);
        assert_eq!(config.rest, None);
        assert_eq!(config.db_path, PathBuf::from("data/trenchfeed.db"));
        assert_eq!(config.mode, RunMode::EarlyLeaders);
        assert_eq!(config.max_pairs, 2000);
        assert_eq!(config.recency_hours, 2);
        assert_eq!(config.max_age_minutes, 30);
        assert_eq!(config.batch, BatchOptions::default());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_interval_secs, 0);
        assert_eq!(config.output_backend, OutputBackend::Jsonl);
        assert_eq!(config.output_path, PathBuf::from("early_scores.jsonl"));
        assert_eq!(config.schema_dir, PathBuf::from("sql"));
        assert_eq!(config.thresholds.min_swaps_per_min, 20.0);
        assert_eq!(config.thresholds.leader_score_min, 60.0);
        assert_eq!(config.extractor, ExtractorConfig::default());
    }

    #[test]
    fn test_custom_config() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_SERVICE_ROLE", "secret"),
            ("TRENCHFEED_MODE", "launch-radar"),
            ("RADAR_MAX_ROWS", "50"),
            ("SWAP_CHUNK_SIZE", "60"),
            ("OUTPUT_BACKEND", "SQLite"),
            ("MIN_UNIQUES_10M", "25"),
            ("REFRESH_INTERVAL_SECS", "45"),
        ]))
        .unwrap();

        let rest = config.rest.clone().unwrap();
        assert_eq!(rest.base_url, "https://example.supabase.co");
        assert_eq!(rest.schema, "public");
        assert_eq!(config.mode, RunMode::LaunchRadar);
        assert_eq!(config.batch.swap_chunk, 60);
        assert_eq!(config.batch.event_chunk, 200);
        assert_eq!(config.output_backend, OutputBackend::Sqlite);
        assert_eq!(config.thresholds.min_uniques_10m, 25.0);
        assert_eq!(config.refresh_interval_secs, 45);
        assert_eq!(
            config.candidate_mode(),
            CandidateMode::LaunchRadar {
                lookback_minutes: 120,
                max_rows: 50,
                min_market_cap_usd: 30_000.0,
            }
        );
    }

    #[test]
    fn test_output_path_defaults_per_backend() {
        let sqlite = PipelineConfig::from_lookup(lookup_from(&[
            ("TRENCHFEED_SOURCE", "sqlite"),
            ("OUTPUT_BACKEND", "sqlite"),
            ("SCHEMA_DIR", "/opt/trenchfeed/sql"),
        ]))
        .unwrap();
        assert_eq!(sqlite.output_path, PathBuf::from("data/early_scores.db"));
        assert_eq!(sqlite.schema_dir, PathBuf::from("/opt/trenchfeed/sql"));

        let explicit = PipelineConfig::from_lookup(lookup_from(&[
            ("TRENCHFEED_SOURCE", "sqlite"),
            ("OUTPUT_BACKEND", "sqlite"),
            ("OUTPUT_PATH", "scores.db"),
        ]))
        .unwrap();
        assert_eq!(explicit.output_path, PathBuf::from("scores.db"));
    }

    #[test]
    fn test_rest_requires_credentials() {
        let result = PipelineConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x")]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingVariable("SUPABASE_SERVICE_ROLE".to_string())
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_tol = PipelineConfig::from_lookup(lookup_from(&[
            ("TRENCHFEED_SOURCE", "sqlite"),
            ("BUY_RATIO_TOL", "0"),
        ]));
        assert!(matches!(bad_tol, Err(ConfigError::InvalidThreshold(_))));

        let bad_mode = PipelineConfig::from_lookup(lookup_from(&[
            ("TRENCHFEED_SOURCE", "sqlite"),
            ("TRENCHFEED_MODE", "sideways"),
        ]));
        assert!(matches!(bad_mode, Err(ConfigError::InvalidValue(_))));

        // Unparseable numbers fall back to defaults
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("TRENCHFEED_SOURCE", "sqlite"),
            ("MAX_PAIRS", "lots"),
        ]))
        .unwrap();
        assert_eq!(config.max_pairs, 2000);
    }

    #[test]
    fn test_from_env() {
        env::set_var("TRENCHFEED_SOURCE", "sqlite");
        env::set_var("TRENCHFEED_DB_PATH", "/tmp/trenchfeed-test.db");
        env::set_var("MAX_AGE_MINUTES", "45");

        let config = PipelineConfig::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/trenchfeed-test.db"));
        assert_eq!(config.max_age_minutes, 45);

        // Cleanup
        env::remove_var("TRENCHFEED_SOURCE");
        env::remove_var("TRENCHFEED_DB_PATH");
        env::remove_var("MAX_AGE_MINUTES");
    }
}
