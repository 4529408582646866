//! Early Core - per-pair early-behavior metrics, scoring and classification
//!
//! Pure, synchronous computation over in-memory batches. No I/O happens here;
//! the pipeline assembles the input tables and hands them over.
//!
//! # Architecture
//!
//! ```text
//! untyped rows → normalizer (instants, floats) → types (Pair, Swap, WindowMetric, LiquidityEvent)
//!     ↓
//! extractor::compute_early_metrics (windows anchored on creation / first trade)
//!     ↓
//! classifier::score_and_classify (scorer sub-scores + gates + ordered labels)
//!     ↓
//! summary (ranking, market-cap post-filter, batch counts)
//! ```

pub mod classifier;
pub mod config;
pub mod extractor;
pub mod fallback;
pub mod normalizer;
pub mod scorer;
pub mod summary;
pub mod types;
pub mod window;

pub use classifier::{score_and_classify, Classification, Gates, ScoredPair};
pub use config::{ConfigError, ExtractorConfig, Thresholds};
pub use extractor::{compute_early_metrics, compute_pair_metrics, EarlyMetrics, PairEvents, PairMetrics};
pub use normalizer::{floor_to_second, format_iso_utc, to_instant, to_numeric_columns, Row};
pub use scorer::{early_score, SubScores};
pub use summary::{filter_by_market_cap, rank_by_score, BatchSummary};
pub use types::{LiquidityEvent, LpAction, Pair, Swap, TradeSide, WindowMetric};
