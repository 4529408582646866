//! # Scoring Pipeline
//!
//! Wires a [`TableSource`](crate::source::TableSource) to the early core and
//! a result sink.
//!
//! ## Architecture
//!
//! ```text
//! TableSource (REST / SQLite)
//!     ↓ candidate pairs (recent or launch radar)
//! batch (base-token backfill, chunked event fetches)
//!     ↓ pairs + swaps + window metrics + liquidity events
//! early_core (extract → score → classify → rank)
//!     ↓ ScoredPair rows + BatchSummary
//! writer (JSONL / SQLite upsert)
//! ```
//!
//! ## Module Organization
//!
//! - `batch` - chunked, paged fetches and lookup joins
//! - `engine` - one scoring pass per call
//! - `config` - runtime configuration from the environment
//! - `writer` - result sinks
//! - `db` - schema migrations for the SQLite database

pub mod batch;
pub mod config;
pub mod db;
pub mod engine;
pub mod writer;

use crate::early_core::ConfigError;
use crate::source::SourceError;
use thiserror::Error;

pub use batch::{BatchOptions, CandidateWindow, EventTables};
pub use config::{OutputBackend, PipelineConfig, RunMode, SourceKind};
pub use db::run_schema_migrations;
pub use engine::{CandidateMode, EarlyLeadersEngine, PassOutput};
pub use writer::{JsonlResultWriter, ResultWriter, ResultWriterBackend, SqliteResultWriter};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("Schema directory not found: {0}")]
    SchemaNotFound(String),
}
