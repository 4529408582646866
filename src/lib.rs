//! trenchfeed - early-behavior scoring for newly created DEX trading pairs
//!
//! - `early_core` - pure metrics extraction, scoring and classification
//! - `source` - read-only table sources (PostgREST, SQLite)
//! - `pipeline` - batch fetches, scoring passes, result sinks
//! - `sqlite_pragma` - shared SQLite connection tuning

pub mod early_core;
pub mod pipeline;
pub mod source;
pub mod sqlite_pragma;
