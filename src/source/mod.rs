//! Tabular data source contract
//!
//! The core reads four tables (pairs, swaps, pair_window_metrics,
//! liquidity_events) through one small query shape: a projection, filter
//! predicates, an optional sort and a row range. Backends translate that shape
//! to PostgREST parameters or SQL.

pub mod rest;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::early_core::normalizer::Row;
pub use rest::RestTableSource;
pub use sqlite::SqliteTableSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{table} returned HTTP {status}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Filter predicate on one column
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    Gte(String, String),
    In(String, Vec<String>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<String>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn gte(column: &str, value: impl Into<String>) -> Self {
        Filter::Gte(column.to_string(), value.into())
    }

    pub fn any_of(column: &str, values: &[String]) -> Self {
        Filter::In(column.to_string(), values.to_vec())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Gte(c, _) | Filter::In(c, _) => c,
        }
    }
}

/// Sort key; nulls always sort last
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub table: String,
    /// Empty selects every column
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    /// Sort keys, most significant first
    pub order: Vec<Order>,
    pub limit: usize,
    pub offset: usize,
}

impl TableQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            select: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: 1000,
            offset: 0,
        }
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append a sort key; keys added earlier take precedence
    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Read-only access to named tables
///
/// Backends may return fewer rows than `limit`; callers page with `offset`.
/// Optional tables that do not exist read as empty.
#[async_trait]
pub trait TableSource: Send + Sync {
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError>;

    /// Get backend type for logging
    fn source_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = TableQuery::new("swaps")
            .select(&["pair_address", "ts"])
            .filter(Filter::gte("ts", "2024-05-01T12:00:00Z"))
            .filter(Filter::any_of("pair_address", &["a".to_string(), "b".to_string()]))
            .order_by("ts", false)
            .order_by("trader_wallet", true)
            .limit(10_000)
            .offset(20);

        assert_eq!(query.table, "swaps");
        assert_eq!(query.select, vec!["pair_address", "ts"]);
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[1].column(), "pair_address");
        assert_eq!(
            query.order,
            vec![
                Order {
                    column: "ts".to_string(),
                    descending: false
                },
                Order {
                    column: "trader_wallet".to_string(),
                    descending: true
                },
            ]
        );
        assert_eq!((query.limit, query.offset), (10_000, 20));
    }
}
