//! Local SQLite table source
//!
//! Reads the same tables as the REST source from a SQLite file (schema in
//! `sql/`). Timestamps are stored as ISO-8601 UTC text, so `gte` predicates
//! on them compare lexicographically in the same format the pipeline sends.

use super::{Filter, Row, SourceError, TableQuery, TableSource};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteTableSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTableSource {
    /// Open a read-only source over an existing database
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;

        // Must come after the PRAGMAs
        conn.execute("PRAGMA query_only = ON", [])?;

        log::info!("📥 SQLite source opened: {}", db_path.as_ref().display());

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn checked_identifier(name: &str) -> Result<&str, SourceError> {
    if is_identifier(name) {
        Ok(name)
    } else {
        Err(SourceError::InvalidQuery(format!("invalid identifier: {:?}", name)))
    }
}

/// SQL text and positional parameters for a [`TableQuery`]
pub fn build_sql(query: &TableQuery) -> Result<(String, Vec<String>), SourceError> {
    let table = checked_identifier(&query.table)?;

    let projection = if query.select.is_empty() {
        "*".to_string()
    } else {
        query
            .select
            .iter()
            .map(|c| checked_identifier(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", projection, table);
    let mut params = Vec::new();
    let mut clauses = Vec::new();

    for filter in &query.filters {
        let column = checked_identifier(filter.column())?;
        match filter {
            Filter::Eq(_, value) => {
                clauses.push(format!("{} = ?", column));
                params.push(value.clone());
            }
            Filter::Gte(_, value) => {
                clauses.push(format!("{} >= ?", column));
                params.push(value.clone());
            }
            Filter::In(_, values) if values.is_empty() => clauses.push("0".to_string()),
            Filter::In(_, values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} IN ({})", column, placeholders));
                params.extend(values.iter().cloned());
            }
        }
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if !query.order.is_empty() {
        let keys = query
            .order
            .iter()
            .map(|order| {
                let direction = if order.descending { "DESC" } else { "ASC" };
                checked_identifier(&order.column)
                    .map(|column| format!("{} {} NULLS LAST", column, direction))
            })
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    sql.push_str(&format!(" LIMIT {} OFFSET {}", query.limit, query.offset));

    Ok((sql, params))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Value::Null,
        ValueRef::Integer(i) => Value::Number(Number::from(i)),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[async_trait]
impl TableSource for SqliteTableSource {
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError> {
        let (sql, params) = build_sql(query)?;

        let conn = self
            .conn
            .lock()
            .map_err(|_| SourceError::InvalidQuery("sqlite connection lock poisoned".to_string()))?;

        let mut stmt = match conn.prepare(&sql) {
            Ok(stmt) => stmt,
            Err(e) if e.to_string().contains("no such table") => {
                log::info!("ℹ️  {} table not available; reading as empty", query.table);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(idx)?));
            }
            out.push(record);
        }

        log::debug!("📥 {} rows from {} (offset {})", out.len(), query.table, query.offset);
        Ok(out)
    }

    fn source_type(&self) -> &'static str {
        "SQLite"
    }
}
