//! PostgREST (Supabase) table source
//!
//! ## Request shape
//!
//! `GET {base_url}/rest/v1/{table}?select=..&limit=..&offset=..&order=a.asc.nullslast,b.asc.nullslast&col=in.(a,b)`
//! with matching `Range-Unit: items` / `Range: start-stop` headers for the row range and
//! `apikey`, `Authorization: Bearer`, `Accept-Profile`, `Content-Profile` on
//! every request.
//!
//! ## Degradations
//!
//! - HTTP 500 is a statement timeout upstream: logged, read as an empty table
//! - HTTP 404 for a table that does not exist: logged, read as an empty table
//! - Any other non-success status is a [`SourceError::Status`]

use super::{Filter, Row, SourceError, TableQuery, TableSource};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use std::time::Duration;

const MISSING_TABLE_MARKERS: [&str; 2] = ["could not find the table", "does not exist"];

pub struct RestTableSource {
    client: reqwest::Client,
    base_url: String,
}

impl RestTableSource {
    pub fn new(
        base_url: &str,
        api_key: &str,
        schema: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(auth_headers(api_key, schema)?)
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

fn auth_headers(api_key: &str, schema: &str) -> Result<HeaderMap, SourceError> {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("apikey"), header_value(api_key)?);
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
    headers.insert(HeaderName::from_static("accept-profile"), header_value(schema)?);
    headers.insert(HeaderName::from_static("content-profile"), header_value(schema)?);
    Ok(headers)
}

fn header_value(raw: &str) -> Result<HeaderValue, SourceError> {
    HeaderValue::from_str(raw)
        .map_err(|e| SourceError::InvalidQuery(format!("invalid header value: {}", e)))
}

/// PostgREST query parameters for a [`TableQuery`]
pub fn render_params(query: &TableQuery) -> Vec<(String, String)> {
    let select = if query.select.is_empty() {
        "*".to_string()
    } else {
        query.select.join(",")
    };

    let mut params = vec![
        ("select".to_string(), select),
        ("limit".to_string(), query.limit.to_string()),
    ];
    if query.offset > 0 {
        params.push(("offset".to_string(), query.offset.to_string()));
    }

    if !query.order.is_empty() {
        let keys: Vec<String> = query
            .order
            .iter()
            .map(|order| {
                let direction = if order.descending { "desc" } else { "asc" };
                format!("{}.{}.nullslast", order.column, direction)
            })
            .collect();
        params.push(("order".to_string(), keys.join(",")));
    }

    for filter in &query.filters {
        let predicate = match filter {
            Filter::Eq(_, value) => format!("eq.{}", value),
            Filter::Gte(_, value) => format!("gte.{}", value),
            Filter::In(_, values) => format!(
                "in.({})",
                values.iter().map(|v| quote_list_item(v)).collect::<Vec<_>>().join(",")
            ),
        };
        params.push((filter.column().to_string(), predicate));
    }

    params
}

/// `Range` header value for a query's row window (inclusive)
pub fn range_header(query: &TableQuery) -> String {
    let stop = query.offset + query.limit.max(1) - 1;
    format!("{}-{}", query.offset, stop)
}

fn quote_list_item(value: &str) -> String {
    if value.chars().any(|c| matches!(c, ',' | '(' | ')' | '"' | ' ')) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn is_missing_table(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    MISSING_TABLE_MARKERS.iter().any(|marker| body.contains(marker))
}

#[async_trait]
impl TableSource for RestTableSource {
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<Row>, SourceError> {
        let response = self
            .client
            .get(self.table_url(&query.table))
            .query(&render_params(query))
            .header("Range-Unit", "items")
            .header("Range", range_header(query))
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                let body = response.text().await?;
                let rows: Vec<Row> = serde_json::from_str(&body)?;
                log::debug!("📥 {} rows from {} (offset {})", rows.len(), query.table, query.offset);
                Ok(rows)
            }
            StatusCode::INTERNAL_SERVER_ERROR => {
                log::info!("⏱️  {} query timed out upstream; reading as empty", query.table);
                Ok(Vec::new())
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                if status == StatusCode::NOT_FOUND && is_missing_table(&body) {
                    log::info!("ℹ️  {} table not available; reading as empty", query.table);
                    return Ok(Vec::new());
                }
                Err(SourceError::Status {
                    table: query.table.clone(),
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    fn source_type(&self) -> &'static str {
        "REST"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one HTTP request with a canned response; the handle yields the raw request head
    async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&request).to_ascii_lowercase()
        });

        (url, handle)
    }

    fn create_test_source(url: &str) -> RestTableSource {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .default_headers(auth_headers("test-key", "public").unwrap())
            .build()
            .unwrap();
        RestTableSource::with_client(client, url)
    }

    fn create_test_query() -> TableQuery {
        TableQuery::new("swaps")
            .select(&["pair_address", "ts", "side"])
            .filter(Filter::any_of("pair_address", &["p1".to_string(), "p2".to_string()]))
            .filter(Filter::gte("ts", "2024-05-01T12:00:00Z"))
            .order_by("ts", false)
            .limit(10_000)
    }

    #[test]
    fn test_render_params() {
        let params = render_params(&create_test_query());

        assert_eq!(
            params,
            vec![
                ("select".to_string(), "pair_address,ts,side".to_string()),
                ("limit".to_string(), "10000".to_string()),
                ("order".to_string(), "ts.asc.nullslast".to_string()),
                ("pair_address".to_string(), "in.(p1,p2)".to_string()),
                ("ts".to_string(), "gte.2024-05-01T12:00:00Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_render_params_select_all_and_eq() {
        let query = TableQuery::new("pair_window_metrics")
            .filter(Filter::eq("window_code", "m5"))
            .order_by("snapshot_ts", true);
        let params = render_params(&query);

        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert!(params.contains(&("order".to_string(), "snapshot_ts.desc.nullslast".to_string())));
        assert!(params.contains(&("window_code".to_string(), "eq.m5".to_string())));
    }

    #[test]
    fn test_render_params_second_page() {
        let query = create_test_query()
            .order_by("trader_wallet", false)
            .limit(5)
            .offset(5);
        let params = render_params(&query);

        assert!(params.contains(&("limit".to_string(), "5".to_string())));
        assert!(params.contains(&("offset".to_string(), "5".to_string())));
        assert!(params.contains(&(
            "order".to_string(),
            "ts.asc.nullslast,trader_wallet.asc.nullslast".to_string()
        )));
        assert_eq!(range_header(&query), "5-9");
    }

    #[test]
    fn test_range_header() {
        let query = TableQuery::new("swaps").limit(5_000).offset(10_000);
        assert_eq!(range_header(&query), "10000-14999");
    }

    #[test]
    fn test_in_list_quoting() {
        assert_eq!(quote_list_item("abc"), "abc");
        assert_eq!(quote_list_item("a,b"), "\"a,b\"");
    }

    #[test]
    fn test_missing_table_detection() {
        assert!(is_missing_table(
            r#"{"code":"PGRST205","message":"Could not find the table 'public.listings' in the schema cache"}"#
        ));
        assert!(!is_missing_table(r#"{"message":"permission denied"}"#));
    }

    #[tokio::test]
    async fn test_fetch_sends_row_range() {
        let (url, request) = serve_once("206 Partial Content", r#"[{"pair_address":"p1"}]"#).await;
        let source = create_test_source(&url);

        let query = TableQuery::new("swaps").limit(5).offset(5);
        let rows = source.fetch(&query).await.unwrap();
        let request = request.await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pair_address"], serde_json::json!("p1"));
        assert!(request.starts_with("get /rest/v1/swaps?"));
        assert!(request.contains("limit=5"));
        assert!(request.contains("offset=5"));
        assert!(request.contains("range: 5-9"));
        assert!(request.contains("apikey: test-key"));
    }

    #[tokio::test]
    async fn test_fetch_reads_timeout_as_empty() {
        let (url, _request) = serve_once("500 Internal Server Error", r#"{"message":"canceling statement due to statement timeout"}"#).await;
        let rows = create_test_source(&url).fetch(&TableQuery::new("swaps")).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_reads_missing_table_as_empty() {
        let (url, _request) = serve_once(
            "404 Not Found",
            r#"{"code":"PGRST205","message":"Could not find the table 'public.liquidity_events' in the schema cache"}"#,
        )
        .await;
        let rows = create_test_source(&url)
            .fetch(&TableQuery::new("liquidity_events"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_other_status_is_error() {
        let (url, _request) = serve_once("401 Unauthorized", r#"{"message":"Invalid API key"}"#).await;
        let result = create_test_source(&url).fetch(&TableQuery::new("swaps")).await;

        match result {
            Err(SourceError::Status { table, status, body }) => {
                assert_eq!(table, "swaps");
                assert_eq!(status, 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("expected status error, got {:?}", other.map(|rows| rows.len())),
        }
    }

    #[tokio::test]
    #[ignore] // Requires SUPABASE_URL / SUPABASE_SERVICE_ROLE and network access
    async fn test_live_fetch_pairs() {
        let url = std::env::var("SUPABASE_URL").unwrap();
        let key = std::env::var("SUPABASE_SERVICE_ROLE").unwrap();
        let source = RestTableSource::new(&url, &key, "public", Duration::from_secs(30)).unwrap();

        let rows = source
            .fetch(&TableQuery::new("pairs").select(&["pair_address"]).limit(5))
            .await
            .unwrap();

        assert!(rows.len() <= 5);
    }
}
