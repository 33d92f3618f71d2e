//! BigQuery Warehouse
//!
//! Talks to the BigQuery v2 REST API directly:
//! - `POST /projects/{p}/queries` (jobs.query) for dry runs and execution
//! - `GET /projects/{p}/queries/{job}` (getQueryResults) to wait and page
//! - `GET /projects/{p}/jobs` (jobs.list) for the audit trail
//! - `POST /projects/{p}/jobs/{job}/cancel` when a running job is abandoned
//!
//! Authentication is an opaque bearer token supplied by the caller.

use crate::config::env_parse;
use crate::contracts::Row;
use crate::error::{ExecError, Result, WarehouseError};
use crate::warehouse::{JobSummary, QueryOutput, Warehouse};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
/// Longest single server-side wait requested from getQueryResults.
const MAX_POLL_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub project_id: String,
    pub location: String,
    pub access_token: Option<String>,
    pub api_url: String,
    pub request_timeout: Duration,
}

impl BigQueryConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: "asia-south1".to_string(),
            access_token: None,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(300),
        }
    }

    /// `GCP_PROJECT_ID` is required; `BIGQUERY_LOCATION`,
    /// `BIGQUERY_ACCESS_TOKEN`, `BIGQUERY_API_URL` and
    /// `BIGQUERY_REQUEST_TIMEOUT_SECONDS` are optional.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_project(None)
    }

    /// Like `from_env`, with `project` taking the place of `GCP_PROJECT_ID`
    /// when given. Malformed optional settings are still errors.
    pub fn from_env_with_project(project: Option<String>) -> Result<Self> {
        dotenv::dotenv().ok();

        let project_id = match project {
            Some(project) => project,
            None => std::env::var("GCP_PROJECT_ID")
                .map_err(|_| ExecError::Config("GCP_PROJECT_ID is not set".to_string()))?,
        };
        let mut config = Self::new(project_id);

        if let Ok(location) = std::env::var("BIGQUERY_LOCATION") {
            config.location = location;
        }
        config.access_token = std::env::var("BIGQUERY_ACCESS_TOKEN").ok();
        if let Ok(api_url) = std::env::var("BIGQUERY_API_URL") {
            config.api_url = api_url;
        }
        if let Some(secs) = env_parse::<u64>("BIGQUERY_REQUEST_TIMEOUT_SECONDS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// BigQuery REST client
pub struct BigQueryClient {
    config: BigQueryConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    dry_run: bool,
    use_query_cache: bool,
    location: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: Option<bool>,
    total_bytes_processed: Option<String>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<JobListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobListEntry {
    job_reference: JobReference,
    state: Option<String>,
    statistics: Option<JobStatistics>,
    configuration: Option<JobConfiguration>,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    creation_time: Option<String>,
    query: Option<QueryStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatistics {
    total_bytes_processed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobConfiguration {
    query: Option<QueryConfiguration>,
}

#[derive(Debug, Deserialize)]
struct QueryConfiguration {
    query: Option<String>,
}

impl BigQueryClient {
    pub fn new(config: BigQueryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ExecError::Config(format!("Failed to create HTTP client for BigQuery: {}", e)))?;

        Ok(Self {
            config: BigQueryConfig {
                api_url: config.api_url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(BigQueryConfig::from_env()?)
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.config.api_url, self.config.project_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<T, WarehouseError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            WarehouseError::new(format!("Failed to parse BigQuery response: {}", e))
        })
    }

    async fn post_query(
        &self,
        body: &QueryRequest<'_>,
    ) -> std::result::Result<QueryResponse, WarehouseError> {
        let request = self
            .client
            .post(format!("{}/queries", self.project_url()))
            .json(body);
        self.send(request).await
    }

    /// Guard that cancels `job` server-side unless disarmed.
    fn job_guard(&self, job: &JobReference) -> JobGuard {
        let location = job.location.as_deref().unwrap_or(&self.config.location);
        let request = self
            .client
            .post(format!("{}/jobs/{}/cancel", self.project_url(), job.job_id))
            .query(&[("location", location)]);
        JobGuard {
            request: Some(self.authorize(request)),
            job_id: job.job_id.clone(),
        }
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        max_results: usize,
        wait: Duration,
    ) -> std::result::Result<QueryResponse, WarehouseError> {
        let location = job.location.as_deref().unwrap_or(&self.config.location);
        let mut query: Vec<(&str, String)> = vec![
            ("maxResults", max_results.to_string()),
            ("timeoutMs", wait.as_millis().to_string()),
            ("location", location.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let request = self
            .client
            .get(format!("{}/queries/{}", self.project_url(), job.job_id))
            .query(&query);
        self.send(request).await
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    fn name(&self) -> &str {
        "bigquery"
    }

    async fn dry_run(&self, sql: &str) -> std::result::Result<u64, WarehouseError> {
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            dry_run: true,
            use_query_cache: false,
            location: &self.config.location,
            max_results: None,
            timeout_ms: None,
        };

        let response = self.post_query(&body).await?;
        Ok(parse_int64(response.total_bytes_processed.as_deref()).unwrap_or(0))
    }

    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
        max_results: usize,
    ) -> std::result::Result<QueryOutput, WarehouseError> {
        let deadline = Instant::now() + timeout;
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            dry_run: false,
            use_query_cache: true,
            location: &self.config.location,
            max_results: Some(max_results),
            timeout_ms: Some(timeout.min(MAX_POLL_WAIT).as_millis() as u64),
        };

        let mut response = self.post_query(&body).await?;
        let job = response
            .job_reference
            .take()
            .ok_or_else(|| WarehouseError::new("BigQuery response is missing jobReference"))?;

        // Armed while the job may still be running: an early return or a
        // dropped future cancels it.
        let guard = self.job_guard(&job);

        while response.job_complete == Some(false) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WarehouseError::deadline(format!(
                    "Job {} did not complete before the deadline",
                    job.job_id
                )));
            }
            debug!("Job {} not complete, waiting up to {:?}", job.job_id, remaining.min(MAX_POLL_WAIT));
            response = self
                .get_query_results(&job, None, max_results, remaining.min(MAX_POLL_WAIT))
                .await?;
        }
        guard.disarm();

        let schema = response.schema.clone().unwrap_or_default();
        let bytes_processed = parse_int64(response.total_bytes_processed.as_deref());
        let mut rows = decode_rows(&schema, &response.rows);
        let mut page_token = response.page_token.take();

        while rows.len() < max_results {
            let Some(token) = page_token.take() else { break };
            let page = self
                .get_query_results(&job, Some(&token), max_results - rows.len(), MAX_POLL_WAIT)
                .await?;
            rows.extend(decode_rows(&schema, &page.rows));
            page_token = page.page_token;
        }
        rows.truncate(max_results);

        Ok(QueryOutput {
            columns: schema.fields.iter().map(|f| f.name.clone()).collect(),
            rows,
            bytes_processed,
            job_id: Some(job.job_id),
        })
    }

    async fn recent_jobs(&self, limit: usize) -> std::result::Result<Vec<JobSummary>, WarehouseError> {
        let request = self
            .client
            .get(format!("{}/jobs", self.project_url()))
            .query(&[("maxResults", limit.to_string()), ("projection", "full".to_string())]);
        let list: JobList = self.send(request).await?;

        Ok(list
            .jobs
            .into_iter()
            .filter(|job| job.configuration.as_ref().and_then(|c| c.query.as_ref()).is_some())
            .map(|job| {
                let stats = job.statistics.as_ref();
                JobSummary {
                    job_id: job.job_reference.job_id,
                    query: job.configuration.and_then(|c| c.query).and_then(|q| q.query),
                    created: stats
                        .and_then(|s| parse_int64(s.creation_time.as_deref()))
                        .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single()),
                    state: job.state.unwrap_or_else(|| "UNKNOWN".to_string()),
                    bytes_processed: stats
                        .and_then(|s| s.query.as_ref())
                        .and_then(|q| parse_int64(q.total_bytes_processed.as_deref())),
                    error: job.error_result.and_then(|e| e.message),
                }
            })
            .collect())
    }
}

/// Best-effort `jobs.cancel` for a job nobody will read anymore.
struct JobGuard {
    request: Option<reqwest::RequestBuilder>,
    job_id: String,
}

impl JobGuard {
    fn disarm(mut self) {
        self.request = None;
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let Some(request) = self.request.take() else {
            return;
        };
        let job_id = std::mem::take(&mut self.job_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match request.send().await {
                        Ok(response) if response.status().is_success() => {
                            debug!("Cancelled BigQuery job {}", job_id);
                        }
                        Ok(response) => {
                            warn!("Cancelling BigQuery job {} returned {}", job_id, response.status());
                        }
                        Err(e) => warn!("Failed to cancel BigQuery job {}: {}", job_id, e),
                    }
                });
            }
            Err(_) => warn!("No runtime available to cancel BigQuery job {}", job_id),
        }
    }
}

fn transport_error(error: reqwest::Error) -> WarehouseError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        WarehouseError::transport(format!("BigQuery request failed: {}", error))
    } else {
        warn!("Unexpected BigQuery client error: {}", error);
        WarehouseError::new(format!("BigQuery request failed: {}", error))
    }
}

/// Build a `WarehouseError` from a non-2xx response body.
fn api_error(status: u16, body: &str) -> WarehouseError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let first = envelope.error.errors.first();
            let reason = first.and_then(|e| e.reason.clone());
            let message = envelope
                .error
                .message
                .or_else(|| first.and_then(|e| e.message.clone()))
                .or(envelope.error.status)
                .unwrap_or_else(|| format!("BigQuery request failed with status {}", status));
            WarehouseError::api(status, reason, message)
        }
        Err(_) => WarehouseError::api(
            status,
            None,
            format!("BigQuery request failed with status {}: {}", status, body.trim()),
        ),
    }
}

/// BigQuery encodes int64 values as JSON strings.
fn parse_int64(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
}

fn decode_rows(schema: &TableSchema, rows: &[TableRow]) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            schema
                .fields
                .iter()
                .zip(row.f.iter())
                .map(|(field, cell)| (field.name.clone(), decode_value(field, &cell.v)))
                .collect()
        })
        .collect()
}

fn decode_value(field: &FieldSchema, raw: &Value) -> Value {
    if raw.is_null() {
        return Value::Null;
    }

    if field.mode.as_deref() == Some("REPEATED") {
        let element = FieldSchema {
            mode: None,
            ..field.clone()
        };
        return match raw {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| decode_value(&element, item.get("v").unwrap_or(item)))
                    .collect(),
            ),
            other => other.clone(),
        };
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => {
            let cells = raw.get("f").and_then(Value::as_array);
            match cells {
                Some(cells) => Value::Object(
                    field
                        .fields
                        .iter()
                        .zip(cells.iter())
                        .map(|(sub, cell)| {
                            (sub.name.clone(), decode_value(sub, cell.get("v").unwrap_or(&Value::Null)))
                        })
                        .collect(),
                ),
                None => raw.clone(),
            }
        }
        "INTEGER" | "INT64" => raw
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| raw.clone()),
        "FLOAT" | "FLOAT64" => raw
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| raw.clone()),
        "BOOLEAN" | "BOOL" => match raw.as_str() {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => raw.clone(),
        },
        "TIMESTAMP" => raw
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(|secs| Utc.timestamp_millis_opt((secs * 1000.0) as i64).single())
            .map(|ts: DateTime<Utc>| Value::String(ts.to_rfc3339()))
            .unwrap_or_else(|| raw.clone()),
        _ => raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const RUNNING_JOB: &str = r#"{"jobReference": {"jobId": "job_1", "location": "EU"}, "jobComplete": false}"#;

    const FINISHED_JOB: &str = r#"{"jobReference": {"jobId": "job_2", "location": "EU"}, "jobComplete": true,
        "totalBytesProcessed": "10", "schema": {"fields": [{"name": "x", "type": "INTEGER"}]},
        "rows": [{"f": [{"v": "1"}]}]}"#;

    /// Request line of the next full request on `socket`.
    async fn read_request(socket: &mut TcpStream, buf: &mut Vec<u8>) -> Option<String> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                let length = head
                    .lines()
                    .find_map(|line| {
                        let line = line.to_ascii_lowercase();
                        line.strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + length {
                    buf.drain(..pos + 4 + length);
                    return head.lines().next().map(str::to_string);
                }
            }
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Local HTTP server answering every request with `body`. Returns the
    /// client for project `p` and the request lines seen so far.
    async fn fake_bigquery(body: &'static str) -> (BigQueryClient, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = BigQueryConfig::new("p");
        config.api_url = format!("http://{}", listener.local_addr().unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    while let Some(line) = read_request(&mut socket, &mut buf).await {
                        log.lock().unwrap().push(line);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (BigQueryClient::new(config).unwrap(), seen)
    }

    async fn saw_cancel(seen: &Arc<Mutex<Vec<String>>>, job_id: &str) -> bool {
        let expected = format!("POST /projects/p/jobs/{}/cancel?location=EU ", job_id);
        for _ in 0..50 {
            if seen.lock().unwrap().iter().any(|line| line.starts_with(&expected)) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_deadline_cancels_running_job() {
        let (client, seen) = fake_bigquery(RUNNING_JOB).await;

        let err = client.execute("SELECT 1", Duration::ZERO, 10).await.unwrap_err();
        assert!(err.is_deadline());
        assert!(err.message.contains("job_1"));
        assert!(saw_cancel(&seen, "job_1").await);
    }

    #[tokio::test]
    async fn test_dropped_execution_cancels_running_job() {
        let (client, seen) = fake_bigquery(RUNNING_JOB).await;

        let outcome = tokio::time::timeout(
            Duration::from_millis(200),
            client.execute("SELECT 1", Duration::from_secs(60), 10),
        )
        .await;
        assert!(outcome.is_err());
        assert!(saw_cancel(&seen, "job_1").await);
    }

    #[tokio::test]
    async fn test_finished_job_is_not_cancelled() {
        let (client, seen) = fake_bigquery(FINISHED_JOB).await;

        let output = client.execute("SELECT 1", Duration::from_secs(5), 10).await.unwrap();
        assert_eq!(output.rows.len(), 1);
        assert_eq!(output.rows[0]["x"], json!(1));
        assert_eq!(output.job_id.as_deref(), Some("job_2"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let lines = seen.lock().unwrap().clone();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("POST /projects/p/queries "));
    }

    fn schema(value: Value) -> TableSchema {
        serde_json::from_value(value).unwrap()
    }

    fn rows(value: Value) -> Vec<TableRow> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_rows_keeps_column_order_and_types() {
        let schema = schema(json!({"fields": [
            {"name": "month", "type": "STRING"},
            {"name": "count", "type": "INTEGER"},
            {"name": "ratio", "type": "FLOAT"},
            {"name": "active", "type": "BOOLEAN"},
            {"name": "note", "type": "STRING"}
        ]}));
        let rows = rows(json!([
            {"f": [{"v": "2025-11"}, {"v": "42"}, {"v": "0.5"}, {"v": "true"}, {"v": null}]}
        ]));

        let decoded = decode_rows(&schema, &rows);
        assert_eq!(decoded.len(), 1);
        let keys: Vec<&String> = decoded[0].keys().collect();
        assert_eq!(keys, vec!["month", "count", "ratio", "active", "note"]);
        assert_eq!(decoded[0]["count"], json!(42));
        assert_eq!(decoded[0]["ratio"], json!(0.5));
        assert_eq!(decoded[0]["active"], json!(true));
        assert_eq!(decoded[0]["note"], Value::Null);
    }

    #[test]
    fn test_decode_nested_and_repeated() {
        let schema = schema(json!({"fields": [
            {"name": "tags", "type": "STRING", "mode": "REPEATED"},
            {"name": "loan", "type": "RECORD", "fields": [
                {"name": "id", "type": "INTEGER"},
                {"name": "branch", "type": "STRING"}
            ]}
        ]}));
        let rows = rows(json!([
            {"f": [
                {"v": [{"v": "a"}, {"v": "b"}]},
                {"v": {"f": [{"v": "7"}, {"v": "north"}]}}
            ]}
        ]));

        let decoded = decode_rows(&schema, &rows);
        assert_eq!(decoded[0]["tags"], json!(["a", "b"]));
        assert_eq!(decoded[0]["loan"], json!({"id": 7, "branch": "north"}));
    }

    #[test]
    fn test_api_error_extracts_reason() {
        let body = r#"{"error": {"code": 400, "message": "Syntax error: Unexpected end of script",
            "errors": [{"message": "Syntax error", "domain": "global", "reason": "invalidQuery"}],
            "status": "INVALID_ARGUMENT"}}"#;
        let err = api_error(400, body);
        assert_eq!(err.status, Some(400));
        assert_eq!(err.reason.as_deref(), Some("invalidQuery"));
        assert_eq!(err.message, "Syntax error: Unexpected end of script");
        assert!(!err.transport);
    }

    #[test]
    fn test_api_error_with_unstructured_body() {
        let err = api_error(502, "<html>Bad Gateway</html>");
        assert_eq!(err.status, Some(502));
        assert!(err.reason.is_none());
        assert!(err.message.contains("502"));
    }

    #[test]
    fn test_parse_int64() {
        assert_eq!(parse_int64(Some("2048")), Some(2048));
        assert_eq!(parse_int64(Some("not a number")), None);
        assert_eq!(parse_int64(None), None);
    }

    #[test]
    fn test_explicit_project_still_rejects_bad_settings() {
        std::env::set_var("BIGQUERY_REQUEST_TIMEOUT_SECONDS", "soon");
        let result = BigQueryConfig::from_env_with_project(Some("p".to_string()));
        std::env::remove_var("BIGQUERY_REQUEST_TIMEOUT_SECONDS");

        match result {
            Err(ExecError::Config(message)) => {
                assert!(message.contains("BIGQUERY_REQUEST_TIMEOUT_SECONDS"));
            }
            other => panic!("expected a configuration error, got {:?}", other),
        }

        let config = BigQueryConfig::from_env_with_project(Some("p".to_string())).unwrap();
        assert_eq!(config.project_id, "p");
    }

    #[test]
    fn test_dry_run_request_disables_cache() {
        let body = QueryRequest {
            query: "SELECT 1",
            use_legacy_sql: false,
            dry_run: true,
            use_query_cache: false,
            location: "asia-south1",
            max_results: None,
            timeout_ms: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["dryRun"], json!(true));
        assert_eq!(json["useQueryCache"], json!(false));
        assert_eq!(json["useLegacySql"], json!(false));
        assert!(json.get("maxResults").is_none());
    }
}
