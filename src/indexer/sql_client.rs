use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

use crate::constants::TORII_SQL_PATH;
use crate::error::{AppError, Result};

/// One row returned by the indexer, keyed by column name.
pub type SqlRow = Map<String, Value>;

const MAX_ERROR_BODY_CHARS: usize = 240;

/// Anything that can run an SQL query against the indexer.
#[async_trait]
pub trait SqlTransport: Send + Sync {
    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>>;
}

/// Builds the indexer SQL URL with the query attached as `?query=`.
pub fn build_sql_url(base_url: &str, sql: &str) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        TORII_SQL_PATH
    ))
    .map_err(|e| AppError::Internal(format!("Invalid indexer URL: {}", e)))?;
    url.query_pairs_mut().append_pair("query", sql);
    Ok(url)
}

// Internal helper that pulls a human-readable message out of an error body.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

// Internal helper that validates the decoded payload is an array of row objects.
fn rows_from_value(value: Value) -> Result<Vec<SqlRow>> {
    let Value::Array(items) = value else {
        return Err(AppError::MalformedResponse(
            "expected a JSON array of rows".to_string(),
        ));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(AppError::MalformedResponse(format!(
                "expected row object, got {}",
                other
            ))),
        })
        .collect()
}

/// Decodes raw rows into typed records.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<SqlRow>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| AppError::MalformedResponse(format!("row decode failed: {}", e)))
        })
        .collect()
}

/// HTTP client for the indexer's SQL endpoint.
#[derive(Debug, Clone)]
pub struct SqlClient {
    base_url: String,
    client: reqwest::Client,
}

impl SqlClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("SQL HTTP client init failed: {}", e)))?;
        Ok(Self { base_url, client })
    }

    /// Runs a query and decodes every row into `T`.
    pub async fn query_as<T: DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>> {
        decode_rows(self.query(sql).await?)
    }
}

#[async_trait]
impl SqlTransport for SqlClient {
    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>> {
        let url = build_sql_url(&self.base_url, sql)?;
        tracing::debug!("Indexer SQL: {}", sql);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Protocol(format!(
                "HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body)
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.contains("json") {
            return Err(AppError::Protocol(format!(
                "unexpected content type '{}'",
                content_type
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(e.to_string()))?;
        rows_from_value(body)
    }
}
