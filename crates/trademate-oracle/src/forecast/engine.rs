//! Forecast engine integration boundary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

use crate::config::OracleConfig;
use crate::error::{OracleError, Result};

/// Column names of the uploaded context table
pub mod columns {
    pub const TIMESTAMP: &str = "time_series_timestamp";
    pub const DATA: &str = "time_series_data";
    pub const ID: &str = "time_series_id";
}

/// One row of forecast context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRow {
    #[serde(rename = "time_series_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "time_series_data")]
    pub value: f64,
    #[serde(rename = "time_series_id")]
    pub series_id: String,
}

/// Forecast query against an uploaded context table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastQuery {
    pub table_id: String,
    pub data_col: String,
    pub timestamp_col: String,
    pub id_cols: Vec<String>,
    pub model: String,
    pub horizon: usize,
    pub confidence_level: f64,
}

/// Tabular engine output; column names vary between engine versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultFrame {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build a frame from record objects, columns in first-seen order
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// Accept either `{"columns": [...], "rows": [[...]]}` or an array of records
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                let records: Vec<Map<String, Value>> = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => Ok(map),
                        other => Err(OracleError::SchemaMismatch(format!(
                            "forecast record is not an object: {other}"
                        ))),
                    })
                    .collect::<Result<_>>()?;
                Ok(Self::from_records(&records))
            }
            object @ Value::Object(_) => Ok(serde_json::from_value(object)?),
            other => Err(OracleError::SchemaMismatch(format!(
                "unexpected forecast payload: {other}"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// External time-series forecasting service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastEngine: Send + Sync {
    /// Replace the contents of `table_id` with `rows`
    async fn load_context(&self, table_id: &str, rows: &[ContextRow]) -> Result<()>;

    /// Run a forecast over a previously loaded table
    async fn forecast(&self, query: &ForecastQuery) -> Result<ResultFrame>;
}

/// Forecast engine reached over HTTP with JSON bodies
///
/// * `POST {base}/tables/{table_id}/load` with `{"rows": [...]}`
/// * `POST {base}/forecast` with the [`ForecastQuery`], answering a [`ResultFrame`]
#[derive(Debug, Clone)]
pub struct HttpForecastEngine {
    client: Client,
    base_url: String,
}

impl HttpForecastEngine {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let base_url = config.engine_url.clone().ok_or_else(|| {
            OracleError::Config("forecast engine URL is not configured".to_string())
        })?;
        Self::new(base_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, url: String, body: &Value) -> Result<Value> {
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::provider(
                "forecast engine",
                format!("HTTP {status}: {text}"),
            ));
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ForecastEngine for HttpForecastEngine {
    async fn load_context(&self, table_id: &str, rows: &[ContextRow]) -> Result<()> {
        let url = format!("{}/tables/{table_id}/load", self.base_url);
        debug!(table_id, rows = rows.len(), "uploading forecast context");
        self.post(url, &json!({ "rows": rows })).await?;
        Ok(())
    }

    async fn forecast(&self, query: &ForecastQuery) -> Result<ResultFrame> {
        let url = format!("{}/forecast", self.base_url);
        debug!(table_id = %query.table_id, model = %query.model, "running forecast query");
        let payload = self.post(url, &serde_json::to_value(query)?).await?;
        ResultFrame::from_json(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_context_row_wire_names() {
        let row = ContextRow {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            value: 101.5,
            series_id: "AAPL".to_string(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json[columns::DATA], 101.5);
        assert_eq!(json[columns::ID], "AAPL");
        assert!(json[columns::TIMESTAMP].as_str().unwrap().starts_with("2025-01-02"));
    }

    #[test]
    fn test_frame_from_records() {
        let payload = json!([
            { "forecast_timestamp": "2025-02-01", "forecast_value": 10.0 },
            { "forecast_timestamp": "2025-02-02", "forecast_value": 11.0, "extra": true }
        ]);
        let frame = ResultFrame::from_json(payload).unwrap();
        assert_eq!(frame.columns, vec!["forecast_timestamp", "forecast_value", "extra"]);
        assert_eq!(frame.rows[0][2], Value::Null);
        assert_eq!(frame.rows[1][1], json!(11.0));
    }

    #[test]
    fn test_frame_from_columnar_payload() {
        let payload = json!({ "columns": ["ts", "pred_val"], "rows": [["2025-02-01", 55.0]] });
        let frame = ResultFrame::from_json(payload).unwrap();
        assert_eq!(frame.columns, vec!["ts", "pred_val"]);
        assert_eq!(frame.rows.len(), 1);

        assert!(ResultFrame::from_json(json!("nope")).is_err());
        assert!(ResultFrame::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_http_engine_requires_url() {
        assert!(HttpForecastEngine::from_config(&OracleConfig::default()).is_err());

        let engine =
            HttpForecastEngine::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(engine.base_url(), "http://localhost:8080");
    }
}
