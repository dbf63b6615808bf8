//! Packaging conditioned series into forecast-engine requests

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::engine::{ContextRow, ForecastEngine, ForecastQuery, ResultFrame, columns};
use crate::config::OracleConfig;
use crate::error::{OracleError, Result, UpstreamStage};
use crate::signal::ConditionedSeries;

/// Context table name for `ticker`
pub fn table_id_for(ticker: &str) -> String {
    let safe: String = ticker
        .chars()
        .map(|c| if matches!(c, '-' | '=' | '.') { '_' } else { c })
        .collect();
    format!("temp_context_{safe}")
}

/// A ready-to-submit upload plus query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub request_id: Uuid,
    pub ticker: String,
    pub rows: Vec<ContextRow>,
    pub query: ForecastQuery,
}

impl ForecastRequest {
    pub fn table_id(&self) -> &str {
        &self.query.table_id
    }
}

/// Windows a conditioned series into context rows and hands it to an engine
#[derive(Debug, Clone)]
pub struct ForecastRequestBuilder {
    context_window: usize,
    horizon: usize,
    confidence_level: f64,
    model: String,
}

impl Default for ForecastRequestBuilder {
    fn default() -> Self {
        Self::from_config(&OracleConfig::default())
    }
}

impl ForecastRequestBuilder {
    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            context_window: config.context_window,
            horizon: config.horizon,
            confidence_level: config.confidence_level,
            model: config.model_name.clone(),
        }
    }

    /// Trailing `context_window` clean closes as context rows for `ticker`
    pub fn build(&self, ticker: &str, conditioned: &ConditionedSeries) -> Result<ForecastRequest> {
        if conditioned.is_empty() {
            return Err(OracleError::SchemaMismatch(format!(
                "conditioned series for {ticker} has no rows"
            )));
        }

        let window = conditioned.tail(self.context_window);
        if let Some(bad) = window.iter().find(|r| !r.clean_close.is_finite()) {
            return Err(OracleError::SchemaMismatch(format!(
                "clean close at {} is not finite",
                bad.timestamp
            )));
        }

        let rows = window
            .iter()
            .map(|r| ContextRow {
                timestamp: r.timestamp,
                value: r.clean_close,
                series_id: ticker.to_string(),
            })
            .collect();

        Ok(ForecastRequest {
            request_id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            rows,
            query: ForecastQuery {
                table_id: table_id_for(ticker),
                data_col: columns::DATA.to_string(),
                timestamp_col: columns::TIMESTAMP.to_string(),
                id_cols: vec![columns::ID.to_string()],
                model: self.model.clone(),
                horizon: self.horizon,
                confidence_level: self.confidence_level,
            },
        })
    }

    /// Upload the context then run the query.
    ///
    /// Any engine failure becomes [`OracleError::UpstreamUnavailable`] tagged
    /// with the stage that failed.
    pub async fn submit(
        &self,
        engine: &dyn ForecastEngine,
        request: &ForecastRequest,
    ) -> Result<ResultFrame> {
        engine
            .load_context(request.table_id(), &request.rows)
            .await
            .map_err(|e| OracleError::UpstreamUnavailable {
                stage: UpstreamStage::Upload,
                reason: e.to_string(),
            })?;

        let frame = engine
            .forecast(&request.query)
            .await
            .map_err(|e| OracleError::UpstreamUnavailable {
                stage: UpstreamStage::Query,
                reason: e.to_string(),
            })?;

        info!(
            request_id = %request.request_id,
            ticker = %request.ticker,
            columns = ?frame.columns,
            rows = frame.rows.len(),
            "forecast received"
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::engine::MockForecastEngine;
    use crate::series::PriceSeries;
    use crate::signal::SignalConditioner;
    use chrono::{TimeZone, Utc};

    fn conditioned(len: usize) -> ConditionedSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let closes: Vec<f64> = (0..len).map(|i| 50.0 + (i as f64 / 7.0).sin()).collect();
        let series = PriceSeries::from_closes("BRK-B", start, &closes).unwrap();
        SignalConditioner::default().condition(&series).unwrap()
    }

    #[test]
    fn test_table_id_sanitizes_ticker() {
        assert_eq!(table_id_for("BRK-B"), "temp_context_BRK_B");
        assert_eq!(table_id_for("RELIANCE.NS"), "temp_context_RELIANCE_NS");
        assert_eq!(table_id_for("EURUSD=X"), "temp_context_EURUSD_X");
    }

    #[test]
    fn test_build_keeps_trailing_window() {
        let conditioned = conditioned(300);
        let request = ForecastRequestBuilder::default()
            .build("BRK-B", &conditioned)
            .unwrap();

        assert_eq!(request.rows.len(), 120);
        let last_row = conditioned.rows()[conditioned.len() - 1];
        assert_eq!(request.rows[119].timestamp, last_row.timestamp);
        assert_eq!(request.rows[119].value, last_row.clean_close);
        assert!(request.rows.iter().all(|r| r.series_id == "BRK-B"));
        assert_eq!(request.query.horizon, 30);
        assert_eq!(request.query.model, "TimesFM 2.5");
        assert_eq!(request.table_id(), "temp_context_BRK_B");
    }

    #[test]
    fn test_short_series_sends_everything() {
        let request = ForecastRequestBuilder::default()
            .build("BRK-B", &conditioned(40))
            .unwrap();
        assert_eq!(request.rows.len(), 39);
    }

    #[test]
    fn test_empty_or_non_finite_series_is_a_schema_mismatch() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let conditioner = SignalConditioner::default();
        let builder = ForecastRequestBuilder::default();

        let single = PriceSeries::from_closes("BRK-B", start, &[50.0]).unwrap();
        let empty = conditioner.assemble(&single, Ok(vec![50.0]));
        assert!(empty.is_empty());
        assert!(matches!(
            builder.build("BRK-B", &empty),
            Err(OracleError::SchemaMismatch(_))
        ));

        let series = PriceSeries::from_closes("BRK-B", start, &[50.0, 51.0, 52.0]).unwrap();
        let broken = conditioner.assemble(&series, Ok(vec![50.0, f64::NAN, 52.0]));
        assert!(matches!(
            builder.build("BRK-B", &broken),
            Err(OracleError::SchemaMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_runs_upload_then_query() {
        let request = ForecastRequestBuilder::default()
            .build("BRK-B", &conditioned(40))
            .unwrap();

        let mut engine = MockForecastEngine::new();
        let mut seq = mockall::Sequence::new();
        engine
            .expect_load_context()
            .withf(|table, rows| table == "temp_context_BRK_B" && rows.len() == 39)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        engine
            .expect_forecast()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ResultFrame::new(vec!["ts".into(), "value".into()], vec![])));

        let frame = ForecastRequestBuilder::default()
            .submit(&engine, &request)
            .await
            .unwrap();
        assert_eq!(frame.columns.len(), 2);
    }

    #[tokio::test]
    async fn test_upload_failure_is_tagged() {
        let request = ForecastRequestBuilder::default()
            .build("BRK-B", &conditioned(40))
            .unwrap();

        let mut engine = MockForecastEngine::new();
        engine
            .expect_load_context()
            .returning(|_, _| Err(OracleError::Other("permission denied".to_string())));
        engine.expect_forecast().never();

        let err = ForecastRequestBuilder::default()
            .submit(&engine, &request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::UpstreamUnavailable {
                stage: UpstreamStage::Upload,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_query_failure_is_tagged() {
        let request = ForecastRequestBuilder::default()
            .build("BRK-B", &conditioned(40))
            .unwrap();

        let mut engine = MockForecastEngine::new();
        engine.expect_load_context().returning(|_, _| Ok(()));
        engine
            .expect_forecast()
            .returning(|_| Err(OracleError::Other("syntax error".to_string())));

        let err = ForecastRequestBuilder::default()
            .submit(&engine, &request)
            .await
            .unwrap_err();
        match err {
            OracleError::UpstreamUnavailable { stage, reason } => {
                assert_eq!(stage, UpstreamStage::Query);
                assert!(reason.contains("syntax error"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
