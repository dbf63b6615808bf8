//! Forecast step

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use trademate_core::{Result as StepResult, SessionHandle, Stage, keys};
use trademate_tools::Tool;

use super::TickerParams;
use crate::forecast::Oracle;
use crate::history::PriceHistory;

/// Runs the [`Oracle`] and publishes its downstream state to the session
pub struct OracleForecastTool {
    oracle: Arc<Oracle>,
}

impl OracleForecastTool {
    pub fn new(oracle: Arc<Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Tool for OracleForecastTool {
    async fn execute(&self, params: Value, session: &SessionHandle) -> StepResult<Value> {
        let params = TickerParams::parse(params)?;
        let ticker = PriceHistory::normalize_ticker(&params.ticker);

        session.advance(Stage::OracleForecast, &ticker)?;

        let outcome = self.oracle.forecast(&ticker).await?;
        match &outcome.downstream {
            Some(state) => {
                session.insert_typed(keys::ORACLE_FORECAST, state)?;
                info!(
                    session = session.id(),
                    ticker = %ticker,
                    predicted_price = state.predicted_price,
                    "oracle forecast published"
                );
            }
            None => warn!(
                session = session.id(),
                ticker = %ticker,
                status = ?outcome.result.status(),
                "no forecast to publish"
            ),
        }

        Ok(json!({
            "result": outcome.result,
            "signal_quality": outcome.quality,
        }))
    }

    fn name(&self) -> &str {
        "oracle_forecast"
    }

    fn description(&self) -> &str {
        "Forecast the next 30 trading days of closes for a ticker with 80% confidence \
         bands. Price history is cleaned of outliers and denoised before it is sent \
         to the forecast engine."
    }

    fn input_schema(&self) -> Value {
        TickerParams::schema()
    }

    fn stage(&self) -> Option<Stage> {
        Some(Stage::OracleForecast)
    }
}
