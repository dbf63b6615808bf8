//! Technical analysis step

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;
use trademate_core::{Result as StepResult, SessionHandle, Stage, keys};
use trademate_tools::Tool;

use super::TickerParams;
use crate::config::OracleConfig;
use crate::error::Result;
use crate::history::PriceHistory;
use crate::indicators::{TechnicalIndicatorEngine, TechnicalSnapshot};
use crate::series::Period;

/// Computes a [`TechnicalSnapshot`] and publishes it to the session
pub struct TechnicalAnalysisTool {
    history: Arc<PriceHistory>,
    period: Period,
    engine: TechnicalIndicatorEngine,
}

impl TechnicalAnalysisTool {
    pub fn new(config: &OracleConfig, history: Arc<PriceHistory>) -> Self {
        Self {
            history,
            period: config.technical_period,
            engine: TechnicalIndicatorEngine::new(),
        }
    }

    async fn analyze(&self, ticker: &str) -> Result<TechnicalSnapshot> {
        let series = self.history.fetch(ticker, self.period).await?;
        self.engine.snapshot(&series.closes())
    }
}

#[async_trait]
impl Tool for TechnicalAnalysisTool {
    async fn execute(&self, params: Value, session: &SessionHandle) -> StepResult<Value> {
        let params = TickerParams::parse(params)?;
        let ticker = PriceHistory::normalize_ticker(&params.ticker);

        // Recorded up front so a failed run still counts as attempted.
        session.advance(Stage::TechnicalAnalysis, &ticker)?;

        let snapshot = self.analyze(&ticker).await?;
        session.insert_typed(keys::TECHNICAL_ANALYSIS, &snapshot)?;
        info!(
            session = session.id(),
            ticker = %ticker,
            trend = ?snapshot.trend,
            rsi = snapshot.rsi,
            "technical analysis published"
        );

        Ok(json!({
            "ticker": ticker,
            "period": self.period.as_str(),
            "technical_analysis": snapshot,
        }))
    }

    fn name(&self) -> &str {
        "technical_analysis"
    }

    fn description(&self) -> &str {
        "Compute trend, RSI, MACD, moving averages and Bollinger bands from one year \
         of daily closes and publish the snapshot to the session."
    }

    fn input_schema(&self) -> Value {
        TickerParams::schema()
    }

    fn stage(&self) -> Option<Stage> {
        Some(Stage::TechnicalAnalysis)
    }
}
