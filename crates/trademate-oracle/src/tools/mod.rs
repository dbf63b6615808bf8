//! Pipeline steps exposed to the orchestrator

pub mod oracle;
pub mod technical;

pub use oracle::OracleForecastTool;
pub use technical::TechnicalAnalysisTool;

use serde::Deserialize;
use serde_json::{Value, json};

/// Parameters shared by the ticker-scoped steps
#[derive(Debug, Deserialize)]
pub(crate) struct TickerParams {
    pub ticker: String,
}

impl TickerParams {
    pub(crate) fn parse(params: Value) -> trademate_core::Result<Self> {
        let params: Self = serde_json::from_value(params).map_err(|e| {
            trademate_core::Error::ProcessingFailed(format!("Invalid parameters: {e}"))
        })?;
        if params.ticker.trim().is_empty() {
            return Err(trademate_core::Error::ProcessingFailed(
                "Invalid parameters: ticker is empty".to_string(),
            ));
        }
        Ok(params)
    }

    pub(crate) fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": {
                    "type": "string",
                    "description": "Ticker symbol (e.g., AAPL, RELIANCE.NS)"
                }
            },
            "required": ["ticker"]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker_params() {
        let params = TickerParams::parse(json!({ "ticker": "msft" })).unwrap();
        assert_eq!(params.ticker, "msft");

        assert!(TickerParams::parse(json!({})).is_err());
        assert!(TickerParams::parse(json!({ "ticker": "  " })).is_err());
        assert_eq!(TickerParams::schema()["required"][0], "ticker");
    }
}
