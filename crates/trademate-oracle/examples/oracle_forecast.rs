//! Run the technical analysis and forecast steps for one ticker
//!
//! To run this example:
//! ```bash
//! export FORECAST_ENGINE_URL=http://localhost:8080
//! export ALPHA_VANTAGE_API_KEY=your_key_here  # Optional
//!
//! cargo run --example oracle_forecast AAPL
//! ```

use serde_json::json;
use std::env;
use std::sync::Arc;
use trademate_core::{SessionStore, keys};
use trademate_oracle::{
    HttpForecastEngine, Oracle, OracleConfig, OracleForecastState, OracleForecastTool,
    PriceHistory, TechnicalAnalysisTool,
};
use trademate_tools::ToolRegistry;
use trademate_utils::{Config, init_tracing_with};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing_with("warn,trademate_oracle=info");
    let app = Config::from_env();

    let ticker = env::args().nth(1).unwrap_or_else(|| "AAPL".to_string());

    let config = OracleConfig::builder().with_env_keys().build()?;
    println!("=== {} ({}) ===", app.app_name, app.environment);
    println!("Ticker:    {ticker}");
    println!("Providers: {:?}", config.providers);
    println!("Model:     {}\n", config.model_name);

    let history = Arc::new(PriceHistory::from_config(&config)?);
    let engine = Arc::new(HttpForecastEngine::from_config(&config)?);

    let registry = ToolRegistry::new();
    registry.register(Arc::new(TechnicalAnalysisTool::new(
        &config,
        Arc::clone(&history),
    )));
    let oracle = Oracle::new(config, history, engine);
    registry.register(Arc::new(OracleForecastTool::new(Arc::new(oracle))));

    let sessions = SessionStore::new();
    let session = sessions.session("example");
    let params = json!({ "ticker": ticker });

    match registry.invoke("technical_analysis", params.clone(), &session).await {
        Ok(output) => println!(
            "Technical analysis:\n{}\n",
            serde_json::to_string_pretty(&output["technical_analysis"])?
        ),
        Err(e) => eprintln!("Technical analysis failed: {e}\n"),
    }

    let output = registry.invoke("oracle_forecast", params, &session).await?;
    println!("Forecast:\n{}\n", serde_json::to_string_pretty(&output)?);

    if let Some(state) = session.get_typed::<OracleForecastState>(keys::ORACLE_FORECAST)? {
        println!(
            "Predicted close in {}: {:.2} [{:.2}, {:.2}]",
            state.forecast_horizon,
            state.predicted_price,
            state.confidence_interval[0],
            state.confidence_interval[1],
        );
    }

    let pipeline = session.pipeline()?;
    println!("Completed stages: {:?}", pipeline.completed_stages());

    Ok(())
}
