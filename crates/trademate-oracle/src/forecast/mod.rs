//! Forecast-engine handoff and result reconciliation

pub mod engine;
pub mod oracle;
pub mod reconciler;
pub mod request;

pub use engine::{ContextRow, ForecastEngine, ForecastQuery, HttpForecastEngine, ResultFrame};
pub use oracle::{HistoryPoint, Oracle, OracleForecastState, OracleOutcome};
pub use reconciler::{
    ForecastPoint, ForecastResult, ForecastResultReconciler, ForecastStatus, ResolvedColumns,
    resolve_columns,
};
pub use request::{ForecastRequest, ForecastRequestBuilder, table_id_for};
