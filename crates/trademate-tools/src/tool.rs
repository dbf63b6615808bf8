//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value;
use trademate_core::{Result, SessionHandle, Stage};

/// A pipeline step that an orchestrator can execute
///
/// Tools record their stage on the session they are given and publish any
/// artifact they produce there, so downstream steps can rely on the session
/// alone to see what has already run.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the step with given parameters
    ///
    /// # Arguments
    ///
    /// * `params` - Tool input as JSON value (should match input_schema)
    /// * `session` - State of the session the step runs in
    async fn execute(&self, params: Value, session: &SessionHandle) -> Result<Value>;

    /// Unique name of the tool within a [`ToolRegistry`](crate::ToolRegistry)
    fn name(&self) -> &str;

    /// Description shown to the orchestrator
    fn description(&self) -> &str;

    /// Input schema (JSON Schema format)
    fn input_schema(&self) -> Value;

    /// Pipeline stage this tool records, if any
    fn stage(&self) -> Option<Stage> {
        None
    }
}
