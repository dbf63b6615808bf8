//! Pipeline stage state machine
//!
//! A [`PipelineState`] records which analysis stages have run for the active
//! ticker of one session. Moving to a stage always records it as completed;
//! the completed set only grows. Ordering between stages is the caller's
//! concern and is not enforced here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Named checkpoint in the analysis workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No step has run yet
    #[default]
    Idle,
    /// Market/news scan of the ticker
    MarketScan,
    /// Deterministic technical indicators
    TechnicalAnalysis,
    /// Oracle price forecast
    OracleForecast,
    /// Quantitative synthesis of upstream artifacts
    QuantSynthesis,
    /// Strategy formulation
    StrategyFormulation,
    /// Report generation
    ReportGeneration,
    /// Final presentation to the user
    Presentation,
}

impl Stage {
    /// All stages in workflow order
    pub const ALL: [Stage; 8] = [
        Stage::Idle,
        Stage::MarketScan,
        Stage::TechnicalAnalysis,
        Stage::OracleForecast,
        Stage::QuantSynthesis,
        Stage::StrategyFormulation,
        Stage::ReportGeneration,
        Stage::Presentation,
    ];

    /// Wire name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::MarketScan => "market_scan",
            Stage::TechnicalAnalysis => "technical_analysis",
            Stage::OracleForecast => "oracle_forecast",
            Stage::QuantSynthesis => "quant_synthesis",
            Stage::StrategyFormulation => "strategy_formulation",
            Stage::ReportGeneration => "report_generation",
            Stage::Presentation => "presentation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == needle)
            .ok_or_else(|| Error::UnknownStage(s.to_string()))
    }
}

/// Workflow progress for a single session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    current_stage: Stage,
    completed_stages: Vec<Stage>,
    target_ticker: Option<String>,
}

impl PipelineState {
    /// Create an idle pipeline with nothing completed
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `stage` for `ticker`.
    ///
    /// The stage is appended to the completed set if absent and the target
    /// ticker is overwritten.
    pub fn advance(&mut self, stage: Stage, ticker: impl Into<String>) {
        self.current_stage = stage;
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
        self.target_ticker = Some(ticker.into());
    }

    /// Stage most recently entered
    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    /// Stages that have run at least once, in first-run order
    pub fn completed_stages(&self) -> &[Stage] {
        &self.completed_stages
    }

    /// Whether `stage` has run at least once in this session
    pub fn has_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Ticker of the most recent transition
    pub fn target_ticker(&self) -> Option<&str> {
        self.target_ticker.as_deref()
    }
}
