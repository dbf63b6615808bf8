//! Step framework for the trademate pipeline
//!
//! Each pipeline step is exposed as a [`Tool`] that an external orchestrator
//! invokes by name. Tools receive the caller's session explicitly so that
//! stage progress and artifacts are always scoped to one session.

pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::Tool;
