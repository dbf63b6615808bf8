//! Core abstractions for the trademate analysis pipeline
//!
//! This crate defines the pipeline-stage state machine and the per-session
//! store that every pipeline step reads and writes. Steps receive a
//! [`SessionHandle`] explicitly; there is no process-wide state.

pub mod error;
pub mod pipeline;
pub mod session;

pub use error::{Error, Result};
pub use pipeline::{PipelineState, Stage};
pub use session::{SessionHandle, SessionRecord, SessionStore, keys};
