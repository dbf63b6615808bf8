//! Per-session pipeline state
//!
//! Every pipeline step receives a [`SessionHandle`] for the session it runs
//! in. The handle wraps the session's [`SessionRecord`] in its own mutex, so
//! writers to one session serialize while other sessions proceed
//! independently. The [`SessionStore`] map is only locked to look handles up.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pipeline::{PipelineState, Stage};

/// Well-known artifact keys published by pipeline steps
pub mod keys {
    /// `TechnicalSnapshot` written by the technical analysis step
    pub const TECHNICAL_ANALYSIS: &str = "technical_analysis";
    /// Oracle forecast state written by the forecast step
    pub const ORACLE_FORECAST: &str = "oracle_forecast";
}

const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Everything recorded for one analysis session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub pipeline: PipelineState,
    pub artifacts: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl SessionRecord {
    fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            pipeline: PipelineState::new(),
            artifacts: HashMap::new(),
            created_at: now,
            last_active: now,
        }
    }

    fn update_activity(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn is_expired(&self, max_age_seconds: i64) -> bool {
        let max_age = chrono::Duration::seconds(max_age_seconds);
        Utc::now() - self.last_active > max_age
    }
}

/// Shared handle to one session's state
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    record: Arc<Mutex<SessionRecord>>,
}

impl SessionHandle {
    /// Create a detached session, useful for single-shot callers and tests
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            id: Arc::from(session_id.as_str()),
            record: Arc::new(Mutex::new(SessionRecord::new(session_id))),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionRecord>> {
        self.record
            .lock()
            .map_err(|_| Error::LockPoisoned(self.id.to_string()))
    }

    /// Record a transition to `stage` for `ticker` and return the new state
    pub fn advance(&self, stage: Stage, ticker: &str) -> Result<PipelineState> {
        let mut record = self.lock()?;
        record.pipeline.advance(stage, ticker);
        record.update_activity();
        debug!(session = %self.id, %stage, ticker, "pipeline stage advanced");
        Ok(record.pipeline.clone())
    }

    /// Snapshot of the pipeline state
    pub fn pipeline(&self) -> Result<PipelineState> {
        Ok(self.lock()?.pipeline.clone())
    }

    /// Snapshot of the whole record
    pub fn snapshot(&self) -> Result<SessionRecord> {
        Ok(self.lock()?.clone())
    }

    /// Publish an artifact under `key`, replacing any previous value
    pub fn insert_typed<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| {
            Error::ProcessingFailed(format!("Failed to serialize session artifact: {e}"))
        })?;
        let mut record = self.lock()?;
        record.artifacts.insert(key.into(), json_value);
        record.update_activity();
        Ok(())
    }

    /// Read an artifact published under `key`
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let record = self.lock()?;
        match record.artifacts.get(key) {
            None => Ok(None),
            Some(value) => {
                let typed = serde_json::from_value(value.clone()).map_err(|e| {
                    Error::ProcessingFailed(format!(
                        "Failed to deserialize session artifact '{key}': {e}"
                    ))
                })?;
                Ok(Some(typed))
            }
        }
    }

    pub fn contains_artifact(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.artifacts.contains_key(key))
    }

    fn is_expired(&self, max_age_seconds: i64) -> bool {
        // A poisoned session is unusable, so it counts as expired.
        self.record
            .lock()
            .map_or(true, |record| record.is_expired(max_age_seconds))
    }
}

/// Sessions keyed by the orchestrator's session identifier
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    session_ttl: i64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_ttl: DEFAULT_SESSION_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.session_ttl = ttl_seconds;
        self
    }

    /// Get the handle for `session_id`, creating a fresh session when it is
    /// missing or expired
    pub fn session(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.get(session_id) {
            if !handle.is_expired(self.session_ttl) {
                return handle;
            }
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have created it between the two locks.
        if let Some(handle) = sessions.get(session_id) {
            if !handle.is_expired(self.session_ttl) {
                return handle.clone();
            }
        }
        debug!(session = session_id, "creating pipeline session");
        let handle = SessionHandle::new(session_id);
        sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Existing handle for `session_id`, if any
    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }

    /// Drop expired sessions, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let initial_count = sessions.len();
        sessions.retain(|_, handle| !handle.is_expired(self.session_ttl));
        initial_count - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::thread;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Artifact {
        price: f64,
        label: String,
    }

    #[test]
    fn test_same_id_returns_same_session() {
        let store = SessionStore::new();
        let a = store.session("sess-1");
        a.advance(Stage::MarketScan, "AAPL").unwrap();

        let b = store.session("sess-1");
        assert!(b.pipeline().unwrap().has_completed(Stage::MarketScan));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        store
            .session("a")
            .advance(Stage::OracleForecast, "AAPL")
            .unwrap();

        let other = store.session("b").pipeline().unwrap();
        assert!(other.completed_stages().is_empty());
        assert_eq!(other.target_ticker(), None);
    }

    #[test]
    fn test_typed_artifacts() {
        let session = SessionHandle::new("sess");
        let artifact = Artifact {
            price: 101.25,
            label: "Uptrend".to_string(),
        };

        session
            .insert_typed(keys::TECHNICAL_ANALYSIS, &artifact)
            .unwrap();

        let read: Artifact = session.get_typed(keys::TECHNICAL_ANALYSIS).unwrap().unwrap();
        assert_eq!(read, artifact);
        assert!(session.contains_artifact(keys::TECHNICAL_ANALYSIS).unwrap());

        let missing: Option<Artifact> = session.get_typed(keys::ORACLE_FORECAST).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_get_typed_wrong_shape_errors() {
        let session = SessionHandle::new("sess");
        session.insert_typed("k", &42).unwrap();
        let result: Result<Option<Artifact>> = session.get_typed("k");
        assert!(matches!(result, Err(Error::ProcessingFailed(_))));
    }

    #[test]
    fn test_concurrent_writers_serialize() {
        let store = Arc::new(SessionStore::new());
        let stages = [
            Stage::MarketScan,
            Stage::TechnicalAnalysis,
            Stage::OracleForecast,
            Stage::QuantSynthesis,
        ];

        let workers: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                let stage = stages[i % stages.len()];
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.session("shared").advance(stage, "NVDA").unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let state = store.session("shared").pipeline().unwrap();
        assert_eq!(state.completed_stages().len(), stages.len());
        for stage in stages {
            assert_eq!(
                state.completed_stages().iter().filter(|s| **s == stage).count(),
                1
            );
        }
    }

    #[test]
    fn test_expired_sessions_are_replaced_and_cleaned() {
        let store = SessionStore::new().with_ttl(-1);
        store
            .session("old")
            .advance(Stage::MarketScan, "AAPL")
            .unwrap();

        // With a negative TTL every session is already stale.
        let fresh = store.session("old").pipeline().unwrap();
        assert!(fresh.completed_stages().is_empty());

        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::new();
        store.session("x");
        assert!(store.remove("x"));
        assert!(!store.remove("x"));
        assert!(store.get("x").is_none());
    }
}
