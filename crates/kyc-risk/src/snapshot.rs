//! # Snapshot Log
//!
//! Append-only history of risk score snapshots, keyed by session.
//! Snapshots are never updated or removed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use kyc_core::{KycError, SessionId};

use crate::engine::RiskScoreSnapshot;

/// Persistence port for risk snapshots.
pub trait SnapshotLog: Send + Sync {
    /// Append a snapshot, assigning the next sequence number for its
    /// session (starting at 1). Returns the stored snapshot.
    fn append(&self, snapshot: RiskScoreSnapshot) -> Result<RiskScoreSnapshot, KycError>;

    /// All snapshots of a session in append order.
    fn history(&self, session_id: &SessionId) -> Vec<RiskScoreSnapshot>;

    fn latest(&self, session_id: &SessionId) -> Option<RiskScoreSnapshot> {
        self.history(session_id).pop()
    }

    /// The newest snapshot of every session, in no particular order.
    fn latest_per_session(&self) -> Vec<RiskScoreSnapshot>;
}

/// In-memory [`SnapshotLog`]. Cheaply cloneable; clones share the data.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotLog {
    data: Arc<RwLock<HashMap<SessionId, Vec<RiskScoreSnapshot>>>>,
}

impl InMemorySnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotLog for InMemorySnapshotLog {
    fn append(&self, mut snapshot: RiskScoreSnapshot) -> Result<RiskScoreSnapshot, KycError> {
        let mut guard = self.data.write();
        let history = guard.entry(snapshot.session_id).or_default();
        snapshot.sequence = history.len() as u64 + 1;
        history.push(snapshot.clone());
        Ok(snapshot)
    }

    fn history(&self, session_id: &SessionId) -> Vec<RiskScoreSnapshot> {
        self.data.read().get(session_id).cloned().unwrap_or_default()
    }

    fn latest(&self, session_id: &SessionId) -> Option<RiskScoreSnapshot> {
        self.data
            .read()
            .get(session_id)
            .and_then(|h| h.last().cloned())
    }

    fn latest_per_session(&self) -> Vec<RiskScoreSnapshot> {
        self.data
            .read()
            .values()
            .filter_map(|h| h.last().cloned())
            .collect()
    }
}
