//! # In-Memory Stores
//!
//! Default implementations of the session and evidence ports.
//!
//! Locks are `parking_lot` and are never held across a collaborator call;
//! every method takes the lock for a single map operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use kyc_core::{DocumentId, KycError, SessionId, SubjectId};
use kyc_state::{BiometricRecord, DocumentRecord, VerificationSession};

use crate::ports::{CasOutcome, EvidenceStore, SessionRepository};

/// In-memory [`SessionRepository`]. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionRepository {
    data: Arc<RwLock<HashMap<SessionId, VerificationSession>>>,
    sequence: Arc<AtomicU64>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn next_sequence(&self) -> Result<u64, KycError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn insert(&self, session: VerificationSession) -> Result<VerificationSession, KycError> {
        let mut guard = self.data.write();
        if guard.contains_key(&session.id) {
            return Err(KycError::Storage(format!("session {} already exists", session.id)));
        }
        guard.insert(session.id, session.clone());
        Ok(session)
    }

    fn get(&self, id: &SessionId) -> Option<VerificationSession> {
        self.data.read().get(id).cloned()
    }

    fn compare_and_set(&self, mut session: VerificationSession) -> Result<CasOutcome, KycError> {
        let mut guard = self.data.write();
        let stored = guard
            .get_mut(&session.id)
            .ok_or_else(|| KycError::SessionNotFound(session.id.to_string()))?;
        if stored.version != session.version {
            return Ok(CasOutcome::Conflict {
                current_version: stored.version,
            });
        }
        session.version += 1;
        *stored = session.clone();
        Ok(CasOutcome::Committed(session))
    }

    fn for_subject(&self, subject_id: &SubjectId) -> Vec<VerificationSession> {
        let mut sessions: Vec<VerificationSession> = self
            .data
            .read()
            .values()
            .filter(|s| s.subject_id == *subject_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.created_at, s.sequence));
        sessions
    }
}

#[derive(Debug, Default)]
struct Evidence {
    documents: HashMap<SessionId, Vec<DocumentRecord>>,
    biometrics: HashMap<SessionId, Vec<BiometricRecord>>,
}

/// In-memory [`EvidenceStore`]. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEvidenceStore {
    data: Arc<RwLock<Evidence>>,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, session_id: &SessionId, id: &DocumentId) -> Option<DocumentRecord> {
        self.data
            .read()
            .documents
            .get(session_id)
            .and_then(|docs| docs.iter().find(|d| d.id == *id).cloned())
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn put_document(&self, record: DocumentRecord) -> Result<(), KycError> {
        let mut guard = self.data.write();
        let docs = guard.documents.entry(record.session_id).or_default();
        match docs.iter_mut().find(|d| d.id == record.id) {
            Some(existing) => *existing = record,
            None => docs.push(record),
        }
        Ok(())
    }

    fn documents(&self, session_id: &SessionId) -> Vec<DocumentRecord> {
        self.data
            .read()
            .documents
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn put_biometric(&self, record: BiometricRecord) -> Result<(), KycError> {
        self.data
            .write()
            .biometrics
            .entry(record.session_id)
            .or_default()
            .push(record);
        Ok(())
    }

    fn biometrics(&self, session_id: &SessionId) -> Vec<BiometricRecord> {
        self.data
            .read()
            .biometrics
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}
