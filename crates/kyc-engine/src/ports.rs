//! # Persistence and Audit Ports
//!
//! Everything the orchestrator persists goes through one of these traits.
//! Implementations are injected at construction; the in-memory versions in
//! [`crate::memory`] are the defaults.
//!
//! The snapshot log, review queue and credential store ports live with
//! their owning crates and are re-exported here.

use serde::{Deserialize, Serialize};

use kyc_core::{KycError, SessionId, SubjectId, Timestamp};
use kyc_state::{BiometricRecord, DocumentRecord, VerificationSession};

pub use kyc_credential::CredentialStore;
pub use kyc_review::ReviewQueueStore;
pub use kyc_risk::SnapshotLog;

// ─── Sessions ────────────────────────────────────────────────────────

/// Result of a compare-and-set write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The write was applied; the stored session carries the new version.
    Committed(VerificationSession),
    /// Another writer got there first.
    Conflict { current_version: u64 },
}

pub trait SessionRepository: Send + Sync {
    /// Allocate the next creation sequence. Strictly increasing across
    /// every caller sharing the repository.
    fn next_sequence(&self) -> Result<u64, KycError>;

    fn insert(&self, session: VerificationSession) -> Result<VerificationSession, KycError>;

    fn get(&self, id: &SessionId) -> Option<VerificationSession>;

    /// Write `session` if the stored version still equals `session.version`,
    /// incrementing the version on success.
    fn compare_and_set(&self, session: VerificationSession) -> Result<CasOutcome, KycError>;

    /// Sessions of a subject, oldest first.
    fn for_subject(&self, subject_id: &SubjectId) -> Vec<VerificationSession>;
}

// ─── Evidence ────────────────────────────────────────────────────────

pub trait EvidenceStore: Send + Sync {
    /// Insert or replace a document record by id.
    fn put_document(&self, record: DocumentRecord) -> Result<(), KycError>;

    fn documents(&self, session_id: &SessionId) -> Vec<DocumentRecord>;

    fn put_biometric(&self, record: BiometricRecord) -> Result<(), KycError>;

    /// Biometric captures of a session in capture order.
    fn biometrics(&self, session_id: &SessionId) -> Vec<BiometricRecord>;
}

// ─── Audit ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SessionInitiated,
    StepTransition,
    StatusTransition,
    DecisionTransition,
    FlowEscalated,
    AnomalyFlagged,
    RiskComputed,
    ReviewEnqueued,
    ReviewResolved,
    CredentialIssued,
    CredentialRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionInitiated => "session_initiated",
            Self::StepTransition => "step_transition",
            Self::StatusTransition => "status_transition",
            Self::DecisionTransition => "decision_transition",
            Self::FlowEscalated => "flow_escalated",
            Self::AnomalyFlagged => "anomaly_flagged",
            Self::RiskComputed => "risk_computed",
            Self::ReviewEnqueued => "review_enqueued",
            Self::ReviewResolved => "review_resolved",
            Self::CredentialIssued => "credential_issued",
            Self::CredentialRevoked => "credential_revoked",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at: Timestamp,
    pub action: AuditAction,
    pub session_id: Option<SessionId>,
    pub subject_id: Option<SubjectId>,
    pub detail: String,
    pub actor: Option<String>,
}

impl AuditEvent {
    pub fn for_session(session: &VerificationSession, action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            at: Timestamp::now(),
            action,
            session_id: Some(session.id),
            subject_id: Some(session.subject_id.clone()),
            detail: detail.into(),
            actor: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Append-only audit trail. A failing sink never blocks the operation that
/// produced the event.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), KycError>;
}
