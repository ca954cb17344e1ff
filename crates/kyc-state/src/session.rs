//! # Verification Session State Machine
//!
//! A `VerificationSession` is the single consistent record of one attempt to
//! verify a subject. It owns a fixed 10-entry step table, a lifecycle status,
//! an approval decision and an anomaly list, and records every change in an
//! ordered transition log.
//!
//! ## Status lifecycle
//!
//! ```text
//! Initiated ──▶ InProgress ──▶ Approved ──▶ Completed (terminal)
//!                 │    ▲  │
//!                 │    │  └──▶ PendingManualReview ──▶ Approved
//!                 │    └──────────────┘   │
//!                 │      (more info)      └──▶ Rejected (terminal)
//!                 └──▶ Rejected (terminal)
//!
//! any non-terminal ──▶ Cancelled (terminal)
//! ```
//!
//! ## Approval decision
//!
//! ```text
//! Pending ──▶ AutoApproved
//!    │  ──▶ Rejected
//!    └──▶ ManualReviewRequired ──▶ ManuallyApproved
//!              │    ──▶ Rejected
//!              └──▶ Pending (reviewer requested more information)
//! ```
//!
//! Decisions are taken with [`VerificationSession::decide`], which takes the
//! expected current decision. A caller holding a stale view cannot overwrite
//! a decision another caller already took.
//!
//! ## Invariants
//!
//! - The step key set is fixed: the table is an array indexed by
//!   [`VerificationStep`].
//! - `current_step` only moves forward, except in
//!   [`VerificationSession::reopen_for_more_info`].
//! - Terminal sessions reject every mutation.
//! - Flow escalation never de-escalates and never reopens a step that is not
//!   `pending`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kyc_core::{
    ComponentScores, CredentialId, DocumentCategory, FlowType, KycError, ReviewId, RiskLevel,
    Score, ScoreComponent, SessionId, StepSet, SubjectId, Timestamp, VerificationStep,
    STEP_COUNT,
};

use crate::plan::FlowPlan;

// ─── Step table ─────────────────────────────────────────────────────

/// Status of one step in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One row of the step table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub status: StepStatus,
    /// Hex SHA-256 of the canonical payload, for evidence steps.
    pub payload_digest: Option<String>,
    pub completed_at: Option<Timestamp>,
    /// Free-form outcome note, e.g. the reason a step was skipped.
    pub note: Option<String>,
}

impl StepEntry {
    fn pending() -> Self {
        Self {
            status: StepStatus::Pending,
            payload_digest: None,
            completed_at: None,
            note: None,
        }
    }
}

/// Fixed table of all ten steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTable([StepEntry; STEP_COUNT]);

impl StepTable {
    fn new() -> Self {
        Self(std::array::from_fn(|_| StepEntry::pending()))
    }

    pub fn entry(&self, step: VerificationStep) -> &StepEntry {
        &self.0[step.index()]
    }

    fn entry_mut(&mut self, step: VerificationStep) -> &mut StepEntry {
        &mut self.0[step.index()]
    }

    pub fn status(&self, step: VerificationStep) -> StepStatus {
        self.entry(step).status
    }

    /// Steps currently in `status`.
    pub fn with_status(&self, status: StepStatus) -> StepSet {
        VerificationStep::ALL
            .iter()
            .copied()
            .filter(|s| self.status(*s) == status)
            .collect()
    }

    pub fn completed(&self) -> StepSet {
        self.with_status(StepStatus::Completed)
    }

    pub fn pending(&self) -> StepSet {
        self.with_status(StepStatus::Pending)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VerificationStep, &StepEntry)> {
        VerificationStep::ALL.iter().copied().zip(self.0.iter())
    }
}

// ─── Session status ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    InProgress,
    PendingManualReview,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }

    fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        if next == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Initiated, InProgress)
                | (InProgress, PendingManualReview)
                | (InProgress, Approved)
                | (InProgress, Rejected)
                | (PendingManualReview, Approved)
                | (PendingManualReview, Rejected)
                | (PendingManualReview, InProgress)
                | (Approved, Completed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiated => "INITIATED",
            Self::InProgress => "IN_PROGRESS",
            Self::PendingManualReview => "PENDING_MANUAL_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

// ─── Approval decision ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Pending,
    AutoApproved,
    ManualReviewRequired,
    ManuallyApproved,
    Rejected,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AutoApproved => "auto_approved",
            Self::ManualReviewRequired => "manual_review_required",
            Self::ManuallyApproved => "manually_approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether a credential may be issued for this decision.
    pub fn is_approving(&self) -> bool {
        matches!(self, Self::AutoApproved | Self::ManuallyApproved)
    }

    fn can_transition_to(&self, next: ApprovalDecision) -> bool {
        use ApprovalDecision::*;
        matches!(
            (self, next),
            (Pending, AutoApproved)
                | (Pending, ManualReviewRequired)
                | (Pending, Rejected)
                | (ManualReviewRequired, ManuallyApproved)
                | (ManualReviewRequired, Rejected)
                | (ManualReviewRequired, Pending)
        )
    }
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Anomalies ──────────────────────────────────────────────────────

/// Category of a flagged anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// A collaborator failed; its component fell back to neutral.
    CollaboratorUnavailable,
    LowDocumentAuthenticity,
    MediumDocumentAuthenticity,
    LowLiveness,
    LowFaceMatch,
    BotSuspected,
    DeepfakeSuspected,
    ForgeryDetected,
    SanctionsHit,
    /// Issuance was refused because an administrator revoked the credential.
    CredentialRevoked,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollaboratorUnavailable => "collaborator_unavailable",
            Self::LowDocumentAuthenticity => "low_document_authenticity",
            Self::MediumDocumentAuthenticity => "medium_document_authenticity",
            Self::LowLiveness => "low_liveness",
            Self::LowFaceMatch => "low_face_match",
            Self::BotSuspected => "bot_suspected",
            Self::DeepfakeSuspected => "deepfake_suspected",
            Self::ForgeryDetected => "forgery_detected",
            Self::SanctionsHit => "sanctions_hit",
            Self::CredentialRevoked => "credential_revoked",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Collaborator or check that raised the flag.
    pub source: Option<String>,
    pub detail: String,
    pub raised_at: Timestamp,
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session transition: {from} -> {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("session is in terminal state {state}; cannot apply {attempted}")]
    TerminalState { state: String, attempted: String },
}

impl SessionError {
    fn invalid(from: impl ToString, to: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<SessionError> for KycError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidTransition { from, to, reason } => {
                KycError::InvalidTransition { from, to, reason }
            }
            SessionError::TerminalState { state, attempted } => KycError::InvalidTransition {
                from: state,
                to: attempted,
                reason: "session is terminal".into(),
            },
        }
    }
}

// ─── Transition log ─────────────────────────────────────────────────

/// What a transition record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "step")]
pub enum TransitionScope {
    Status,
    Decision,
    Flow,
    Step(VerificationStep),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTransitionRecord {
    pub scope: TransitionScope,
    pub from: String,
    pub to: String,
    pub at: Timestamp,
    pub reason: String,
}

// ─── Session ────────────────────────────────────────────────────────

/// Raw biometric signals that feed re-evaluation penalties.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BiometricSignals {
    pub liveness: Option<Score>,
    pub face_match: Option<Score>,
    pub deepfake: Option<Score>,
}

/// Outcome of checking an evidence submission against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The step is eligible and will be completed.
    Fresh,
    /// The step is already completed with the identical payload.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub id: SessionId,
    pub subject_id: SubjectId,
    pub status: SessionStatus,
    pub current_step: VerificationStep,
    pub steps: StepTable,
    pub risk_level: RiskLevel,
    pub verification_mode: FlowType,
    pub flow: FlowPlan,
    pub initial_risk_score: Score,
    pub running_risk_score: Score,
    pub collected_document_refs: BTreeMap<DocumentCategory, Vec<String>>,
    pub component_scores: ComponentScores,
    pub biometric_signals: BiometricSignals,
    pub identity_integrity_score: Option<Score>,
    pub approval_decision: ApprovalDecision,
    pub anomalies: Vec<Anomaly>,
    pub bot_likelihood: Option<Score>,
    pub sanctions_hit: bool,
    pub review_id: Option<ReviewId>,
    pub is_reverification: bool,
    pub linked_credential_id: Option<CredentialId>,
    pub transitions: Vec<SessionTransitionRecord>,
    /// Compare-and-set counter maintained by the session repository.
    pub version: u64,
    /// Creation order among all sessions, assigned by the session
    /// repository. Later sessions carry larger values; credential renewal
    /// uses it to ignore sessions older than the one it last applied.
    #[serde(default)]
    pub sequence: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl VerificationSession {
    /// Create a session in `Initiated` at step 0 with the selected plan.
    pub fn new(
        subject_id: SubjectId,
        flow: FlowPlan,
        initial_risk_score: Score,
        device_trust: Score,
    ) -> Self {
        let now = Timestamp::now();
        let mut component_scores = ComponentScores::default();
        component_scores.set(ScoreComponent::DeviceTrust, device_trust);
        Self {
            id: SessionId::new(),
            subject_id,
            status: SessionStatus::Initiated,
            current_step: VerificationStep::PreVerification,
            steps: StepTable::new(),
            risk_level: flow.flow_type.risk_level(),
            verification_mode: flow.flow_type,
            flow,
            initial_risk_score,
            running_risk_score: initial_risk_score,
            collected_document_refs: BTreeMap::new(),
            component_scores,
            biometric_signals: BiometricSignals::default(),
            identity_integrity_score: None,
            approval_decision: ApprovalDecision::Pending,
            anomalies: Vec::new(),
            bot_likelihood: None,
            sanctions_hit: false,
            review_id: None,
            is_reverification: false,
            linked_credential_id: None,
            transitions: Vec::new(),
            version: 0,
            sequence: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the session as a re-verification of an existing credential.
    pub fn link_credential(&mut self, credential_id: CredentialId) {
        self.is_reverification = true;
        self.linked_credential_id = Some(credential_id);
        self.touch();
    }

    /// Record the credential this session issued or renewed.
    pub fn attach_credential(&mut self, credential_id: CredentialId) {
        self.linked_credential_id = Some(credential_id);
        self.touch();
    }

    /// Record the review task this session is waiting on.
    pub fn attach_review(&mut self, review_id: ReviewId) {
        self.review_id = Some(review_id);
        self.touch();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_decided(&self) -> bool {
        self.approval_decision != ApprovalDecision::Pending
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }

    pub fn has_anomaly(&self, kind: AnomalyKind) -> bool {
        self.anomalies.iter().any(|a| a.kind == kind)
    }

    /// Whether every required evidence step is completed.
    pub fn required_evidence_complete(&self) -> bool {
        self.flow
            .required_evidence()
            .is_subset(&self.steps.completed())
    }

    // ── Evidence steps ───────────────────────────────────────────────

    /// Check whether an evidence submission with payload digest `digest`
    /// may be applied.
    ///
    /// An identical resubmission of a completed step is reported as
    /// [`Submission::Duplicate`] in every session state.
    pub fn check_submission(
        &self,
        step: VerificationStep,
        digest: &str,
    ) -> Result<Submission, SessionError> {
        let entry = self.steps.entry(step);
        if step.is_system() {
            return Err(SessionError::invalid(
                entry.status,
                step,
                "system steps are driven by the orchestrator",
            ));
        }
        match entry.status {
            StepStatus::Completed if entry.payload_digest.as_deref() == Some(digest) => {
                return Ok(Submission::Duplicate);
            }
            StepStatus::Completed => {
                return Err(SessionError::invalid(
                    entry.status,
                    step,
                    "step already completed with a different payload",
                ));
            }
            StepStatus::Skipped => {
                return Err(SessionError::invalid(entry.status, step, "step was skipped"));
            }
            StepStatus::Pending | StepStatus::InProgress | StepStatus::Failed => {}
        }
        self.require_mutable(step)?;
        if self.is_decided() {
            return Err(SessionError::invalid(
                self.approval_decision,
                step,
                "session has already been decided",
            ));
        }
        let missing = step
            .prerequisites()
            .intersection(&self.flow.required_steps)
            .difference(&self.steps.completed());
        if !missing.is_empty() {
            return Err(SessionError::invalid(
                entry.status,
                step,
                format!("prerequisite steps {missing} are not completed"),
            ));
        }
        Ok(Submission::Fresh)
    }

    /// Complete an evidence step. Re-validates eligibility first, so callers
    /// may apply it to a freshly loaded session inside a CAS retry loop.
    pub fn apply_evidence(
        &mut self,
        step: VerificationStep,
        digest: String,
    ) -> Result<Submission, SessionError> {
        if self.check_submission(step, &digest)? == Submission::Duplicate {
            return Ok(Submission::Duplicate);
        }
        let now = Timestamp::now();
        let entry = self.steps.entry_mut(step);
        let from = entry.status;
        entry.status = StepStatus::Completed;
        entry.payload_digest = Some(digest);
        entry.completed_at = Some(now);
        entry.note = None;
        self.record(TransitionScope::Step(step), from, StepStatus::Completed, "evidence accepted");
        self.advance_to(step);
        if self.status == SessionStatus::Initiated {
            self.transition_status(SessionStatus::InProgress, "first evidence received")?;
        }
        Ok(Submission::Fresh)
    }

    // ── System steps ─────────────────────────────────────────────────

    /// Complete a system step (7–9) with an outcome note.
    pub fn complete_system_step(
        &mut self,
        step: VerificationStep,
        note: impl Into<String>,
    ) -> Result<(), SessionError> {
        if !step.is_system() {
            return Err(SessionError::invalid(
                self.steps.status(step),
                step,
                "evidence steps are completed by callers",
            ));
        }
        self.require_mutable(step)?;
        self.set_step_status(step, StepStatus::Completed, note.into())?;
        self.advance_to(step);
        Ok(())
    }

    /// Skip a pending step.
    pub fn skip_step(
        &mut self,
        step: VerificationStep,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.require_mutable(step)?;
        self.set_step_status(step, StepStatus::Skipped, reason.into())
    }

    /// Mark a pending step as failed.
    pub fn fail_step(
        &mut self,
        step: VerificationStep,
        reason: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.require_mutable(step)?;
        self.set_step_status(step, StepStatus::Failed, reason.into())
    }

    fn set_step_status(
        &mut self,
        step: VerificationStep,
        to: StepStatus,
        note: String,
    ) -> Result<(), SessionError> {
        let entry = self.steps.entry_mut(step);
        if entry.status != StepStatus::Pending {
            return Err(SessionError::invalid(entry.status, to, format!("step {step} is not pending")));
        }
        entry.status = to;
        if to == StepStatus::Completed {
            entry.completed_at = Some(Timestamp::now());
        }
        entry.note = Some(note.clone());
        self.record(TransitionScope::Step(step), StepStatus::Pending, to, &note);
        Ok(())
    }

    // ── Status and decision ──────────────────────────────────────────

    /// Move the session lifecycle status.
    pub fn transition_status(
        &mut self,
        next: SessionStatus,
        reason: &str,
    ) -> Result<(), SessionError> {
        self.require_mutable(next)?;
        if !self.status.can_transition_to(next) {
            return Err(SessionError::invalid(self.status, next, reason));
        }
        let from = self.status;
        self.status = next;
        self.record(TransitionScope::Status, from, next, reason);
        Ok(())
    }

    /// Cancel a non-terminal session.
    pub fn cancel(&mut self, reason: &str) -> Result<(), SessionError> {
        self.transition_status(SessionStatus::Cancelled, reason)
    }

    /// Compare-and-set the approval decision.
    pub fn decide(
        &mut self,
        expected: ApprovalDecision,
        next: ApprovalDecision,
        reason: &str,
    ) -> Result<(), SessionError> {
        self.require_mutable(next)?;
        if self.approval_decision != expected {
            return Err(SessionError::invalid(
                self.approval_decision,
                next,
                format!("expected decision {expected}"),
            ));
        }
        if !expected.can_transition_to(next) {
            return Err(SessionError::invalid(expected, next, reason));
        }
        self.approval_decision = next;
        self.record(TransitionScope::Decision, expected, next, reason);
        Ok(())
    }

    // ── Flow ─────────────────────────────────────────────────────────

    /// Replace the active plan with a stricter (or equal) one.
    ///
    /// Steps newly added to the required set must still be pending.
    pub fn escalate_flow(&mut self, plan: FlowPlan, reason: &str) -> Result<(), SessionError> {
        self.require_mutable(plan.flow_type)?;
        if plan.flow_type < self.flow.flow_type {
            return Err(SessionError::invalid(
                self.flow.flow_type,
                plan.flow_type,
                "flows never de-escalate",
            ));
        }
        let added = plan.required_steps.difference(&self.flow.required_steps);
        let not_pending = added.difference(&self.steps.pending());
        if !not_pending.is_empty() {
            return Err(SessionError::invalid(
                self.flow.flow_type,
                plan.flow_type,
                format!("steps {not_pending} are no longer pending"),
            ));
        }
        if plan == self.flow {
            return Ok(());
        }
        let from = self.flow.flow_type;
        self.flow = plan;
        self.verification_mode = plan.flow_type;
        self.risk_level = plan.flow_type.risk_level();
        self.record(TransitionScope::Flow, from, plan.flow_type, reason);
        Ok(())
    }

    // ── Manual review re-open ────────────────────────────────────────

    /// Re-open evidence steps at a reviewer's request.
    ///
    /// The decision returns to `pending`, the session to `in_progress`, the
    /// named steps to `pending` (and into the required set), the system
    /// steps are reset, and `current_step` rewinds to the lowest reopened
    /// step.
    pub fn reopen_for_more_info(
        &mut self,
        steps: StepSet,
        reason: &str,
    ) -> Result<(), SessionError> {
        let Some(lowest) = steps.first() else {
            return Err(SessionError::invalid(
                self.status,
                SessionStatus::InProgress,
                "no steps named for re-open",
            ));
        };
        if steps.evidence() != steps {
            return Err(SessionError::invalid(
                self.status,
                SessionStatus::InProgress,
                "only evidence steps can be re-opened",
            ));
        }
        if self.status != SessionStatus::PendingManualReview {
            return Err(SessionError::invalid(
                self.status,
                SessionStatus::InProgress,
                "session is not awaiting manual review",
            ));
        }
        self.decide(
            ApprovalDecision::ManualReviewRequired,
            ApprovalDecision::Pending,
            reason,
        )?;
        let system = StepSet::all().difference(&StepSet::all().evidence());
        for step in steps.union(&system).iter() {
            let entry = self.steps.entry_mut(step);
            let from = entry.status;
            *entry = StepEntry::pending();
            if from != StepStatus::Pending {
                self.record(TransitionScope::Step(step), from, StepStatus::Pending, reason);
            }
        }
        self.flow.required_steps = self.flow.required_steps.union(&steps);
        self.current_step = lowest;
        self.transition_status(SessionStatus::InProgress, reason)
    }

    // ── Scores and signals ───────────────────────────────────────────

    pub fn set_component(&mut self, component: ScoreComponent, score: Score) {
        self.component_scores.set(component, score);
        self.touch();
    }

    /// Flag an anomaly. Returns `false` if the same kind from the same source
    /// is already flagged.
    pub fn flag_anomaly(
        &mut self,
        kind: AnomalyKind,
        source: Option<&str>,
        detail: impl Into<String>,
    ) -> bool {
        let duplicate = self
            .anomalies
            .iter()
            .any(|a| a.kind == kind && a.source.as_deref() == source);
        if duplicate {
            return false;
        }
        self.anomalies.push(Anomaly {
            kind,
            source: source.map(str::to_string),
            detail: detail.into(),
            raised_at: Timestamp::now(),
        });
        self.touch();
        true
    }

    pub fn record_document_refs(&mut self, category: DocumentCategory, refs: Vec<String>) {
        self.collected_document_refs.insert(category, refs);
        self.touch();
    }

    // ── Internals ────────────────────────────────────────────────────

    fn require_mutable(&self, attempted: impl ToString) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            return Err(SessionError::TerminalState {
                state: self.status.to_string(),
                attempted: attempted.to_string(),
            });
        }
        Ok(())
    }

    fn advance_to(&mut self, step: VerificationStep) {
        if step > self.current_step {
            self.current_step = step;
        }
    }

    fn record(&mut self, scope: TransitionScope, from: impl ToString, to: impl ToString, reason: &str) {
        let at = Timestamp::now();
        self.transitions.push(SessionTransitionRecord {
            scope,
            from: from.to_string(),
            to: to.to_string(),
            at,
            reason: reason.to_string(),
        });
        self.updated_at = at;
    }

    fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
