//! # Step Orchestrator
//!
//! Drives a verification session through the canonical 10-step sequence.
//!
//! ## Flow of one step completion
//!
//! 1. Load the session, validate the payload and compute its digest.
//!    An identical resubmission of a completed step returns immediately.
//! 2. Consult the collaborator for the step **outside** the session write.
//!    Failures are absorbed: the component stays neutral and a
//!    `collaborator_unavailable` anomaly is flagged.
//! 3. Inside a compare-and-set loop on the session version: re-check
//!    eligibility, apply the evidence, recompute the aggregate, re-evaluate
//!    the flow and, once every required evidence step is completed, take
//!    the decision.
//! 4. After the commit: persist evidence records, append the risk snapshot,
//!    emit audit events, then either issue the credential (auto-approved)
//!    or queue the session for manual review.
//!
//! ## Security Invariant
//!
//! There is exactly one decision path. The approval decision leaves
//! `pending` through [`VerificationSession::decide`] inside a versioned
//! write, so two concurrent completions cannot both decide.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kyc_core::{
    ComponentScores, CredentialId, DocumentCategory, FlowType, KycError, ReviewId, RiskLevel,
    Score, ScoreComponent, SessionId, StepSet, SubjectId, Timestamp, VerificationStep,
};
use kyc_credential::{
    Credential, CredentialIssuer, CredentialSigner, CredentialStore, CredentialVerification,
    InMemoryCredentialStore, IssuanceReceipt,
};
use kyc_review::{
    priority_for, InMemoryReviewQueue, ManualReviewGate, QueueEntry, ReviewDecision,
    ReviewQueueStore, ReviewStatistics, ReviewTask,
};
use kyc_risk::{
    approval_rate_drift, assess_initial_risk, explain_decision, AdaptiveFlowSelector,
    DecisionBand, DecisionTrace, DeviceContext, DriftReport, InMemorySnapshotLog, RiskScoreEngine, RiskScoreSnapshot, SnapshotLog,
    VerificationReport,
};
use kyc_state::{
    Anomaly, AnomalyKind, ApprovalDecision, BiometricRecord, DocumentRecord, SessionStatus,
    StepStatus, Submission, TransitionScope, VerificationSession,
};

use crate::audit::TracingAuditSink;
use crate::collaborators::{
    AmlResult, AmlSubject, BehavioralAssessment, BiometricRequest, CollaboratorError,
    Collaborators,
};
use crate::config::EngineConfig;
use crate::memory::{InMemoryEvidenceStore, InMemorySessionRepository};
use crate::payload::{DocumentSubmission, StepPayload};
use crate::ports::{AuditAction, AuditEvent, AuditSink, CasOutcome, EvidenceStore, SessionRepository};

// ─── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub step: VerificationStep,
    pub status: StepStatus,
    pub required: bool,
    pub completed_at: Option<Timestamp>,
    pub note: Option<String>,
}

/// Caller-facing snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub status: SessionStatus,
    pub current_step: VerificationStep,
    pub approval_decision: ApprovalDecision,
    pub flow_type: FlowType,
    pub risk_level: RiskLevel,
    pub manual_review_forced: bool,
    pub estimated_minutes: u32,
    pub steps: Vec<StepView>,
    pub initial_risk_score: Score,
    pub running_risk_score: Score,
    pub identity_integrity_score: Option<Score>,
    pub component_scores: ComponentScores,
    pub anomalies: Vec<Anomaly>,
    pub sanctions_hit: bool,
    pub review_id: Option<ReviewId>,
    pub is_reverification: bool,
    pub linked_credential_id: Option<CredentialId>,
    /// Completed share of the required steps.
    pub progress_percent: u8,
    pub missing_mandatory_categories: Vec<DocumentCategory>,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StatusView {
    pub fn of(session: &VerificationSession) -> Self {
        let required = session.flow.required_steps;
        let done = required.intersection(&session.steps.completed()).len();
        let progress_percent = if required.is_empty() {
            100
        } else {
            (done * 100 / required.len()) as u8
        };
        Self {
            session_id: session.id,
            subject_id: session.subject_id.clone(),
            status: session.status,
            current_step: session.current_step,
            approval_decision: session.approval_decision,
            flow_type: session.flow.flow_type,
            risk_level: session.risk_level,
            manual_review_forced: session.flow.manual_review_forced,
            estimated_minutes: session.flow.estimated_minutes,
            steps: session
                .steps
                .iter()
                .map(|(step, entry)| StepView {
                    step,
                    status: entry.status,
                    required: required.contains(step),
                    completed_at: entry.completed_at,
                    note: entry.note.clone(),
                })
                .collect(),
            initial_risk_score: session.initial_risk_score,
            running_risk_score: session.running_risk_score,
            identity_integrity_score: session.identity_integrity_score,
            component_scores: session.component_scores,
            anomalies: session.anomalies.clone(),
            sanctions_hit: session.sanctions_hit,
            review_id: session.review_id,
            is_reverification: session.is_reverification,
            linked_credential_id: session.linked_credential_id.clone(),
            progress_percent,
            missing_mandatory_categories: DocumentCategory::all()
                .iter()
                .copied()
                .filter(|c| c.is_mandatory() && !session.collected_document_refs.contains_key(c))
                .collect(),
            version: session.version,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Result of [`StepOrchestrator::complete_step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepReceipt {
    pub submission: Submission,
    pub status: StatusView,
}

// ─── Internals ───────────────────────────────────────────────────────

/// What a session write closure decided.
enum SessionWrite<T> {
    Commit(T),
    Unchanged(T),
}

enum Applied {
    Duplicate,
    Fresh { decided: Option<ApprovalDecision> },
}

/// Collaborator results for one payload, gathered before the write.
#[derive(Default)]
struct Gathered {
    records: Vec<DocumentRecord>,
    refs: Vec<(DocumentCategory, String)>,
    document_score: Option<Score>,
    forgery_flags: Vec<String>,
    /// The new capture and the lowest overall score across the session.
    biometric: Option<(BiometricRecord, Score)>,
    aml: Option<AmlResult>,
    behavior: Option<BehavioralAssessment>,
    unavailable: Vec<CollaboratorError>,
}

impl Gathered {
    fn absorb(&mut self, err: CollaboratorError) {
        metrics::counter!("kyc_collaborator_fallbacks_total", "collaborator" => err.collaborator())
            .increment(1);
        tracing::warn!(
            collaborator = err.collaborator(),
            error = %err,
            "collaborator unavailable, using neutral score"
        );
        if !self
            .unavailable
            .iter()
            .any(|e| e.collaborator() == err.collaborator())
        {
            self.unavailable.push(err);
        }
    }
}

// ─── Orchestrator ────────────────────────────────────────────────────

pub struct StepOrchestrator {
    config: EngineConfig,
    sessions: Arc<dyn SessionRepository>,
    evidence: Arc<dyn EvidenceStore>,
    snapshots: Arc<dyn SnapshotLog>,
    audit: Arc<dyn AuditSink>,
    risk: RiskScoreEngine,
    flow: AdaptiveFlowSelector,
    reviews: ManualReviewGate,
    issuer: CredentialIssuer,
    collaborators: Collaborators,
}

/// Builder for [`StepOrchestrator`]. Every port defaults to its in-memory
/// implementation.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: EngineConfig,
    sessions: Option<Arc<dyn SessionRepository>>,
    evidence: Option<Arc<dyn EvidenceStore>>,
    snapshots: Option<Arc<dyn SnapshotLog>>,
    reviews: Option<Arc<dyn ReviewQueueStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    signer: Option<Arc<dyn CredentialSigner>>,
    collaborators: Collaborators,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sessions(mut self, repo: Arc<dyn SessionRepository>) -> Self {
        self.sessions = Some(repo);
        self
    }

    pub fn evidence(mut self, store: Arc<dyn EvidenceStore>) -> Self {
        self.evidence = Some(store);
        self
    }

    pub fn snapshots(mut self, log: Arc<dyn SnapshotLog>) -> Self {
        self.snapshots = Some(log);
        self
    }

    pub fn review_queue(mut self, store: Arc<dyn ReviewQueueStore>) -> Self {
        self.reviews = Some(store);
        self
    }

    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn CredentialSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Validate the configuration and assemble the orchestrator.
    pub fn build(self) -> Result<StepOrchestrator, KycError> {
        self.config.validate()?;

        let sessions: Arc<dyn SessionRepository> = match self.sessions {
            Some(repo) => repo,
            None => Arc::new(InMemorySessionRepository::new()),
        };
        let evidence: Arc<dyn EvidenceStore> = match self.evidence {
            Some(store) => store,
            None => Arc::new(InMemoryEvidenceStore::new()),
        };
        let snapshots: Arc<dyn SnapshotLog> = match self.snapshots {
            Some(log) => log,
            None => Arc::new(InMemorySnapshotLog::new()),
        };
        let review_store: Arc<dyn ReviewQueueStore> = match self.reviews {
            Some(store) => store,
            None => Arc::new(InMemoryReviewQueue::new()),
        };
        let credential_store: Arc<dyn CredentialStore> = match self.credentials {
            Some(store) => store,
            None => Arc::new(InMemoryCredentialStore::new()),
        };
        let audit: Arc<dyn AuditSink> = match self.audit {
            Some(sink) => sink,
            None => Arc::new(TracingAuditSink),
        };

        let mut issuer = CredentialIssuer::new(credential_store)
            .with_validity_days(self.config.credential.validity_days);
        if let Some(signer) = self.signer {
            issuer = issuer.with_signer(signer);
        }

        Ok(StepOrchestrator {
            risk: RiskScoreEngine::new(self.config.risk, snapshots.clone())?,
            flow: AdaptiveFlowSelector::new(self.config.flow)?,
            reviews: ManualReviewGate::new(review_store),
            config: self.config,
            sessions,
            evidence,
            snapshots,
            audit,
            issuer,
            collaborators: self.collaborators,
        })
    }
}

impl StepOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn risk_engine(&self) -> &RiskScoreEngine {
        &self.risk
    }

    pub fn flow_selector(&self) -> &AdaptiveFlowSelector {
        &self.flow
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Start a verification for `subject`.
    ///
    /// An existing credential of the subject turns this into a
    /// re-verification: the credential is linked and, if active, marked
    /// `updating`.
    pub fn initiate_verification(
        &self,
        subject: &str,
        device: &DeviceContext,
    ) -> Result<VerificationSession, KycError> {
        let subject_id = SubjectId::new(subject)?;
        let assessment = assess_initial_risk(device);
        let plan = self.flow.select_flow(assessment.score);
        let mut session =
            VerificationSession::new(subject_id, plan, assessment.score, assessment.device_trust);
        session.sequence = self.sessions.next_sequence()?;

        if let Some(existing) = self.issuer.mark_updating(&session)? {
            session.link_credential(existing.id);
        }
        let session = self.sessions.insert(session)?;

        metrics::counter!("kyc_sessions_initiated_total").increment(1);
        tracing::info!(
            session = %session.id,
            subject = %session.subject_id,
            flow = %plan.flow_type,
            initial_score = %assessment.score,
            reverification = session.is_reverification,
            "verification initiated"
        );
        self.emit(AuditEvent::for_session(
            &session,
            AuditAction::SessionInitiated,
            format!(
                "flow {} selected at initial score {} ({})",
                plan.flow_type,
                assessment.score,
                if assessment.factors.is_empty() {
                    "no risk factors".to_string()
                } else {
                    assessment.factors.join(", ")
                }
            ),
        ));
        Ok(session)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<VerificationSession, KycError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| KycError::SessionNotFound(session_id.to_string()))
    }

    pub fn get_status(&self, session_id: &SessionId) -> Result<StatusView, KycError> {
        self.get_session(session_id).map(|s| StatusView::of(&s))
    }

    pub fn sessions_for_subject(&self, subject: &str) -> Result<Vec<VerificationSession>, KycError> {
        Ok(self.sessions.for_subject(&SubjectId::new(subject)?))
    }

    pub fn cancel_verification(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> Result<StatusView, KycError> {
        let (session, ()) = self.update_session(session_id, |s| {
            s.cancel(reason)?;
            Ok(SessionWrite::Commit(()))
        })?;
        tracing::info!(session = %session_id, reason, "verification cancelled");
        Ok(StatusView::of(&session))
    }

    // ── Evidence ─────────────────────────────────────────────────────

    /// Submit evidence for an evidence step.
    pub fn complete_step(
        &self,
        session_id: &SessionId,
        step: VerificationStep,
        payload: StepPayload,
    ) -> Result<StepReceipt, KycError> {
        let session = self.get_session(session_id)?;
        payload.validate_for(step)?;
        let digest = payload.digest()?;

        if session.check_submission(step, &digest)? == Submission::Duplicate {
            tracing::debug!(session = %session_id, step = %step, "identical resubmission ignored");
            return Ok(StepReceipt {
                submission: Submission::Duplicate,
                status: StatusView::of(&session),
            });
        }

        let gathered = self.gather(&session, &payload)?;

        let (committed, applied) = self.update_session(session_id, |s| {
            if s.apply_evidence(step, digest.clone())? == Submission::Duplicate {
                return Ok(SessionWrite::Unchanged(Applied::Duplicate));
            }
            apply_gathered(s, &gathered);
            self.refresh_risk(s)?;
            let decided = if s.required_evidence_complete() {
                Some(self.take_decision(s)?)
            } else {
                None
            };
            Ok(SessionWrite::Commit(Applied::Fresh { decided }))
        })?;

        let decided = match applied {
            Applied::Duplicate => {
                tracing::debug!(session = %session_id, step = %step, "concurrent identical submission");
                return Ok(StepReceipt {
                    submission: Submission::Duplicate,
                    status: StatusView::of(&committed),
                });
            }
            Applied::Fresh { decided } => decided,
        };

        self.persist_after_commit(
            &committed,
            gathered.records,
            gathered.biometric.map(|(record, _)| record),
        );
        tracing::info!(
            session = %session_id,
            step = %step,
            running_score = %committed.running_risk_score,
            flow = %committed.flow.flow_type,
            "step completed"
        );

        let session = match decided {
            Some(decision) => {
                metrics::counter!("kyc_decisions_total", "decision" => decision.as_str())
                    .increment(1);
                self.follow_up(committed)?
            }
            None => committed,
        };
        Ok(StepReceipt {
            submission: Submission::Fresh,
            status: StatusView::of(&session),
        })
    }

    /// Recompute the aggregate and re-evaluate the flow without new
    /// evidence. Completed and skipped steps are never reopened.
    ///
    /// A decided session whose follow-up never landed (approved without a
    /// credential, or awaiting review without a task) has the follow-up
    /// retried instead. Retrying is idempotent.
    pub fn force_re_evaluate_risk(&self, session_id: &SessionId) -> Result<StatusView, KycError> {
        let current = self.get_session(session_id)?;
        if awaits_follow_up(&current) {
            tracing::warn!(
                session = %session_id,
                status = %current.status,
                decision = %current.approval_decision,
                "retrying follow-up of a decided session"
            );
            let session = self.follow_up(current)?;
            return Ok(StatusView::of(&session));
        }

        let (committed, decided) = self.update_session(session_id, |s| {
            if s.is_terminal() || s.is_decided() {
                return Err(KycError::invalid_transition(
                    s.status,
                    "re_evaluation",
                    format!("session is already decided ({})", s.approval_decision),
                ));
            }
            self.refresh_risk(s)?;
            let decided = if s.required_evidence_complete() {
                Some(self.take_decision(s)?)
            } else {
                None
            };
            Ok(SessionWrite::Commit(decided))
        })?;
        self.persist_after_commit(&committed, Vec::new(), None);
        let session = match decided {
            Some(decision) => {
                metrics::counter!("kyc_decisions_total", "decision" => decision.as_str())
                    .increment(1);
                self.follow_up(committed)?
            }
            None => committed,
        };
        Ok(StatusView::of(&session))
    }

    // ── Manual review ────────────────────────────────────────────────

    /// Apply a reviewer's decision to the task and its session.
    pub fn resolve_manual_review(
        &self,
        review_id: &ReviewId,
        decision: ReviewDecision,
        notes: &str,
        reviewer: &str,
    ) -> Result<StatusView, KycError> {
        let task = self.reviews.get(review_id)?;
        let session = self.get_session(&task.session_id)?;
        if session.status != SessionStatus::PendingManualReview {
            return Err(KycError::invalid_transition(
                session.status,
                "manual_review_resolution",
                "session is not awaiting manual review",
            ));
        }

        let task = self.reviews.resolve(review_id, decision, notes, reviewer)?;
        self.emit(
            AuditEvent::for_session(
                &session,
                AuditAction::ReviewResolved,
                format!("review {} resolved: {decision}", task.id),
            )
            .with_actor(reviewer),
        );

        let reason = format!("manual review by {reviewer}: {decision}");
        let session = match decision {
            ReviewDecision::Approved => {
                let (approved, ()) = self.update_session(&task.session_id, |s| {
                    s.decide(
                        ApprovalDecision::ManualReviewRequired,
                        ApprovalDecision::ManuallyApproved,
                        &reason,
                    )?;
                    s.transition_status(SessionStatus::Approved, &reason)?;
                    Ok(SessionWrite::Commit(()))
                })?;
                metrics::counter!("kyc_decisions_total", "decision" => ApprovalDecision::ManuallyApproved.as_str())
                    .increment(1);
                self.complete_issuance(approved, true)?.0
            }
            ReviewDecision::Rejected => {
                let (rejected, ()) = self.update_session(&task.session_id, |s| {
                    s.decide(
                        ApprovalDecision::ManualReviewRequired,
                        ApprovalDecision::Rejected,
                        &reason,
                    )?;
                    if s.steps.status(VerificationStep::CredentialIssuance) == StepStatus::Pending {
                        s.skip_step(VerificationStep::CredentialIssuance, "rejected in manual review")?;
                    }
                    s.transition_status(SessionStatus::Rejected, &reason)?;
                    Ok(SessionWrite::Commit(()))
                })?;
                metrics::counter!("kyc_decisions_total", "decision" => ApprovalDecision::Rejected.as_str())
                    .increment(1);
                rejected
            }
            ReviewDecision::RequestMoreInfo { steps } => {
                let (reopened, ()) = self.update_session(&task.session_id, |s| {
                    s.reopen_for_more_info(steps, &reason)?;
                    Ok(SessionWrite::Commit(()))
                })?;
                reopened
            }
        };
        tracing::info!(
            review = %review_id,
            session = %session.id,
            decision = %decision,
            status = %session.status,
            "review outcome applied"
        );
        Ok(StatusView::of(&session))
    }

    pub fn assign_review(&self, review_id: &ReviewId, reviewer: &str) -> Result<ReviewTask, KycError> {
        self.reviews.assign(review_id, reviewer)
    }

    pub fn escalate_review(&self, review_id: &ReviewId, reason: &str) -> Result<ReviewTask, KycError> {
        self.reviews.escalate(review_id, reason)
    }

    pub fn review(&self, review_id: &ReviewId) -> Result<ReviewTask, KycError> {
        self.reviews.get(review_id)
    }

    pub fn pending_reviews(&self, limit: usize) -> Vec<QueueEntry> {
        self.reviews.pending(limit)
    }

    pub fn review_statistics(&self) -> ReviewStatistics {
        self.reviews.statistics()
    }

    // ── Credentials ──────────────────────────────────────────────────

    /// Explicit issuance trigger. Safe to race the automatic one: every
    /// caller receives the same credential.
    pub fn issue_or_renew_credential(
        &self,
        session_id: &SessionId,
    ) -> Result<IssuanceReceipt, KycError> {
        let session = self.get_session(session_id)?;
        let (_, receipt) = self.complete_issuance(session, false)?;
        receipt.ok_or_else(|| KycError::Storage(format!("no credential issued for {session_id}")))
    }

    /// Administrative revocation. Takes precedence over in-flight sessions.
    pub fn revoke_credential(
        &self,
        subject: &str,
        reason: &str,
        actor: &str,
    ) -> Result<Credential, KycError> {
        let subject_id = SubjectId::new(subject)?;
        let credential = self.issuer.revoke(&subject_id, reason, actor)?;
        self.emit(
            AuditEvent {
                at: Timestamp::now(),
                action: AuditAction::CredentialRevoked,
                session_id: Some(credential.session_id),
                subject_id: Some(subject_id),
                detail: format!("credential {} revoked: {reason}", credential.id),
                actor: None,
            }
            .with_actor(actor),
        );
        Ok(credential)
    }

    pub fn credential(&self, subject: &str) -> Result<Option<Credential>, KycError> {
        Ok(self.issuer.get(&SubjectId::new(subject)?))
    }

    pub fn verify_credential(
        &self,
        credential: &Credential,
        now: &Timestamp,
    ) -> Result<CredentialVerification, KycError> {
        self.issuer.verify(credential, now)
    }

    // ── Explanations ─────────────────────────────────────────────────

    pub fn explain(&self, session_id: &SessionId) -> Result<DecisionTrace, KycError> {
        let session = self.get_session(session_id)?;
        let (_, components) = self.risk.aggregate(&session.component_scores);
        let band = self.snapshots.latest(session_id).map(|s| s.band);
        Ok(explain_decision(&session, &components, band))
    }

    pub fn verification_report(&self, session_id: &SessionId) -> Result<VerificationReport, KycError> {
        let session = self.get_session(session_id)?;
        let (_, components) = self.risk.aggregate(&session.component_scores);
        let band = self.snapshots.latest(session_id).map(|s| s.band);
        let trace = explain_decision(&session, &components, band);
        let documents = self.evidence.documents(session_id);
        let biometrics = self.evidence.biometrics(session_id);
        Ok(VerificationReport::build(
            &session,
            trace,
            &documents,
            biometrics.last(),
        ))
    }

    pub fn risk_history(&self, session_id: &SessionId) -> Vec<RiskScoreSnapshot> {
        self.snapshots.history(session_id)
    }

    /// Auto-approval rate of the last `window_days` against the window
    /// before it.
    pub fn approval_rate_drift(&self, window_days: i64) -> DriftReport {
        approval_rate_drift(self.snapshots.as_ref(), window_days, Timestamp::now())
    }

    // ── Collaborators ────────────────────────────────────────────────

    fn gather(
        &self,
        session: &VerificationSession,
        payload: &StepPayload,
    ) -> Result<Gathered, KycError> {
        let mut g = Gathered::default();
        match payload {
            StepPayload::PreVerification { behavioral, .. } => {
                if let Some(signals) = behavioral {
                    match self.collaborators.behavior.score(signals) {
                        Ok(assessment) => g.behavior = Some(assessment),
                        Err(e) => g.absorb(e),
                    }
                }
            }
            StepPayload::DocumentUpload { documents } => {
                g.records = self.submitted(session.id, documents, &mut g.refs);
            }
            StepPayload::DocumentAnalysis { document_refs } => {
                let existing = self.evidence.documents(&session.id);
                if existing.is_empty() {
                    return Err(KycError::invalid_transition(
                        StepStatus::Pending,
                        VerificationStep::DocumentAnalysis,
                        "no documents have been uploaded",
                    ));
                }
                if let Some(unknown) = document_refs
                    .iter()
                    .find(|r| !existing.iter().any(|d| &d.artifact_ref == *r))
                {
                    return Err(KycError::invalid_transition(
                        StepStatus::Pending,
                        VerificationStep::DocumentAnalysis,
                        format!("unknown document reference {unknown:?}"),
                    ));
                }
                let mut targets: Vec<DocumentRecord> = if document_refs.is_empty() {
                    let unanalyzed: Vec<_> = existing
                        .iter()
                        .filter(|d| d.authenticity_score.is_none())
                        .cloned()
                        .collect();
                    if unanalyzed.is_empty() {
                        existing.clone()
                    } else {
                        unanalyzed
                    }
                } else {
                    existing
                        .iter()
                        .filter(|d| document_refs.contains(&d.artifact_ref))
                        .cloned()
                        .collect()
                };
                self.analyze(&mut targets, &mut g);
                g.document_score = mean_authenticity(existing, &targets);
                g.records = targets;
            }
            StepPayload::AddressVerification { documents } => {
                let mut records = self.submitted(session.id, documents, &mut g.refs);
                self.analyze(&mut records, &mut g);
                g.document_score = mean_authenticity(self.evidence.documents(&session.id), &records);
                g.records = records;
            }
            StepPayload::FaceVerification {
                selfie_ref,
                reference_ref,
                liveness_frames,
            } => {
                let request = BiometricRequest {
                    selfie_ref: selfie_ref.clone(),
                    reference_ref: reference_ref
                        .clone()
                        .or_else(|| self.identity_reference(&session.id)),
                    liveness_frames: liveness_frames.clone(),
                };
                self.capture(session, &request, &mut g);
            }
            StepPayload::VideoVerification {
                video_ref,
                liveness_frames,
            } => {
                let request = BiometricRequest {
                    selfie_ref: video_ref.clone(),
                    reference_ref: self.identity_reference(&session.id),
                    liveness_frames: liveness_frames.clone(),
                };
                self.capture(session, &request, &mut g);
            }
            StepPayload::AmlScreening {
                full_name,
                date_of_birth,
                nationality,
            } => {
                let subject = AmlSubject {
                    subject_id: session.subject_id.clone(),
                    full_name: full_name.clone(),
                    date_of_birth: date_of_birth.clone(),
                    nationality: nationality.clone(),
                };
                match self.collaborators.aml.screen(&subject) {
                    Ok(result) => g.aml = Some(result),
                    Err(e) => g.absorb(e),
                }
            }
        }
        Ok(g)
    }

    fn submitted(
        &self,
        session_id: SessionId,
        documents: &[DocumentSubmission],
        refs: &mut Vec<(DocumentCategory, String)>,
    ) -> Vec<DocumentRecord> {
        documents
            .iter()
            .map(|d| {
                refs.push((d.category, d.artifact_ref.clone()));
                DocumentRecord::submitted(session_id, d.category, &d.document_type, &d.artifact_ref)
            })
            .collect()
    }

    fn analyze(&self, records: &mut [DocumentRecord], g: &mut Gathered) {
        for record in records.iter_mut() {
            match self.collaborators.documents.analyze(record) {
                Ok(analysis) => {
                    g.forgery_flags.extend(analysis.forgery_flags.iter().cloned());
                    record.mark_analyzed(analysis.authenticity, analysis.forgery_flags);
                }
                Err(e) => {
                    record.mark_unavailable();
                    g.absorb(e);
                }
            }
        }
    }

    fn capture(&self, session: &VerificationSession, request: &BiometricRequest, g: &mut Gathered) {
        match self.collaborators.biometrics.verify(request) {
            Ok(analysis) => {
                let record = BiometricRecord::new(
                    session.id,
                    analysis.liveness,
                    analysis.face_match,
                    analysis.deepfake,
                );
                let lowest = self
                    .evidence
                    .biometrics(&session.id)
                    .iter()
                    .map(|r| r.overall_score)
                    .fold(record.overall_score, |acc, s| if s < acc { s } else { acc });
                g.biometric = Some((record, lowest));
            }
            Err(e) => g.absorb(e),
        }
    }

    fn identity_reference(&self, session_id: &SessionId) -> Option<String> {
        self.evidence
            .documents(session_id)
            .into_iter()
            .find(|d| d.category == DocumentCategory::IdentityProof)
            .map(|d| d.artifact_ref)
    }

    // ── Risk and decision ────────────────────────────────────────────

    /// Recompute the aggregate, apply re-evaluation penalties and escalate
    /// the flow if the running score fell into a stricter band.
    fn refresh_risk(&self, s: &mut VerificationSession) -> Result<(), KycError> {
        let (aggregate, _) = self.risk.aggregate(&s.component_scores);
        s.identity_integrity_score = Some(aggregate);

        let re = self.flow.re_evaluate(s);
        s.running_risk_score = re.running_score;
        for penalty in &re.penalties {
            s.flag_anomaly(penalty.kind, Some("risk_reevaluation"), penalty.detail.clone());
        }
        if let Some(plan) = re.escalated_plan {
            let reason = format!("running risk score {} fell into a stricter band", re.running_score);
            s.escalate_flow(plan, &reason)?;
            tracing::warn!(
                session = %s.id,
                flow = %plan.flow_type,
                running_score = %re.running_score,
                "verification flow escalated"
            );
        }
        Ok(())
    }

    /// Run the decision phase on a session whose required evidence is
    /// complete.
    fn take_decision(&self, s: &mut VerificationSession) -> Result<ApprovalDecision, KycError> {
        let (aggregate, _) = self.risk.aggregate(&s.component_scores);
        let band = self.risk.band(aggregate);
        s.identity_integrity_score = Some(aggregate);

        let mut overrides = Vec::new();
        if s.flow.manual_review_forced {
            overrides.push(format!("{} flow forces manual review", s.flow.flow_type));
        }
        if s.anomaly_count() >= self.flow.config().manual_review_anomalies {
            overrides.push(format!("{} anomaly flags", s.anomaly_count()));
        }
        if s.sanctions_hit {
            overrides.push("sanctions screening hit".to_string());
        }

        let (decision, reason) = match band {
            DecisionBand::AutoApprove if overrides.is_empty() => (
                ApprovalDecision::AutoApproved,
                format!("aggregate {aggregate} at or above auto-approve threshold"),
            ),
            DecisionBand::AutoApprove => (
                ApprovalDecision::ManualReviewRequired,
                format!("aggregate {aggregate} overridden: {}", overrides.join("; ")),
            ),
            DecisionBand::ManualReview => (
                ApprovalDecision::ManualReviewRequired,
                format!("aggregate {aggregate} in manual review band"),
            ),
            DecisionBand::Reject => (
                ApprovalDecision::Rejected,
                format!("aggregate {aggregate} below manual review threshold"),
            ),
        };

        s.complete_system_step(
            VerificationStep::RiskScoring,
            format!("aggregate {aggregate}, band {band}, decision {decision}"),
        )?;
        let optional = s
            .steps
            .pending()
            .difference(&s.flow.required_steps)
            .evidence();
        for step in optional.iter() {
            s.skip_step(step, format!("not required by the {} flow", s.flow.flow_type))?;
        }
        if s.steps.status(VerificationStep::ReportGeneration) == StepStatus::Pending {
            if s.flow.required_steps.contains(VerificationStep::ReportGeneration) {
                s.complete_system_step(VerificationStep::ReportGeneration, "verification report generated")?;
            } else {
                s.skip_step(
                    VerificationStep::ReportGeneration,
                    format!("not required by the {} flow", s.flow.flow_type),
                )?;
            }
        }

        s.decide(ApprovalDecision::Pending, decision, &reason)?;
        match decision {
            ApprovalDecision::AutoApproved => s.transition_status(SessionStatus::Approved, &reason)?,
            ApprovalDecision::Rejected => {
                s.skip_step(VerificationStep::CredentialIssuance, "verification rejected")?;
                s.transition_status(SessionStatus::Rejected, &reason)?;
            }
            _ => s.transition_status(SessionStatus::PendingManualReview, &reason)?,
        }

        tracing::info!(
            session = %s.id,
            aggregate = %aggregate,
            band = %band,
            decision = %decision,
            reason = %reason,
            "verification decided"
        );
        Ok(decision)
    }

    /// Issue the credential of an auto-approved session, or queue a
    /// session awaiting manual review.
    fn follow_up(&self, session: VerificationSession) -> Result<VerificationSession, KycError> {
        match (session.approval_decision, session.status) {
            (decision, SessionStatus::Approved) if decision.is_approving() => {
                Ok(self.complete_issuance(session, true)?.0)
            }
            (ApprovalDecision::ManualReviewRequired, SessionStatus::PendingManualReview) => {
                self.queue_for_review(session)
            }
            _ => Ok(session),
        }
    }

    fn queue_for_review(&self, session: VerificationSession) -> Result<VerificationSession, KycError> {
        let reason = session
            .transitions
            .iter()
            .rev()
            .find(|t| t.scope == TransitionScope::Decision)
            .map(|t| t.reason.clone())
            .unwrap_or_else(|| "manual review required".to_string());
        let task = self.reviews.enqueue(&session, &reason, priority_for(&session))?;
        if session.review_id == Some(task.id) {
            return Ok(session);
        }
        let (session, ()) = self.update_session(&session.id, |s| {
            if s.review_id == Some(task.id) {
                return Ok(SessionWrite::Unchanged(()));
            }
            s.attach_review(task.id);
            Ok(SessionWrite::Commit(()))
        })?;
        self.emit(AuditEvent::for_session(
            &session,
            AuditAction::ReviewEnqueued,
            format!("review {} queued at {} priority: {reason}", task.id, task.priority),
        ));
        Ok(session)
    }

    /// Issue or renew, then complete step 9 and the session.
    ///
    /// With `absorb_revoked`, a revoked credential fails step 9 and cancels
    /// the session instead of returning `AlreadyRevoked`.
    fn complete_issuance(
        &self,
        session: VerificationSession,
        absorb_revoked: bool,
    ) -> Result<(VerificationSession, Option<IssuanceReceipt>), KycError> {
        let receipt = match self.issuer.issue_or_renew(&session) {
            Ok(receipt) => receipt,
            Err(KycError::AlreadyRevoked { credential, subject }) if absorb_revoked => {
                tracing::warn!(
                    session = %session.id,
                    credential = %credential,
                    subject = %subject,
                    "issuance refused: credential revoked"
                );
                let detail = format!("credential {credential} was revoked by an administrator");
                let (cancelled, ()) = self.update_session(&session.id, |s| {
                    if s.is_terminal() {
                        return Ok(SessionWrite::Unchanged(()));
                    }
                    if s.steps.status(VerificationStep::CredentialIssuance) == StepStatus::Pending {
                        s.fail_step(VerificationStep::CredentialIssuance, detail.clone())?;
                    }
                    s.flag_anomaly(AnomalyKind::CredentialRevoked, Some("credential_issuer"), detail.clone());
                    s.cancel("credential revoked")?;
                    Ok(SessionWrite::Commit(()))
                })?;
                return Ok((cancelled, None));
            }
            Err(e) => return Err(e),
        };

        let credential_id = receipt.credential.id.clone();
        let note = format!(
            "credential {} {} (revision {})",
            credential_id,
            receipt.outcome.as_str(),
            receipt.credential.revision
        );
        let (completed, committed) = self.update_session(&session.id, |s| {
            if s.status == SessionStatus::Completed {
                return Ok(SessionWrite::Unchanged(false));
            }
            if s.steps.status(VerificationStep::CredentialIssuance) == StepStatus::Pending {
                s.complete_system_step(VerificationStep::CredentialIssuance, note.clone())?;
            }
            s.attach_credential(credential_id.clone());
            s.transition_status(SessionStatus::Completed, "credential issued")?;
            Ok(SessionWrite::Commit(true))
        })?;
        if committed {
            self.emit(AuditEvent::for_session(&completed, AuditAction::CredentialIssued, note));
        }
        Ok((completed, Some(receipt)))
    }

    // ── Persistence helpers ──────────────────────────────────────────

    /// Versioned read-modify-write. `apply` runs on a fresh copy each
    /// attempt and must re-validate everything it relies on.
    fn update_session<T>(
        &self,
        session_id: &SessionId,
        mut apply: impl FnMut(&mut VerificationSession) -> Result<SessionWrite<T>, KycError>,
    ) -> Result<(VerificationSession, T), KycError> {
        let limit = self.config.orchestrator.cas_retry_limit;
        for attempt in 1..=limit {
            let current = self.get_session(session_id)?;
            let mut working = current.clone();
            let value = match apply(&mut working)? {
                SessionWrite::Unchanged(value) => return Ok((current, value)),
                SessionWrite::Commit(value) => value,
            };
            match self.sessions.compare_and_set(working)? {
                CasOutcome::Committed(committed) => {
                    self.audit_changes(&current, &committed);
                    return Ok((committed, value));
                }
                CasOutcome::Conflict { current_version } => {
                    tracing::warn!(
                        session = %session_id,
                        attempt,
                        expected_version = current.version,
                        current_version,
                        "session write conflict, retrying"
                    );
                }
            }
        }
        Err(KycError::Storage(format!(
            "session {session_id}: write abandoned after {limit} conflicting attempts"
        )))
    }

    /// Store the evidence records and risk snapshot of a committed write.
    /// Runs after the session commit; failures are logged and counted,
    /// never returned.
    fn persist_after_commit(
        &self,
        session: &VerificationSession,
        records: Vec<DocumentRecord>,
        biometric: Option<BiometricRecord>,
    ) {
        for record in records {
            if let Err(e) = self.evidence.put_document(record) {
                persistence_failed(session, "evidence_documents", &e);
            }
        }
        if let Some(record) = biometric {
            if let Err(e) = self.evidence.put_biometric(record) {
                persistence_failed(session, "evidence_biometrics", &e);
            }
        }
        if let Err(e) = self.record_snapshot(session) {
            persistence_failed(session, "risk_snapshots", &e);
        }
    }

    fn record_snapshot(&self, session: &VerificationSession) -> Result<RiskScoreSnapshot, KycError> {
        let computation = self.risk.compute(session)?;
        self.emit(AuditEvent::for_session(
            session,
            AuditAction::RiskComputed,
            format!(
                "snapshot {} aggregate {} band {}",
                computation.snapshot.sequence, computation.aggregate, computation.band
            ),
        ));
        Ok(computation.snapshot)
    }

    fn audit_changes(&self, before: &VerificationSession, after: &VerificationSession) {
        for record in after.transitions.iter().skip(before.transitions.len()) {
            let (action, scope) = match record.scope {
                TransitionScope::Status => (AuditAction::StatusTransition, "status"),
                TransitionScope::Decision => (AuditAction::DecisionTransition, "decision"),
                TransitionScope::Flow => (AuditAction::FlowEscalated, "flow"),
                TransitionScope::Step(step) => (AuditAction::StepTransition, step.as_str()),
            };
            self.emit(AuditEvent::for_session(
                after,
                action,
                format!("{scope}: {} -> {} ({})", record.from, record.to, record.reason),
            ));
        }
        for anomaly in after.anomalies.iter().skip(before.anomalies.len()) {
            self.emit(AuditEvent::for_session(
                after,
                AuditAction::AnomalyFlagged,
                format!("{}: {}", anomaly.kind, anomaly.detail),
            ));
        }
    }

    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            tracing::warn!(action = event.action.as_str(), error = %e, "audit sink rejected event");
        }
    }
}

impl std::fmt::Debug for StepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOrchestrator")
            .field("config", &self.config)
            .field("risk", self.risk.config())
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

// ─── Evidence application ────────────────────────────────────────────

fn apply_gathered(s: &mut VerificationSession, g: &Gathered) {
    let mut by_category: BTreeMap<DocumentCategory, Vec<String>> = BTreeMap::new();
    for (category, artifact) in &g.refs {
        by_category.entry(*category).or_default().push(artifact.clone());
    }
    for (category, added) in by_category {
        let mut refs = s
            .collected_document_refs
            .get(&category)
            .cloned()
            .unwrap_or_default();
        for artifact in added {
            if !refs.contains(&artifact) {
                refs.push(artifact);
            }
        }
        s.record_document_refs(category, refs);
    }

    if let Some(score) = g.document_score {
        s.set_component(ScoreComponent::DocumentAuthenticity, score);
    }
    if !g.forgery_flags.is_empty() {
        s.flag_anomaly(
            AnomalyKind::ForgeryDetected,
            Some("document_analyzer"),
            format!("forgery indicators: {}", g.forgery_flags.join(", ")),
        );
    }

    if let Some((record, lowest)) = &g.biometric {
        s.set_component(ScoreComponent::BiometricMatch, *lowest);
        let signals = &mut s.biometric_signals;
        signals.liveness = Some(lower(signals.liveness, record.liveness_score));
        signals.face_match = Some(lower(signals.face_match, record.face_match_score));
        signals.deepfake = Some(match signals.deepfake {
            Some(prev) if prev > record.deepfake_score => prev,
            _ => record.deepfake_score,
        });
    }

    if let Some(aml) = &g.aml {
        s.set_component(ScoreComponent::AmlClearance, aml.clearance);
        if aml.sanctions_hit {
            s.sanctions_hit = true;
            s.flag_anomaly(
                AnomalyKind::SanctionsHit,
                Some("aml_screener"),
                format!("matched lists: {}", aml.matched_lists.join(", ")),
            );
        }
    }

    if let Some(behavior) = &g.behavior {
        s.set_component(ScoreComponent::BehavioralTrust, behavior.trust);
        s.bot_likelihood = Some(behavior.bot_likelihood);
    }

    for err in &g.unavailable {
        s.flag_anomaly(
            AnomalyKind::CollaboratorUnavailable,
            Some(err.collaborator()),
            err.to_string(),
        );
    }
}

fn lower(previous: Option<Score>, next: Score) -> Score {
    match previous {
        Some(prev) if prev < next => prev,
        _ => next,
    }
}

/// Mean authenticity over every analyzed document of the session, with
/// `updated` records replacing their stored versions.
fn mean_authenticity(stored: Vec<DocumentRecord>, updated: &[DocumentRecord]) -> Option<Score> {
    let mut all = stored;
    for record in updated {
        match all.iter_mut().find(|d| d.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => all.push(record.clone()),
        }
    }
    let scores: Vec<f64> = all
        .iter()
        .filter_map(|d| d.authenticity_score)
        .map(|s| s.value())
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(Score::new(scores.iter().sum::<f64>() / scores.len() as f64))
}

/// Decided, but the credential or the review task is missing.
fn awaits_follow_up(session: &VerificationSession) -> bool {
    match session.status {
        SessionStatus::Approved => session.approval_decision.is_approving(),
        SessionStatus::PendingManualReview => session.review_id.is_none(),
        _ => false,
    }
}

fn persistence_failed(session: &VerificationSession, port: &'static str, error: &KycError) {
    metrics::counter!("kyc_persistence_failures_total", "port" => port).increment(1);
    tracing::error!(
        session = %session.id,
        port,
        error = %error,
        "write after session commit failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::collaborators::{
        StaticAmlScreener, StaticBehavioralAnalyzer, StaticBiometricVerifier,
        StaticDocumentAnalyzer,
    };

    fn trusted_device() -> DeviceContext {
        DeviceContext {
            fingerprint_trust: Some(88),
            email_verified: true,
            phone_verified: true,
            ..Default::default()
        }
    }

    fn static_collaborators(doc: f64, bio: f64, aml: f64, behavior: f64) -> Collaborators {
        Collaborators::default()
            .with_documents(Arc::new(StaticDocumentAnalyzer::new(doc)))
            .with_biometrics(Arc::new(StaticBiometricVerifier::uniform(bio)))
            .with_aml(Arc::new(StaticAmlScreener::clear(aml)))
            .with_behavior(Arc::new(StaticBehavioralAnalyzer::new(behavior)))
    }

    fn pre() -> StepPayload {
        StepPayload::PreVerification {
            consent_given: true,
            behavioral: Some(Default::default()),
        }
    }

    fn upload() -> StepPayload {
        StepPayload::DocumentUpload {
            documents: vec![DocumentSubmission {
                category: DocumentCategory::IdentityProof,
                document_type: "passport".into(),
                artifact_ref: "blob://passport".into(),
            }],
        }
    }

    fn analysis() -> StepPayload {
        StepPayload::DocumentAnalysis {
            document_refs: vec![],
        }
    }

    fn face() -> StepPayload {
        StepPayload::FaceVerification {
            selfie_ref: "blob://selfie".into(),
            reference_ref: None,
            liveness_frames: vec!["blob://f1".into()],
        }
    }

    #[test]
    fn initiate_selects_flow_from_initial_score() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let session = orch.initiate_verification("  alice  ", &trusted_device()).unwrap();
        assert_eq!(session.subject_id.as_str(), "alice");
        assert_eq!(session.status, SessionStatus::Initiated);
        assert_eq!(session.flow.flow_type, FlowType::FastTrack);
        assert_eq!(session.component_scores.device_trust, Some(Score::new(88.0)));
        assert!(!session.is_reverification);

        let risky = DeviceContext {
            vpn_detected: true,
            is_emulator: true,
            ..Default::default()
        };
        let deep = orch.initiate_verification("bob", &risky).unwrap();
        assert_eq!(deep.flow.flow_type, FlowType::DeepVerification);
        assert!(deep.flow.manual_review_forced);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let err = orch
            .complete_step(&SessionId::new(), VerificationStep::PreVerification, pre())
            .unwrap_err();
        assert!(matches!(err, KycError::SessionNotFound(_)));
    }

    #[test]
    fn duplicate_submission_is_a_no_op() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let s = orch.initiate_verification("dup", &trusted_device()).unwrap();
        let first = orch.complete_step(&s.id, VerificationStep::PreVerification, pre()).unwrap();
        assert_eq!(first.submission, Submission::Fresh);
        let version = first.status.version;

        let again = orch.complete_step(&s.id, VerificationStep::PreVerification, pre()).unwrap();
        assert_eq!(again.submission, Submission::Duplicate);
        assert_eq!(again.status.version, version);
        assert_eq!(orch.risk_history(&s.id).len(), 1);

        let different = StepPayload::PreVerification {
            consent_given: true,
            behavioral: None,
        };
        let err = orch
            .complete_step(&s.id, VerificationStep::PreVerification, different)
            .unwrap_err();
        assert!(matches!(err, KycError::InvalidTransition { .. }));
    }

    #[test]
    fn payload_must_match_step() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let s = orch.initiate_verification("mismatch", &trusted_device()).unwrap();
        let err = orch
            .complete_step(&s.id, VerificationStep::DocumentUpload, pre())
            .unwrap_err();
        assert!(matches!(err, KycError::InvalidTransition { .. }));
    }

    #[test]
    fn prerequisite_enforced_for_required_steps() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let s = orch.initiate_verification("prereq", &trusted_device()).unwrap();
        let err = orch
            .complete_step(&s.id, VerificationStep::DocumentUpload, upload())
            .unwrap_err();
        assert!(matches!(err, KycError::InvalidTransition { .. }));
    }

    #[test]
    fn unavailable_collaborators_fall_back_to_neutral() {
        let audit = MemoryAuditSink::new();
        let orch = StepOrchestrator::builder()
            .audit(Arc::new(audit.clone()))
            .build()
            .unwrap();
        let s = orch.initiate_verification("outage", &trusted_device()).unwrap();
        orch.complete_step(&s.id, VerificationStep::PreVerification, pre()).unwrap();
        orch.complete_step(&s.id, VerificationStep::DocumentUpload, upload()).unwrap();
        let receipt = orch
            .complete_step(&s.id, VerificationStep::DocumentAnalysis, analysis())
            .unwrap();

        let status = receipt.status;
        assert_eq!(status.component_scores.document_authenticity, None);
        assert!(status.anomalies.iter().any(|a| {
            a.kind == AnomalyKind::CollaboratorUnavailable
                && a.source.as_deref() == Some("document_analyzer")
        }));
        let snapshot = orch.risk_history(&s.id).pop().unwrap();
        assert!(snapshot
            .neutral_components()
            .contains(&ScoreComponent::DocumentAuthenticity));
        assert!(audit.count(AuditAction::AnomalyFlagged) >= 1);
    }

    #[test]
    fn outages_send_session_to_review() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let s = orch.initiate_verification("outage-review", &trusted_device()).unwrap();
        for (step, payload) in [
            (VerificationStep::PreVerification, pre()),
            (VerificationStep::DocumentUpload, upload()),
            (VerificationStep::DocumentAnalysis, analysis()),
            (VerificationStep::FaceVerification, face()),
        ] {
            orch.complete_step(&s.id, step, payload).unwrap();
        }
        let status = orch.get_status(&s.id).unwrap();
        assert_eq!(status.approval_decision, ApprovalDecision::ManualReviewRequired);
        assert_eq!(status.status, SessionStatus::PendingManualReview);
        assert!(status.review_id.is_some());
        assert!(orch.credential("outage-review").unwrap().is_none());
    }

    #[test]
    fn low_document_score_escalates_flow() {
        let orch = StepOrchestrator::builder()
            .collaborators(static_collaborators(40.0, 90.0, 95.0, 85.0))
            .build()
            .unwrap();
        let s = orch.initiate_verification("forged", &trusted_device()).unwrap();
        orch.complete_step(&s.id, VerificationStep::PreVerification, pre()).unwrap();
        orch.complete_step(&s.id, VerificationStep::DocumentUpload, upload()).unwrap();
        let status = orch
            .complete_step(&s.id, VerificationStep::DocumentAnalysis, analysis())
            .unwrap()
            .status;
        // 100 - 20 = 80 falls into standard; video becomes required.
        assert_eq!(status.running_risk_score, Score::new(80.0));
        assert_eq!(status.flow_type, FlowType::Standard);
        let video = status
            .steps
            .iter()
            .find(|v| v.step == VerificationStep::VideoVerification)
            .unwrap();
        assert!(video.required);
        assert_eq!(video.status, StepStatus::Pending);
    }

    #[test]
    fn force_re_evaluate_rejects_decided_session() {
        let orch = StepOrchestrator::builder()
            .collaborators(static_collaborators(90.0, 92.0, 95.0, 85.0))
            .build()
            .unwrap();
        let s = orch.initiate_verification("decided", &trusted_device()).unwrap();
        for (step, payload) in [
            (VerificationStep::PreVerification, pre()),
            (VerificationStep::DocumentUpload, upload()),
            (VerificationStep::DocumentAnalysis, analysis()),
            (VerificationStep::FaceVerification, face()),
        ] {
            orch.complete_step(&s.id, step, payload).unwrap();
        }
        assert!(matches!(
            orch.force_re_evaluate_risk(&s.id),
            Err(KycError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn force_re_evaluate_appends_snapshot() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let s = orch.initiate_verification("recompute", &trusted_device()).unwrap();
        orch.force_re_evaluate_risk(&s.id).unwrap();
        orch.force_re_evaluate_risk(&s.id).unwrap();
        let history = orch.risk_history(&s.id);
        assert_eq!(history.iter().map(|h| h.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn drift_counts_decided_sessions_in_the_recent_window() {
        let orch = StepOrchestrator::builder()
            .collaborators(static_collaborators(90.0, 92.0, 95.0, 85.0))
            .build()
            .unwrap();
        let s = orch.initiate_verification("drift", &trusted_device()).unwrap();
        for (step, payload) in [
            (VerificationStep::PreVerification, pre()),
            (VerificationStep::DocumentUpload, upload()),
            (VerificationStep::DocumentAnalysis, analysis()),
            (VerificationStep::FaceVerification, face()),
        ] {
            orch.complete_step(&s.id, step, payload).unwrap();
        }
        orch.initiate_verification("undecided", &trusted_device()).unwrap();

        let report = orch.approval_rate_drift(7);
        assert_eq!(report.recent.sessions, 1);
        assert_eq!(report.recent.auto_approved, 1);
        assert_eq!(report.baseline.sessions, 0);
        assert!(!report.drift_detected);
    }

    #[test]
    fn cancelled_session_rejects_evidence() {
        let orch = StepOrchestrator::builder().build().unwrap();
        let s = orch.initiate_verification("cancel", &trusted_device()).unwrap();
        orch.cancel_verification(&s.id, "subject withdrew").unwrap();
        let err = orch
            .complete_step(&s.id, VerificationStep::PreVerification, pre())
            .unwrap_err();
        assert!(matches!(err, KycError::InvalidTransition { .. }));
    }

    #[test]
    fn mean_authenticity_replaces_updated_records() {
        let sid = SessionId::new();
        let mut a = DocumentRecord::submitted(sid, DocumentCategory::IdentityProof, "passport", "a");
        a.mark_analyzed(Score::new(80.0), vec![]);
        let mut b = DocumentRecord::submitted(sid, DocumentCategory::AddressProof, "bill", "b");
        let stored = vec![a.clone(), b.clone()];
        b.mark_analyzed(Score::new(60.0), vec![]);
        assert_eq!(mean_authenticity(stored, &[b]), Some(Score::new(70.0)));
        assert_eq!(mean_authenticity(vec![], &[]), None);
    }
}
