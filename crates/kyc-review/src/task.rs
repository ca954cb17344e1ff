//! # Review Task Lifecycle
//!
//! A `ReviewTask` is one queued request for a human decision on a session.
//!
//! ## States
//!
//! ```text
//! Pending ──▶ InReview ──▶ Completed (terminal)
//!    │                        ▲
//!    └────────────────────────┘
//! ```
//!
//! A task may be resolved straight from `Pending`; assignment is optional.
//! Escalation raises the priority of an open task to `Urgent` without
//! changing its status.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kyc_core::{KycError, ReviewId, Score, SessionId, StepSet, SubjectId, Timestamp};
use kyc_state::VerificationSession;

// ─── Priority ────────────────────────────────────────────────────────

/// Review priority. Lower scores are drawn first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPriority {
    Urgent,
    High,
    Medium,
    Low,
}

impl ReviewPriority {
    pub fn score(&self) -> u8 {
        match self {
            Self::Urgent => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for ReviewPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Status and decision ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Completed,
}

impl ReviewStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::InReview => "IN_REVIEW",
            Self::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// A reviewer's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum ReviewDecision {
    Approved,
    Rejected,
    /// Re-open the named evidence steps for resubmission.
    RequestMoreInfo { steps: StepSet },
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RequestMoreInfo { .. } => "request_more_info",
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("invalid review transition: {from} -> {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },
}

impl From<ReviewError> for KycError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::InvalidTransition { from, to, reason } => {
                KycError::InvalidTransition { from, to, reason }
            }
        }
    }
}

// ─── Records ─────────────────────────────────────────────────────────

/// Outcome recorded when a task is completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResolution {
    pub decision: ReviewDecision,
    pub notes: String,
    pub reviewer: String,
    pub reviewed_at: Timestamp,
    /// Minutes from assignment (or from resolution when never assigned).
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub reason: String,
    pub previous_priority: ReviewPriority,
    pub escalated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTransitionRecord {
    pub from: ReviewStatus,
    pub to: ReviewStatus,
    pub at: Timestamp,
    pub actor: Option<String>,
}

// ─── Task ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub id: ReviewId,
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub reason: String,
    pub priority: ReviewPriority,
    pub status: ReviewStatus,
    /// Insertion order, assigned by the queue store.
    pub sequence: u64,
    pub enqueued_at: Timestamp,
    pub identity_score: Option<Score>,
    pub risk_score: Score,
    /// Anomaly kinds carried by the session when it was queued.
    pub anomalies: Vec<String>,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<Timestamp>,
    pub resolution: Option<ReviewResolution>,
    pub escalation: Option<Escalation>,
    pub transitions: Vec<ReviewTransitionRecord>,
}

impl ReviewTask {
    /// A pending task for `session`.
    pub fn new(session: &VerificationSession, reason: impl Into<String>, priority: ReviewPriority) -> Self {
        Self {
            id: ReviewId::new(),
            session_id: session.id,
            subject_id: session.subject_id.clone(),
            reason: reason.into(),
            priority,
            status: ReviewStatus::Pending,
            sequence: 0,
            enqueued_at: Timestamp::now(),
            identity_score: session.identity_integrity_score,
            risk_score: session.running_risk_score,
            anomalies: session
                .anomalies
                .iter()
                .map(|a| a.kind.as_str().to_string())
                .collect(),
            assigned_to: None,
            assigned_at: None,
            resolution: None,
            escalation: None,
            transitions: Vec::new(),
        }
    }

    /// Draw-order key: priority score, enqueue time, insertion sequence.
    pub fn queue_key(&self) -> (u8, Timestamp, u64) {
        (self.priority.score(), self.enqueued_at, self.sequence)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Minutes this task has been waiting as of `now`.
    pub fn waiting_minutes(&self, now: &Timestamp) -> i64 {
        now.seconds_since(&self.enqueued_at).max(0) / 60
    }

    /// PENDING → IN_REVIEW.
    pub fn assign(&mut self, reviewer: &str) -> Result<(), ReviewError> {
        if self.status != ReviewStatus::Pending {
            return Err(self.invalid(ReviewStatus::InReview, "only pending tasks can be assigned"));
        }
        let now = Timestamp::now();
        self.assigned_to = Some(reviewer.to_string());
        self.assigned_at = Some(now);
        self.do_transition(ReviewStatus::InReview, now, Some(reviewer));
        Ok(())
    }

    /// PENDING | IN_REVIEW → COMPLETED.
    pub fn complete(
        &mut self,
        decision: ReviewDecision,
        notes: &str,
        reviewer: &str,
    ) -> Result<(), ReviewError> {
        if !self.is_open() {
            return Err(self.invalid(ReviewStatus::Completed, "task is already resolved"));
        }
        if let ReviewDecision::RequestMoreInfo { steps } = decision {
            if steps.is_empty() || steps.evidence() != steps {
                return Err(self.invalid(
                    ReviewStatus::Completed,
                    "more-info requests must name evidence steps",
                ));
            }
        }
        let now = Timestamp::now();
        let started = self.assigned_at.unwrap_or(now);
        self.resolution = Some(ReviewResolution {
            decision,
            notes: notes.to_string(),
            reviewer: reviewer.to_string(),
            reviewed_at: now,
            duration_minutes: now.seconds_since(&started).max(0) / 60,
        });
        self.do_transition(ReviewStatus::Completed, now, Some(reviewer));
        Ok(())
    }

    /// Raise an open task to `Urgent`.
    pub fn escalate(&mut self, reason: &str) -> Result<(), ReviewError> {
        if !self.is_open() {
            return Err(self.invalid(self.status, "completed tasks cannot be escalated"));
        }
        self.escalation = Some(Escalation {
            reason: reason.to_string(),
            previous_priority: self.priority,
            escalated_at: Timestamp::now(),
        });
        self.priority = ReviewPriority::Urgent;
        Ok(())
    }

    fn invalid(&self, to: ReviewStatus, reason: &str) -> ReviewError {
        ReviewError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        }
    }

    fn do_transition(&mut self, to: ReviewStatus, at: Timestamp, actor: Option<&str>) {
        self.transitions.push(ReviewTransitionRecord {
            from: self.status,
            to,
            at,
            actor: actor.map(str::to_string),
        });
        self.status = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::{FlowType, VerificationStep};
    use kyc_state::FlowPlan;

    fn session() -> VerificationSession {
        let plan = FlowPlan {
            flow_type: FlowType::Standard,
            required_steps: StepSet::from_steps(&[VerificationStep::PreVerification]),
            optional_steps: StepSet::empty(),
            manual_review_forced: false,
            estimated_minutes: 15,
        };
        VerificationSession::new(
            SubjectId::new("subject-7").unwrap(),
            plan,
            Score::new(72.0),
            Score::new(80.0),
        )
    }

    #[test]
    fn priority_scores_are_ordered() {
        assert_eq!(ReviewPriority::Urgent.score(), 1);
        assert_eq!(ReviewPriority::Low.score(), 4);
        assert!(ReviewPriority::High.score() < ReviewPriority::Medium.score());
    }

    #[test]
    fn assign_then_complete() {
        let mut task = ReviewTask::new(&session(), "score in review band", ReviewPriority::Medium);
        task.assign("reviewer-1").unwrap();
        assert_eq!(task.status, ReviewStatus::InReview);
        assert_eq!(task.assigned_to.as_deref(), Some("reviewer-1"));
        assert!(task.assign("reviewer-2").is_err());

        task.complete(ReviewDecision::Approved, "documents legible", "reviewer-1")
            .unwrap();
        assert_eq!(task.status, ReviewStatus::Completed);
        let resolution = task.resolution.as_ref().unwrap();
        assert_eq!(resolution.decision, ReviewDecision::Approved);
        assert_eq!(resolution.duration_minutes, 0);
        assert_eq!(task.transitions.len(), 2);
    }

    #[test]
    fn pending_task_can_be_resolved_directly() {
        let mut task = ReviewTask::new(&session(), "r", ReviewPriority::Low);
        task.complete(ReviewDecision::Rejected, "", "reviewer-1").unwrap();
        assert_eq!(task.status, ReviewStatus::Completed);
    }

    #[test]
    fn completed_task_rejects_everything() {
        let mut task = ReviewTask::new(&session(), "r", ReviewPriority::Low);
        task.complete(ReviewDecision::Rejected, "", "a").unwrap();
        assert!(task.complete(ReviewDecision::Approved, "", "b").is_err());
        assert!(task.assign("b").is_err());
        assert!(task.escalate("late").is_err());
    }

    #[test]
    fn more_info_requires_evidence_steps() {
        let mut task = ReviewTask::new(&session(), "r", ReviewPriority::Low);
        let bad = ReviewDecision::RequestMoreInfo {
            steps: StepSet::from_steps(&[VerificationStep::RiskScoring]),
        };
        assert!(task.complete(bad, "", "a").is_err());
        let empty = ReviewDecision::RequestMoreInfo { steps: StepSet::empty() };
        assert!(task.complete(empty, "", "a").is_err());
        assert!(task.is_open());
    }

    #[test]
    fn escalation_records_previous_priority() {
        let mut task = ReviewTask::new(&session(), "r", ReviewPriority::Low);
        task.escalate("customer complaint").unwrap();
        assert_eq!(task.priority, ReviewPriority::Urgent);
        assert_eq!(task.status, ReviewStatus::Pending);
        let esc = task.escalation.as_ref().unwrap();
        assert_eq!(esc.previous_priority, ReviewPriority::Low);
    }

    #[test]
    fn decision_serializes_with_tag() {
        let d = ReviewDecision::RequestMoreInfo {
            steps: StepSet::from_steps(&[VerificationStep::DocumentAnalysis]),
        };
        let json = serde_json::to_value(d).unwrap();
        assert_eq!(json["decision"], "request_more_info");
        assert_eq!(json["steps"][0], "document_analysis");
    }

    #[test]
    fn error_maps_to_invalid_transition() {
        let mut task = ReviewTask::new(&session(), "r", ReviewPriority::Low);
        task.complete(ReviewDecision::Rejected, "", "a").unwrap();
        let err: KycError = task.assign("b").unwrap_err().into();
        assert!(matches!(err, KycError::InvalidTransition { .. }));
    }
}
