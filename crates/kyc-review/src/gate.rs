//! # Manual Review Gate
//!
//! Queues sessions that need a human decision and records the reviewer's
//! resolution. The gate owns only the queue; applying a resolution to the
//! session (and issuing a credential) is the orchestrator's job.
//!
//! ## Security Invariant
//!
//! Resolution is compare-and-set on the task status: a task that is already
//! completed cannot be resolved again, so two reviewers racing on the same
//! task produce exactly one decision.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kyc_core::{KycError, ReviewId, Timestamp};
use kyc_state::{AnomalyKind, ApprovalDecision, VerificationSession};

use crate::store::{InMemoryReviewQueue, ReviewQueueStore};
use crate::task::{ReviewDecision, ReviewPriority, ReviewStatus, ReviewTask};

/// Anomaly count at which a session qualifies for review on its own.
pub const REVIEW_ANOMALY_THRESHOLD: usize = 2;
/// Pending count above which a backlog alert is raised.
pub const BACKLOG_ALERT_THRESHOLD: usize = 100;
/// Average review minutes above which a slow-review alert is raised.
pub const SLOW_REVIEW_ALERT_MINUTES: f64 = 30.0;

/// Priority for a session entering review: sanctions hits are urgent,
/// anomalous or forced-review sessions are high, everything else medium.
pub fn priority_for(session: &VerificationSession) -> ReviewPriority {
    if session.sanctions_hit || session.has_anomaly(AnomalyKind::SanctionsHit) {
        ReviewPriority::Urgent
    } else if session.anomaly_count() >= REVIEW_ANOMALY_THRESHOLD
        || session.flow.manual_review_forced
    {
        ReviewPriority::High
    } else {
        ReviewPriority::Medium
    }
}

/// A pending task with its current waiting time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task: ReviewTask,
    pub waiting_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "alert")]
pub enum QueueAlert {
    QueueBacklog { pending: usize },
    SlowReviews { avg_review_minutes: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStatistics {
    pub pending: usize,
    pub in_review: usize,
    pub completed_today: usize,
    pub avg_review_minutes: f64,
    pub total_reviewed: usize,
    pub approved: usize,
    pub rejected: usize,
    pub more_info_requested: usize,
    /// Approved share of all completed reviews, in percent.
    pub approval_rate: f64,
    pub alerts: Vec<QueueAlert>,
}

/// Manual review queue front end.
#[derive(Clone)]
pub struct ManualReviewGate {
    store: Arc<dyn ReviewQueueStore>,
}

impl std::fmt::Debug for ManualReviewGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualReviewGate").finish_non_exhaustive()
    }
}

impl Default for ManualReviewGate {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryReviewQueue::new()))
    }
}

impl ManualReviewGate {
    pub fn new(store: Arc<dyn ReviewQueueStore>) -> Self {
        Self { store }
    }

    /// Queue `session` for review.
    ///
    /// The session must be decided `manual_review_required` or carry at
    /// least two anomaly flags. If the session already has an open task,
    /// that task is returned unchanged.
    pub fn enqueue(
        &self,
        session: &VerificationSession,
        reason: &str,
        priority: ReviewPriority,
    ) -> Result<ReviewTask, KycError> {
        let eligible = session.approval_decision == ApprovalDecision::ManualReviewRequired
            || session.anomaly_count() >= REVIEW_ANOMALY_THRESHOLD;
        if !eligible {
            return Err(KycError::invalid_transition(
                session.approval_decision,
                "manual_review",
                "session does not require manual review",
            ));
        }
        if session.is_terminal() {
            return Err(KycError::invalid_transition(
                session.status,
                "manual_review",
                "session is terminal",
            ));
        }
        if let Some(existing) = self.store.open_for_session(&session.id) {
            tracing::debug!(session = %session.id, review = %existing.id, "review already queued");
            return Ok(existing);
        }

        let task = self.store.insert(ReviewTask::new(session, reason, priority))?;
        metrics::counter!("kyc_reviews_enqueued_total", "priority" => priority.as_str())
            .increment(1);
        tracing::info!(
            session = %session.id,
            review = %task.id,
            priority = %priority,
            reason,
            "session queued for manual review"
        );
        Ok(task)
    }

    pub fn get(&self, review_id: &ReviewId) -> Result<ReviewTask, KycError> {
        self.store
            .get(review_id)
            .ok_or_else(|| KycError::ReviewNotFound(review_id.to_string()))
    }

    /// Record a reviewer's decision. The task must be pending or in review.
    pub fn resolve(
        &self,
        review_id: &ReviewId,
        decision: ReviewDecision,
        notes: &str,
        reviewer: &str,
    ) -> Result<ReviewTask, KycError> {
        let task = self.store.update(review_id, &mut |task| {
            task.complete(decision, notes, reviewer).map_err(Into::into)
        })?;
        tracing::info!(
            review = %task.id,
            session = %task.session_id,
            decision = %decision,
            reviewer,
            "manual review resolved"
        );
        Ok(task)
    }

    /// Claim a pending task for `reviewer`.
    pub fn assign(&self, review_id: &ReviewId, reviewer: &str) -> Result<ReviewTask, KycError> {
        let task = self
            .store
            .update(review_id, &mut |task| task.assign(reviewer).map_err(Into::into))?;
        tracing::info!(review = %task.id, reviewer, "review assigned");
        Ok(task)
    }

    /// Raise an open task to urgent.
    pub fn escalate(&self, review_id: &ReviewId, reason: &str) -> Result<ReviewTask, KycError> {
        let task = self
            .store
            .update(review_id, &mut |task| task.escalate(reason).map_err(Into::into))?;
        tracing::warn!(review = %task.id, session = %task.session_id, reason, "review escalated");
        Ok(task)
    }

    /// Up to `limit` pending tasks in draw order.
    pub fn pending(&self, limit: usize) -> Vec<QueueEntry> {
        let now = Timestamp::now();
        self.store
            .pending(limit)
            .into_iter()
            .map(|task| QueueEntry {
                waiting_minutes: task.waiting_minutes(&now),
                task,
            })
            .collect()
    }

    pub fn statistics(&self) -> ReviewStatistics {
        self.statistics_at(&Timestamp::now())
    }

    /// Queue statistics with "today" taken as the UTC day of `now`.
    pub fn statistics_at(&self, now: &Timestamp) -> ReviewStatistics {
        let tasks = self.store.list();
        let mut stats = ReviewStatistics {
            pending: 0,
            in_review: 0,
            completed_today: 0,
            avg_review_minutes: 0.0,
            total_reviewed: 0,
            approved: 0,
            rejected: 0,
            more_info_requested: 0,
            approval_rate: 0.0,
            alerts: Vec::new(),
        };
        let mut total_minutes = 0i64;

        for task in &tasks {
            match task.status {
                ReviewStatus::Pending => stats.pending += 1,
                ReviewStatus::InReview => stats.in_review += 1,
                ReviewStatus::Completed => {}
            }
            let Some(resolution) = &task.resolution else {
                continue;
            };
            stats.total_reviewed += 1;
            total_minutes += resolution.duration_minutes;
            if resolution.reviewed_at.same_utc_day(now) {
                stats.completed_today += 1;
            }
            match resolution.decision {
                ReviewDecision::Approved => stats.approved += 1,
                ReviewDecision::Rejected => stats.rejected += 1,
                ReviewDecision::RequestMoreInfo { .. } => stats.more_info_requested += 1,
            }
        }

        if stats.total_reviewed > 0 {
            let total = stats.total_reviewed as f64;
            stats.avg_review_minutes = total_minutes as f64 / total;
            stats.approval_rate = stats.approved as f64 / total * 100.0;
        }
        if stats.pending > BACKLOG_ALERT_THRESHOLD {
            stats.alerts.push(QueueAlert::QueueBacklog { pending: stats.pending });
        }
        if stats.avg_review_minutes > SLOW_REVIEW_ALERT_MINUTES {
            stats.alerts.push(QueueAlert::SlowReviews {
                avg_review_minutes: stats.avg_review_minutes,
            });
        }
        stats
    }
}
