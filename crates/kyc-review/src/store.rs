//! # Review Queue Store
//!
//! Persistence port for review tasks and its in-memory implementation.
//! The in-memory store keeps an ordered index of pending tasks keyed by
//! `(priority score, enqueued_at, sequence)`, so draws are strict FIFO
//! within a priority tier.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use kyc_core::{KycError, ReviewId, SessionId, Timestamp};

use crate::task::{ReviewStatus, ReviewTask};

/// Mutation applied by [`ReviewQueueStore::update`].
pub type TaskUpdate<'a> = &'a mut dyn FnMut(&mut ReviewTask) -> Result<(), KycError>;

pub trait ReviewQueueStore: Send + Sync {
    /// Store a new task, assigning its insertion sequence.
    fn insert(&self, task: ReviewTask) -> Result<ReviewTask, KycError>;

    fn get(&self, id: &ReviewId) -> Option<ReviewTask>;

    /// The open task for a session, if one exists.
    fn open_for_session(&self, session_id: &SessionId) -> Option<ReviewTask>;

    /// Atomically read, validate and write one task. The mutation runs on a
    /// copy under the store's write lock and is committed only if it returns
    /// `Ok`.
    fn update(&self, id: &ReviewId, f: TaskUpdate<'_>) -> Result<ReviewTask, KycError>;

    /// Up to `limit` pending tasks in draw order.
    fn pending(&self, limit: usize) -> Vec<ReviewTask>;

    /// Every task, in no particular order.
    fn list(&self) -> Vec<ReviewTask>;
}

type QueueKey = (u8, Timestamp, u64);

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<ReviewId, ReviewTask>,
    queue: BTreeMap<QueueKey, ReviewId>,
    next_sequence: u64,
}

impl Inner {
    fn index(&mut self, task: &ReviewTask) {
        if task.status == ReviewStatus::Pending {
            self.queue.insert(task.queue_key(), task.id);
        }
    }
}

/// In-memory [`ReviewQueueStore`]. Cheaply cloneable; clones share the data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReviewQueue {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewQueueStore for InMemoryReviewQueue {
    fn insert(&self, mut task: ReviewTask) -> Result<ReviewTask, KycError> {
        let mut inner = self.inner.write();
        if inner.tasks.contains_key(&task.id) {
            return Err(KycError::Storage(format!("review task {} already exists", task.id)));
        }
        inner.next_sequence += 1;
        task.sequence = inner.next_sequence;
        inner.index(&task);
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn get(&self, id: &ReviewId) -> Option<ReviewTask> {
        self.inner.read().tasks.get(id).cloned()
    }

    fn open_for_session(&self, session_id: &SessionId) -> Option<ReviewTask> {
        self.inner
            .read()
            .tasks
            .values()
            .find(|t| t.session_id == *session_id && t.is_open())
            .cloned()
    }

    fn update(&self, id: &ReviewId, f: TaskUpdate<'_>) -> Result<ReviewTask, KycError> {
        let mut inner = self.inner.write();
        let current = inner
            .tasks
            .get(id)
            .ok_or_else(|| KycError::ReviewNotFound(id.to_string()))?;
        let mut updated = current.clone();
        let old_key = current.queue_key();
        f(&mut updated)?;
        inner.queue.remove(&old_key);
        inner.index(&updated);
        inner.tasks.insert(*id, updated.clone());
        Ok(updated)
    }

    fn pending(&self, limit: usize) -> Vec<ReviewTask> {
        let inner = self.inner.read();
        inner
            .queue
            .values()
            .filter_map(|id| inner.tasks.get(id))
            .take(limit)
            .cloned()
            .collect()
    }

    fn list(&self) -> Vec<ReviewTask> {
        self.inner.read().tasks.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ReviewPriority;
    use kyc_core::{FlowType, Score, StepSet, SubjectId};
    use kyc_state::{FlowPlan, VerificationSession};

    fn task(priority: ReviewPriority) -> ReviewTask {
        let plan = FlowPlan {
            flow_type: FlowType::Standard,
            required_steps: StepSet::empty(),
            optional_steps: StepSet::empty(),
            manual_review_forced: false,
            estimated_minutes: 15,
        };
        let session = VerificationSession::new(
            SubjectId::new("subject").unwrap(),
            plan,
            Score::new(70.0),
            Score::new(70.0),
        );
        ReviewTask::new(&session, "review", priority)
    }

    #[test]
    fn insert_assigns_increasing_sequence() {
        let store = InMemoryReviewQueue::new();
        let a = store.insert(task(ReviewPriority::Low)).unwrap();
        let b = store.insert(task(ReviewPriority::Low)).unwrap();
        assert_eq!(a.sequence, 1);
        assert_eq!(b.sequence, 2);
    }

    #[test]
    fn pending_is_priority_then_fifo() {
        let store = InMemoryReviewQueue::new();
        let low = store.insert(task(ReviewPriority::Low)).unwrap();
        let medium_1 = store.insert(task(ReviewPriority::Medium)).unwrap();
        let medium_2 = store.insert(task(ReviewPriority::Medium)).unwrap();
        let urgent = store.insert(task(ReviewPriority::Urgent)).unwrap();

        let order: Vec<ReviewId> = store.pending(10).iter().map(|t| t.id).collect();
        assert_eq!(order, vec![urgent.id, medium_1.id, medium_2.id, low.id]);
        assert_eq!(store.pending(2).len(), 2);
    }

    #[test]
    fn failed_update_is_not_committed() {
        let store = InMemoryReviewQueue::new();
        let t = store.insert(task(ReviewPriority::Low)).unwrap();
        let err = store
            .update(&t.id, &mut |task| {
                task.priority = ReviewPriority::Urgent;
                Err(KycError::Storage("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, KycError::Storage(_)));
        assert_eq!(store.get(&t.id).unwrap().priority, ReviewPriority::Low);
    }

    #[test]
    fn update_reindexes_and_drops_non_pending() {
        let store = InMemoryReviewQueue::new();
        let first = store.insert(task(ReviewPriority::Medium)).unwrap();
        let second = store.insert(task(ReviewPriority::Low)).unwrap();

        store
            .update(&second.id, &mut |t| t.escalate("vip").map_err(Into::into))
            .unwrap();
        assert_eq!(store.pending(1)[0].id, second.id);

        store
            .update(&second.id, &mut |t| t.assign("r1").map_err(Into::into))
            .unwrap();
        let pending: Vec<ReviewId> = store.pending(10).iter().map(|t| t.id).collect();
        assert_eq!(pending, vec![first.id]);
    }

    #[test]
    fn update_unknown_task_is_not_found() {
        let store = InMemoryReviewQueue::new();
        let err = store.update(&ReviewId::new(), &mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, KycError::ReviewNotFound(_)));
    }

    #[test]
    fn open_for_session_ignores_completed() {
        let store = InMemoryReviewQueue::new();
        let t = store.insert(task(ReviewPriority::Low)).unwrap();
        assert!(store.open_for_session(&t.session_id).is_some());
        store
            .update(&t.id, &mut |t| {
                t.complete(crate::ReviewDecision::Rejected, "", "r").map_err(Into::into)
            })
            .unwrap();
        assert!(store.open_for_session(&t.session_id).is_none());
    }
}
