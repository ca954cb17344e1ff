//! # Store Failures After a Decision
//!
//! Evidence, snapshot and review-queue writes run after the session write
//! commits. A failing store must not leave a decided session without its
//! credential or its review task.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{collaborators, device, fast_track_steps, submit_all, Harness};

use kyc_core::{KycError, ReviewId, SessionId};
use kyc_credential::CredentialStatus;
use kyc_engine::{EvidenceStore, InMemoryEvidenceStore};
use kyc_review::{InMemoryReviewQueue, ReviewDecision, ReviewQueueStore, ReviewTask, TaskUpdate};
use kyc_state::{ApprovalDecision, BiometricRecord, DocumentRecord, SessionStatus};

/// Stores documents but refuses every biometric capture.
struct BiometricsOffline(InMemoryEvidenceStore);

impl EvidenceStore for BiometricsOffline {
    fn put_document(&self, record: DocumentRecord) -> Result<(), KycError> {
        self.0.put_document(record)
    }

    fn documents(&self, session_id: &SessionId) -> Vec<DocumentRecord> {
        self.0.documents(session_id)
    }

    fn put_biometric(&self, _record: BiometricRecord) -> Result<(), KycError> {
        Err(KycError::Storage("biometric store offline".into()))
    }

    fn biometrics(&self, session_id: &SessionId) -> Vec<BiometricRecord> {
        self.0.biometrics(session_id)
    }
}

/// Review queue whose inserts fail while `offline` is set.
#[derive(Default)]
struct SwitchableQueue {
    inner: InMemoryReviewQueue,
    offline: AtomicBool,
}

impl ReviewQueueStore for SwitchableQueue {
    fn insert(&self, task: ReviewTask) -> Result<ReviewTask, KycError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(KycError::Storage("review queue offline".into()));
        }
        self.inner.insert(task)
    }

    fn get(&self, id: &ReviewId) -> Option<ReviewTask> {
        self.inner.get(id)
    }

    fn open_for_session(&self, session_id: &SessionId) -> Option<ReviewTask> {
        self.inner.open_for_session(session_id)
    }

    fn update(&self, id: &ReviewId, f: TaskUpdate<'_>) -> Result<ReviewTask, KycError> {
        self.inner.update(id, f)
    }

    fn pending(&self, limit: usize) -> Vec<ReviewTask> {
        self.inner.pending(limit)
    }

    fn list(&self) -> Vec<ReviewTask> {
        self.inner.list()
    }
}

#[test]
fn evidence_failure_still_issues_the_credential() {
    let harness = Harness::new();
    let orch = harness
        .builder(collaborators(90.0, 92.0, 95.0, 85.0))
        .evidence(Arc::new(BiometricsOffline(InMemoryEvidenceStore::new())))
        .build()
        .unwrap();
    let s = orch.initiate_verification("offline-a", &device(88)).unwrap();
    let mut steps = fast_track_steps("offline-a");
    let (step, payload) = steps.pop().unwrap();
    submit_all(&orch, &s.id, steps);

    let receipt = orch.complete_step(&s.id, step, payload).unwrap();
    assert_eq!(receipt.status.approval_decision, ApprovalDecision::AutoApproved);
    assert_eq!(receipt.status.status, SessionStatus::Completed);
    let credential = orch.credential("offline-a").unwrap().unwrap();
    assert_eq!(credential.status, CredentialStatus::Active);
    assert_eq!(receipt.status.linked_credential_id, Some(credential.id));
    // The snapshot of the deciding step is still recorded.
    assert_eq!(orch.risk_history(&s.id).len(), 5);
}

#[test]
fn evidence_failure_still_queues_the_review() {
    let harness = Harness::new();
    let orch = harness
        .builder(collaborators(70.0, 80.0, 90.0, 85.0))
        .evidence(Arc::new(BiometricsOffline(InMemoryEvidenceStore::new())))
        .build()
        .unwrap();
    let s = orch.initiate_verification("offline-b", &device(60)).unwrap();
    submit_all(&orch, &s.id, fast_track_steps("offline-b"));

    let status = orch.get_status(&s.id).unwrap();
    assert_eq!(status.status, SessionStatus::PendingManualReview);
    let review_id = status.review_id.expect("review queued despite evidence failure");
    assert_eq!(orch.review(&review_id).unwrap().session_id, s.id);
}

#[test]
fn unqueued_review_is_recovered_by_re_evaluation() {
    let harness = Harness::new();
    let queue = Arc::new(SwitchableQueue::default());
    queue.offline.store(true, Ordering::SeqCst);
    let orch = harness
        .builder(collaborators(70.0, 80.0, 90.0, 85.0))
        .review_queue(queue.clone())
        .build()
        .unwrap();
    let s = orch.initiate_verification("offline-c", &device(60)).unwrap();
    let mut steps = fast_track_steps("offline-c");
    let (step, payload) = steps.pop().unwrap();
    submit_all(&orch, &s.id, steps);

    assert!(matches!(
        orch.complete_step(&s.id, step, payload),
        Err(KycError::Storage(_))
    ));
    let stranded = orch.get_status(&s.id).unwrap();
    assert_eq!(stranded.status, SessionStatus::PendingManualReview);
    assert_eq!(stranded.review_id, None);

    // Still offline: the retry fails and changes nothing.
    assert!(orch.force_re_evaluate_risk(&s.id).is_err());
    assert_eq!(orch.get_status(&s.id).unwrap().version, stranded.version);

    queue.offline.store(false, Ordering::SeqCst);
    let recovered = orch.force_re_evaluate_risk(&s.id).unwrap();
    assert_eq!(recovered.status, SessionStatus::PendingManualReview);
    let review_id = recovered.review_id.expect("review queued on retry");
    assert_eq!(orch.pending_reviews(10).len(), 1);

    // Once queued, the session is decided and no longer re-evaluated.
    assert!(matches!(
        orch.force_re_evaluate_risk(&s.id),
        Err(KycError::InvalidTransition { .. })
    ));
    assert_eq!(orch.pending_reviews(10).len(), 1);

    let approved = orch
        .resolve_manual_review(&review_id, ReviewDecision::Approved, "ok", "analyst-4")
        .unwrap();
    assert_eq!(approved.status, SessionStatus::Completed);
    assert_eq!(orch.credential("offline-c").unwrap().unwrap().revision, 1);
}
