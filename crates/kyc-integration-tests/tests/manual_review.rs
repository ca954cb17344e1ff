//! # Manual Review Round Trip
//!
//! A reviewer asks for a new selfie; the subject resubmits and the session
//! goes back into the queue under a fresh task.

mod common;

use common::{collaborators, device, face, fast_track_steps, submit_all, Harness};

use kyc_core::{StepSet, VerificationStep};
use kyc_review::{ReviewDecision, ReviewPriority, ReviewStatus};
use kyc_state::{ApprovalDecision, SessionStatus, StepStatus};

#[test]
fn request_more_info_reopens_and_requeues() {
    let harness = Harness::new();
    let orch = harness.orchestrator(collaborators(70.0, 80.0, 90.0, 85.0));
    let s = orch.initiate_verification("more-info", &device(60)).unwrap();
    submit_all(&orch, &s.id, fast_track_steps("more-info"));
    let first_review = orch.get_status(&s.id).unwrap().review_id.unwrap();

    let reopened = orch
        .resolve_manual_review(
            &first_review,
            ReviewDecision::RequestMoreInfo {
                steps: StepSet::from_steps(&[VerificationStep::FaceVerification]),
            },
            "selfie is blurred",
            "analyst-3",
        )
        .unwrap();
    assert_eq!(reopened.status, SessionStatus::InProgress);
    assert_eq!(reopened.approval_decision, ApprovalDecision::Pending);
    assert_eq!(reopened.current_step, VerificationStep::FaceVerification);
    let status_of = |step: VerificationStep| {
        reopened.steps.iter().find(|v| v.step == step).unwrap().status
    };
    assert_eq!(status_of(VerificationStep::FaceVerification), StepStatus::Pending);
    assert_eq!(status_of(VerificationStep::RiskScoring), StepStatus::Pending);
    assert_eq!(status_of(VerificationStep::DocumentAnalysis), StepStatus::Completed);
    assert_eq!(orch.review(&first_review).unwrap().status, ReviewStatus::Completed);

    let receipt = orch
        .complete_step(&s.id, VerificationStep::FaceVerification, face("blob://more-info/selfie-2"))
        .unwrap();
    assert_eq!(receipt.status.status, SessionStatus::PendingManualReview);
    let second_review = receipt.status.review_id.unwrap();
    assert_ne!(second_review, first_review);
    assert_eq!(orch.review(&second_review).unwrap().status, ReviewStatus::Pending);
    assert_eq!(orch.pending_reviews(10).len(), 1);
}

#[test]
fn escalated_review_can_still_be_approved() {
    let harness = Harness::new();
    let orch = harness.orchestrator(collaborators(70.0, 80.0, 90.0, 85.0));
    let s = orch.initiate_verification("escalated", &device(60)).unwrap();
    submit_all(&orch, &s.id, fast_track_steps("escalated"));
    let review_id = orch.get_status(&s.id).unwrap().review_id.unwrap();

    let escalated = orch.escalate_review(&review_id, "second opinion").unwrap();
    assert_eq!(escalated.priority, ReviewPriority::Urgent);
    assert_eq!(
        escalated.escalation.unwrap().previous_priority,
        ReviewPriority::Medium
    );

    let approved = orch
        .resolve_manual_review(&review_id, ReviewDecision::Approved, "ok", "lead-1")
        .unwrap();
    assert_eq!(approved.status, SessionStatus::Completed);
    assert_eq!(orch.credential("escalated").unwrap().unwrap().revision, 1);
    assert_eq!(orch.review_statistics().approved, 1);
}
