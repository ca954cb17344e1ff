//! # Concurrent Completion and Issuance
//!
//! Threads race on the same session and on the same subject. Exactly one
//! write wins each race; the others observe its result.

mod common;

use std::thread;

use common::{collaborators, device, fast_track_steps, face, submit_all, Harness};

use kyc_core::VerificationStep;
use kyc_credential::{CredentialStore, UpsertOutcome};
use kyc_state::{Submission, SessionStatus, TransitionScope};

const THREADS: usize = 8;

#[test]
fn identical_final_step_decides_once() {
    let harness = Harness::new();
    let orch = harness.orchestrator(collaborators(90.0, 92.0, 95.0, 85.0));
    let session = orch.initiate_verification("race-final", &device(88)).unwrap();
    let mut steps = fast_track_steps("race-final");
    let (last_step, last_payload) = steps.pop().unwrap();
    submit_all(&orch, &session.id, steps);

    let submissions: Vec<Submission> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let payload = last_payload.clone();
                let orch = &orch;
                let id = session.id;
                scope.spawn(move || orch.complete_step(&id, last_step, payload).unwrap().submission)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let fresh = submissions.iter().filter(|s| **s == Submission::Fresh).count();
    assert_eq!(fresh, 1);
    assert_eq!(submissions.len(), THREADS);

    let final_session = orch.get_session(&session.id).unwrap();
    assert_eq!(final_session.status, SessionStatus::Completed);
    let decisions = final_session
        .transitions
        .iter()
        .filter(|t| t.scope == TransitionScope::Decision)
        .count();
    assert_eq!(decisions, 1);
    assert_eq!(harness.credentials.len(), 1);
    assert_eq!(orch.credential("race-final").unwrap().unwrap().revision, 1);
}

#[test]
fn different_final_payloads_one_wins() {
    let harness = Harness::new();
    let orch = harness.orchestrator(collaborators(90.0, 92.0, 95.0, 85.0));
    let session = orch.initiate_verification("race-different", &device(88)).unwrap();
    let mut steps = fast_track_steps("race-different");
    steps.pop();
    submit_all(&orch, &session.id, steps);

    let results: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let orch = &orch;
                let id = session.id;
                scope.spawn(move || {
                    orch.complete_step(
                        &id,
                        VerificationStep::FaceVerification,
                        face(&format!("blob://selfie-{i}")),
                    )
                    .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(harness.credentials.len(), 1);
}

#[test]
fn concurrent_issue_calls_return_one_credential() {
    let harness = Harness::new();
    let orch = harness.orchestrator(collaborators(90.0, 92.0, 95.0, 85.0));
    let session = orch.initiate_verification("race-issue", &device(88)).unwrap();
    submit_all(&orch, &session.id, fast_track_steps("race-issue"));
    let issued = orch.credential("race-issue").unwrap().unwrap();

    let receipts: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let orch = &orch;
                let id = session.id;
                scope.spawn(move || orch.issue_or_renew_credential(&id).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(receipts.iter().all(|r| r.credential.id == issued.id));
    assert!(receipts.iter().all(|r| r.outcome == UpsertOutcome::Unchanged));
    assert!(receipts.iter().all(|r| r.credential.revision == 1));
    assert_eq!(harness.credentials.len(), 1);
}

#[test]
fn parallel_sessions_for_one_subject_converge_on_the_newest() {
    let harness = Harness::new();
    // Each session gets its own biometric score, so the credential shows
    // whose data it carries.
    let orchestrators: Vec<_> = (0..5)
        .map(|i| harness.orchestrator(collaborators(90.0, 92.0 + i as f64, 95.0, 85.0)))
        .collect();

    let sessions: Vec<_> = orchestrators
        .iter()
        .map(|orch| orch.initiate_verification("race-subject", &device(88)).unwrap())
        .collect();
    let mut finals = Vec::new();
    for (i, (orch, s)) in orchestrators.iter().zip(&sessions).enumerate() {
        let mut steps = fast_track_steps(&format!("race-subject-{i}"));
        finals.push(steps.pop().unwrap());
        submit_all(orch, &s.id, steps);
    }

    thread::scope(|scope| {
        for ((orch, s), (step, payload)) in orchestrators.iter().zip(&sessions).zip(finals) {
            let id = s.id;
            scope.spawn(move || orch.complete_step(&id, step, payload).unwrap());
        }
    });

    let orch = &orchestrators[0];
    let newest = sessions.last().unwrap();
    let newest_score = orch.get_status(&newest.id).unwrap().identity_integrity_score;
    let oldest_score = orch.get_status(&sessions[0].id).unwrap().identity_integrity_score;
    assert_ne!(newest_score, oldest_score);

    assert_eq!(harness.credentials.len(), 1);
    let credential = orch.credential("race-subject").unwrap().unwrap();
    assert_eq!(credential.session_id, newest.id);
    assert_eq!(credential.session_sequence, newest.sequence);
    assert_eq!(Some(credential.summary.identity_integrity_score), newest_score);
    assert!((1..=5).contains(&credential.revision));
    for s in &sessions {
        let status = orch.get_status(&s.id).unwrap();
        assert_eq!(status.status, SessionStatus::Completed);
        assert_eq!(status.linked_credential_id, Some(credential.id.clone()));
    }
}
