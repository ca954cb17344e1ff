//! # Credential Issuer
//!
//! Issues, renews, suspends for update, and revokes the single credential
//! of a subject. Every write is one [`CredentialStore::upsert`] call, so the
//! decision "create, renew or keep" is taken against the state the store
//! holds at that instant, never against a stale read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kyc_core::{CredentialId, KycError, SubjectId, Timestamp};
use kyc_state::VerificationSession;

use crate::credential::{
    verify_credential, Credential, CredentialProof, CredentialStatus, CredentialVerification,
    RevocationRecord, VerificationSummary,
};
use crate::signing::{CredentialSigner, PublicKey};
use crate::store::{CredentialStore, InMemoryCredentialStore, Upsert, UpsertOutcome};

/// Default credential lifetime.
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceReceipt {
    pub credential: Credential,
    pub outcome: UpsertOutcome,
}

#[derive(Clone)]
pub struct CredentialIssuer {
    store: Arc<dyn CredentialStore>,
    signer: Option<Arc<dyn CredentialSigner>>,
    validity_days: i64,
}

impl std::fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("signed", &self.signer.is_some())
            .field("validity_days", &self.validity_days)
            .finish_non_exhaustive()
    }
}

impl Default for CredentialIssuer {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryCredentialStore::new()))
    }
}

impl CredentialIssuer {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            signer: None,
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn CredentialSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_validity_days(mut self, days: i64) -> Self {
        self.validity_days = days;
        self
    }

    pub fn public_key(&self) -> Option<PublicKey> {
        self.signer.as_ref().map(|s| s.public_key())
    }

    pub fn get(&self, subject_id: &SubjectId) -> Option<Credential> {
        self.store.get(subject_id)
    }

    pub fn find(&self, credential_id: &CredentialId) -> Option<Credential> {
        self.store.find(credential_id)
    }

    /// Issue a credential for an approved session, or renew the subject's
    /// existing one in place.
    ///
    /// - no credential: create one (revision 1, `active`);
    /// - revoked: `AlreadyRevoked`;
    /// - last written by this session, or by a session created after it:
    ///   returned unchanged;
    /// - otherwise: renewed with this session's data (revision + 1, expiry
    ///   refreshed). The credential stays `updating` while a session created
    ///   after this one is still re-verifying the subject, and becomes
    ///   `active` otherwise.
    pub fn issue_or_renew(
        &self,
        session: &VerificationSession,
    ) -> Result<IssuanceReceipt, KycError> {
        if !session.approval_decision.is_approving() {
            return Err(KycError::NotApproved {
                session: session.id.to_string(),
                decision: session.approval_decision.to_string(),
            });
        }
        let summary = VerificationSummary::from_session(session);
        let now = Timestamp::now();

        let (credential, outcome) = self.store.upsert(&session.subject_id, &mut |existing| {
            match existing {
                None => {
                    let credential = Credential {
                        id: CredentialId::generate(),
                        subject_id: session.subject_id.clone(),
                        issued_at: now,
                        expiry_date: now.plus_days(self.validity_days),
                        updated_at: now,
                        status: CredentialStatus::Active,
                        session_id: session.id,
                        session_sequence: session.sequence,
                        reverification_sequence: None,
                        summary: summary.clone(),
                        revision: 1,
                        content_hash: String::new(),
                        proof: None,
                        revocation: None,
                    };
                    Ok(Upsert::Insert(self.seal(credential, now)?))
                }
                Some(current) if current.is_revoked() => Err(KycError::AlreadyRevoked {
                    credential: current.id.to_string(),
                    subject: current.subject_id.to_string(),
                }),
                Some(current)
                    if current.session_id == session.id
                        || session.sequence < current.session_sequence =>
                {
                    Ok(Upsert::Keep)
                }
                Some(current) => {
                    let mut renewed = current.clone();
                    renewed.session_id = session.id;
                    renewed.session_sequence = session.sequence;
                    renewed.summary = summary.clone();
                    renewed.expiry_date = now.plus_days(self.validity_days);
                    renewed.updated_at = now;
                    match current.reverification_sequence {
                        Some(pending) if pending > session.sequence => {
                            renewed.status = CredentialStatus::Updating;
                        }
                        _ => {
                            renewed.status = CredentialStatus::Active;
                            renewed.reverification_sequence = None;
                        }
                    }
                    renewed.revision += 1;
                    Ok(Upsert::Replace(self.seal(renewed, now)?))
                }
            }
        })?;

        metrics::counter!("kyc_credentials_issued_total", "outcome" => outcome.as_str())
            .increment(1);
        match outcome {
            UpsertOutcome::Unchanged if credential.session_id == session.id => tracing::debug!(
                credential = %credential.id,
                session = %session.id,
                "credential already issued by this session"
            ),
            UpsertOutcome::Unchanged => tracing::info!(
                credential = %credential.id,
                session = %session.id,
                session_sequence = session.sequence,
                credential_sequence = credential.session_sequence,
                "credential holds a newer session's data; renewal skipped"
            ),
            _ => tracing::info!(
                credential = %credential.id,
                subject = %credential.subject_id,
                session = %session.id,
                revision = credential.revision,
                status = %credential.status,
                outcome = outcome.as_str(),
                "credential issued"
            ),
        }
        Ok(IssuanceReceipt { credential, outcome })
    }

    /// Flag the subject's credential as `updating` while `session`
    /// re-verifies the subject, recording it as the newest re-verification.
    /// Revoked credentials stay revoked. Returns the subject's credential,
    /// if any.
    pub fn mark_updating(
        &self,
        session: &VerificationSession,
    ) -> Result<Option<Credential>, KycError> {
        let result = self.store.upsert(&session.subject_id, &mut |existing| match existing {
            Some(current) if current.is_revoked() => Ok(Upsert::Keep),
            Some(current)
                if current
                    .reverification_sequence
                    .is_some_and(|pending| pending >= session.sequence) =>
            {
                Ok(Upsert::Keep)
            }
            Some(current) => {
                let mut updating = current.clone();
                updating.status = CredentialStatus::Updating;
                updating.reverification_sequence = Some(session.sequence);
                updating.updated_at = Timestamp::now();
                Ok(Upsert::Replace(updating))
            }
            None => Ok(Upsert::Keep),
        });
        match result {
            Ok((credential, outcome)) => {
                if outcome == UpsertOutcome::Updated {
                    tracing::info!(
                        credential = %credential.id,
                        session = %session.id,
                        sequence = session.sequence,
                        "credential marked updating for re-verification"
                    );
                }
                Ok(Some(credential))
            }
            Err(KycError::SubjectNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Administratively revoke the subject's credential.
    pub fn revoke(
        &self,
        subject_id: &SubjectId,
        reason: &str,
        actor: &str,
    ) -> Result<Credential, KycError> {
        let (credential, _) = self.store.upsert(subject_id, &mut |existing| match existing {
            Some(current) if current.is_revoked() => Err(KycError::AlreadyRevoked {
                credential: current.id.to_string(),
                subject: current.subject_id.to_string(),
            }),
            Some(current) => {
                let now = Timestamp::now();
                let mut revoked = current.clone();
                revoked.status = CredentialStatus::Revoked;
                revoked.updated_at = now;
                revoked.revocation = Some(RevocationRecord {
                    reason: reason.to_string(),
                    actor: actor.to_string(),
                    revoked_at: now,
                });
                Ok(Upsert::Replace(revoked))
            }
            None => Ok(Upsert::Keep),
        })?;
        tracing::warn!(
            credential = %credential.id,
            subject = %subject_id,
            actor,
            reason,
            "credential revoked"
        );
        Ok(credential)
    }

    /// Verify against this issuer's signing key.
    pub fn verify(
        &self,
        credential: &Credential,
        now: &Timestamp,
    ) -> Result<CredentialVerification, KycError> {
        let key = self
            .public_key()
            .ok_or_else(|| KycError::Config("issuer has no signing key".into()))?;
        verify_credential(credential, &key, now)
    }

    /// Hash the claims and attach a proof when a signer is configured.
    fn seal(&self, mut credential: Credential, now: Timestamp) -> Result<Credential, KycError> {
        credential.refresh_content_hash()?;
        credential.proof = match &self.signer {
            Some(signer) => {
                let signature = signer.sign(&credential.canonical_claims()?)?;
                Some(CredentialProof {
                    signer_id: signer.signer_id().to_string(),
                    public_key: signer.public_key(),
                    signature,
                    created_at: now,
                })
            }
            None => None,
        };
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Ed25519Signer;
    use kyc_core::{FlowType, Score, StepSet, VerificationStep};
    use kyc_state::{ApprovalDecision, FlowPlan};

    fn approved_session(subject: &str, score: f64) -> VerificationSession {
        let plan = FlowPlan {
            flow_type: FlowType::FastTrack,
            required_steps: StepSet::from_steps(&[VerificationStep::PreVerification]),
            optional_steps: StepSet::empty(),
            manual_review_forced: false,
            estimated_minutes: 8,
        };
        let mut s = VerificationSession::new(
            SubjectId::new(subject).unwrap(),
            plan,
            Score::new(95.0),
            Score::new(90.0),
        );
        s.identity_integrity_score = Some(Score::new(score));
        s.decide(ApprovalDecision::Pending, ApprovalDecision::AutoApproved, "band")
            .unwrap();
        s
    }

    fn sequenced(subject: &str, score: f64, sequence: u64) -> VerificationSession {
        let mut s = approved_session(subject, score);
        s.sequence = sequence;
        s
    }

    fn signed_issuer() -> CredentialIssuer {
        CredentialIssuer::default()
            .with_signer(Arc::new(Ed25519Signer::from_seed("kyc-issuer", &[3u8; 32])))
    }

    #[test]
    fn unapproved_session_is_refused() {
        let issuer = CredentialIssuer::default();
        let mut s = approved_session("u1", 90.0);
        s.approval_decision = ApprovalDecision::ManualReviewRequired;
        assert!(matches!(
            issuer.issue_or_renew(&s),
            Err(KycError::NotApproved { .. })
        ));
        assert!(issuer.get(&s.subject_id).is_none());
    }

    #[test]
    fn first_issue_creates_signed_credential() {
        let issuer = signed_issuer();
        let s = approved_session("u2", 90.8);
        let receipt = issuer.issue_or_renew(&s).unwrap();
        assert_eq!(receipt.outcome, UpsertOutcome::Created);
        let c = &receipt.credential;
        assert!(c.id.as_str().starts_with("KYC-"));
        assert_eq!(c.revision, 1);
        assert_eq!(c.status, CredentialStatus::Active);
        assert_eq!(c.summary.identity_integrity_score, Score::new(90.8));
        assert_eq!(c.expiry_date, c.issued_at.plus_days(DEFAULT_VALIDITY_DAYS));
        assert_eq!(c.content_hash.len(), 64);
        assert_eq!(
            issuer.verify(c, &Timestamp::now()).unwrap(),
            CredentialVerification::Valid
        );
    }

    #[test]
    fn repeat_by_same_session_is_unchanged() {
        let issuer = CredentialIssuer::default();
        let s = approved_session("u3", 88.0);
        let first = issuer.issue_or_renew(&s).unwrap();
        let second = issuer.issue_or_renew(&s).unwrap();
        assert_eq!(second.outcome, UpsertOutcome::Unchanged);
        assert_eq!(second.credential, first.credential);
    }

    #[test]
    fn new_session_renews_in_place() {
        let issuer = signed_issuer();
        let first = issuer.issue_or_renew(&sequenced("u4", 88.0, 1)).unwrap();
        let s2 = sequenced("u4", 91.0, 2);
        issuer.mark_updating(&s2).unwrap();
        assert_eq!(
            issuer.get(&s2.subject_id).unwrap().status,
            CredentialStatus::Updating
        );

        let renewed = issuer.issue_or_renew(&s2).unwrap();
        assert_eq!(renewed.outcome, UpsertOutcome::Updated);
        assert_eq!(renewed.credential.id, first.credential.id);
        assert_eq!(renewed.credential.issued_at, first.credential.issued_at);
        assert_eq!(renewed.credential.revision, 2);
        assert_eq!(renewed.credential.session_id, s2.id);
        assert_eq!(renewed.credential.status, CredentialStatus::Active);
        assert_eq!(renewed.credential.session_sequence, 2);
        assert_eq!(renewed.credential.reverification_sequence, None);
        assert!(issuer
            .verify(&renewed.credential, &Timestamp::now())
            .unwrap()
            .is_valid());
    }

    #[test]
    fn mark_updating_without_credential_is_none() {
        let issuer = CredentialIssuer::default();
        assert!(issuer
            .mark_updating(&approved_session("nobody", 90.0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn older_session_never_overwrites_newer_renewal() {
        let issuer = signed_issuer();
        let s1 = sequenced("u8", 90.8, 1);
        let s2 = sequenced("u8", 95.5, 2);
        issuer.issue_or_renew(&s1).unwrap();
        let renewed = issuer.issue_or_renew(&s2).unwrap().credential;
        assert_eq!(renewed.revision, 2);

        let stale = issuer.issue_or_renew(&s1).unwrap();
        assert_eq!(stale.outcome, UpsertOutcome::Unchanged);
        assert_eq!(stale.credential, renewed);
        assert_eq!(stale.credential.session_id, s2.id);
        assert_eq!(
            stale.credential.summary.identity_integrity_score,
            Score::new(95.5)
        );
    }

    #[test]
    fn updating_is_kept_until_the_newest_reverification_lands() {
        let issuer = signed_issuer();
        let s1 = sequenced("u9", 88.0, 1);
        issuer.issue_or_renew(&s1).unwrap();
        let s2 = sequenced("u9", 91.0, 2);
        let s3 = sequenced("u9", 93.0, 3);
        issuer.mark_updating(&s2).unwrap();
        issuer.mark_updating(&s3).unwrap();
        // Marking again for an older session does not lower the pending mark.
        let marked = issuer.mark_updating(&s2).unwrap().unwrap();
        assert_eq!(marked.reverification_sequence, Some(3));

        // Neither the original session nor an older re-verification
        // reactivates the credential while s3 is in flight.
        let again = issuer.issue_or_renew(&s1).unwrap();
        assert_eq!(again.outcome, UpsertOutcome::Unchanged);
        assert_eq!(again.credential.status, CredentialStatus::Updating);

        let from_s2 = issuer.issue_or_renew(&s2).unwrap().credential;
        assert_eq!(from_s2.revision, 2);
        assert_eq!(from_s2.session_id, s2.id);
        assert_eq!(from_s2.status, CredentialStatus::Updating);
        assert_eq!(from_s2.reverification_sequence, Some(3));

        let from_s3 = issuer.issue_or_renew(&s3).unwrap().credential;
        assert_eq!(from_s3.revision, 3);
        assert_eq!(from_s3.session_id, s3.id);
        assert_eq!(from_s3.status, CredentialStatus::Active);
        assert_eq!(from_s3.reverification_sequence, None);

        // s2 landing late changes nothing.
        let late = issuer.issue_or_renew(&s2).unwrap();
        assert_eq!(late.outcome, UpsertOutcome::Unchanged);
        assert_eq!(late.credential, from_s3);
    }

    #[test]
    fn revocation_wins_over_issuance() {
        let issuer = signed_issuer();
        let s = approved_session("u5", 90.0);
        issuer.issue_or_renew(&s).unwrap();
        let revoked = issuer.revoke(&s.subject_id, "fraud report", "admin-1").unwrap();
        assert_eq!(revoked.status, CredentialStatus::Revoked);

        let s2 = approved_session("u5", 95.0);
        assert!(matches!(
            issuer.issue_or_renew(&s2),
            Err(KycError::AlreadyRevoked { .. })
        ));
        // Revoked credentials stay revoked when a new session starts.
        let kept = issuer.mark_updating(&s2).unwrap().unwrap();
        assert_eq!(kept.status, CredentialStatus::Revoked);
        assert_eq!(
            issuer.verify(&kept, &Timestamp::now()).unwrap(),
            CredentialVerification::Revoked
        );
        assert!(matches!(
            issuer.revoke(&s.subject_id, "again", "admin-1"),
            Err(KycError::AlreadyRevoked { .. })
        ));
    }

    #[test]
    fn revoke_unknown_subject() {
        let issuer = CredentialIssuer::default();
        assert!(matches!(
            issuer.revoke(&SubjectId::new("ghost").unwrap(), "r", "a"),
            Err(KycError::SubjectNotFound(_))
        ));
    }

    #[test]
    fn verification_detects_expiry_and_tampering() {
        let issuer = signed_issuer();
        let c = issuer
            .issue_or_renew(&approved_session("u6", 90.0))
            .unwrap()
            .credential;
        let later = c.expiry_date.plus_days(1);
        assert_eq!(
            issuer.verify(&c, &later).unwrap(),
            CredentialVerification::Expired
        );

        let mut forged = c.clone();
        forged.summary.aml_cleared = !forged.summary.aml_cleared;
        assert_eq!(
            issuer.verify(&forged, &Timestamp::now()).unwrap(),
            CredentialVerification::Tampered
        );

        let other = Ed25519Signer::generate("other");
        assert!(matches!(
            verify_credential(&c, &other.public_key(), &Timestamp::now()).unwrap(),
            CredentialVerification::BadSignature(_)
        ));
    }

    #[test]
    fn concurrent_issuance_creates_one_credential() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let issuer = CredentialIssuer::new(store.clone());
        let s = approved_session("u7", 90.8);

        let receipts: Vec<IssuanceReceipt> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| issuer.issue_or_renew(&s).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created = receipts
            .iter()
            .filter(|r| r.outcome == UpsertOutcome::Created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
        let id = &receipts[0].credential.id;
        assert!(receipts.iter().all(|r| r.credential.id == *id));
    }
}
