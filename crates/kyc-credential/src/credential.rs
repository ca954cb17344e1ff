//! # KYC Credential
//!
//! The long-lived record that a subject passed verification. There is at
//! most one credential per subject; re-verification renews it in place.
//!
//! ## States
//!
//! ```text
//! Active ──▶ Updating ──▶ Active   (re-verification in flight, then renewed)
//!   │           │
//!   └───────────┴──▶ Revoked (terminal, administrative)
//! ```
//!
//! ## Security Invariant
//!
//! The content hash and proof cover [`CredentialClaims`], whose scores are
//! integer basis points. The same credential data always produces the same
//! canonical bytes.

use serde::{Deserialize, Serialize};

use kyc_core::{
    sha256_hex, CanonicalBytes, CredentialId, KycError, RiskLevel, Score, SessionId, SubjectId,
    Timestamp, VerificationStep,
};
use kyc_state::{StepStatus, VerificationSession};

use crate::signing::{verify_signature, PublicKey, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    /// A re-verification session is in flight. The credential stays usable.
    Updating,
    Revoked,
}

impl std::fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Updating => "UPDATING",
            Self::Revoked => "REVOKED",
        };
        f.write_str(s)
    }
}

/// What the issuing session established.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub identity_integrity_score: Score,
    pub document_verified: bool,
    pub face_verified: bool,
    pub address_verified: bool,
    pub aml_cleared: bool,
    pub risk_level: RiskLevel,
}

impl VerificationSummary {
    pub fn from_session(session: &VerificationSession) -> Self {
        let completed = |step| session.steps.status(step) == StepStatus::Completed;
        Self {
            identity_integrity_score: session.identity_integrity_score.unwrap_or(Score::MIN),
            document_verified: completed(VerificationStep::DocumentAnalysis),
            face_verified: completed(VerificationStep::FaceVerification),
            address_verified: completed(VerificationStep::AddressVerification),
            aml_cleared: completed(VerificationStep::AmlScreening) && !session.sanctions_hit,
            risk_level: session.risk_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialProof {
    pub signer_id: String,
    pub public_key: PublicKey,
    pub signature: Signature,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationRecord {
    pub reason: String,
    pub actor: String,
    pub revoked_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub subject_id: SubjectId,
    pub issued_at: Timestamp,
    pub expiry_date: Timestamp,
    pub updated_at: Timestamp,
    pub status: CredentialStatus,
    /// The session that last issued or renewed this credential.
    pub session_id: SessionId,
    /// Creation sequence of `session_id`. Sessions with a lower sequence
    /// never renew this credential.
    #[serde(default)]
    pub session_sequence: u64,
    /// Newest session re-verifying the subject while `updating`.
    #[serde(default)]
    pub reverification_sequence: Option<u64>,
    pub summary: VerificationSummary,
    /// Starts at 1; incremented on every renewal.
    pub revision: u64,
    /// Hex SHA-256 of the canonical claims.
    pub content_hash: String,
    pub proof: Option<CredentialProof>,
    pub revocation: Option<RevocationRecord>,
}

/// Signed content of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialClaims {
    pub credential_id: String,
    pub subject_id: String,
    pub session_id: String,
    pub issued_at: String,
    pub expiry_date: String,
    pub revision: u64,
    pub identity_integrity_bp: u32,
    pub document_verified: bool,
    pub face_verified: bool,
    pub address_verified: bool,
    pub aml_cleared: bool,
    pub risk_level: RiskLevel,
}

impl Credential {
    pub fn claims(&self) -> CredentialClaims {
        CredentialClaims {
            credential_id: self.id.to_string(),
            subject_id: self.subject_id.to_string(),
            session_id: self.session_id.to_string(),
            issued_at: self.issued_at.to_iso8601(),
            expiry_date: self.expiry_date.to_iso8601(),
            revision: self.revision,
            identity_integrity_bp: self.summary.identity_integrity_score.to_basis_points(),
            document_verified: self.summary.document_verified,
            face_verified: self.summary.face_verified,
            address_verified: self.summary.address_verified,
            aml_cleared: self.summary.aml_cleared,
            risk_level: self.summary.risk_level,
        }
    }

    pub fn canonical_claims(&self) -> Result<CanonicalBytes, KycError> {
        Ok(CanonicalBytes::new(&self.claims())?)
    }

    /// Recompute `content_hash` from the current claims.
    pub fn refresh_content_hash(&mut self) -> Result<(), KycError> {
        self.content_hash = sha256_hex(&self.canonical_claims()?);
        Ok(())
    }

    pub fn is_revoked(&self) -> bool {
        self.status == CredentialStatus::Revoked
    }

    pub fn is_expired(&self, now: &Timestamp) -> bool {
        *now >= self.expiry_date
    }
}

// ─── Verification ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "detail")]
pub enum CredentialVerification {
    Valid,
    Revoked,
    Expired,
    /// The stored content hash does not match the claims.
    Tampered,
    /// Missing proof, foreign key, or signature mismatch.
    BadSignature(String),
}

impl CredentialVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Check a credential against `public_key` as of `now`.
///
/// Revocation is reported before expiry, and both before any integrity
/// check. An `updating` credential remains valid.
pub fn verify_credential(
    credential: &Credential,
    public_key: &PublicKey,
    now: &Timestamp,
) -> Result<CredentialVerification, KycError> {
    if credential.is_revoked() {
        return Ok(CredentialVerification::Revoked);
    }
    if credential.is_expired(now) {
        return Ok(CredentialVerification::Expired);
    }
    let claims = credential.canonical_claims()?;
    if sha256_hex(&claims) != credential.content_hash {
        return Ok(CredentialVerification::Tampered);
    }
    let Some(proof) = &credential.proof else {
        return Ok(CredentialVerification::BadSignature("credential carries no proof".into()));
    };
    if proof.public_key != *public_key {
        return Ok(CredentialVerification::BadSignature(format!(
            "proof was made by {} not the expected key",
            proof.signer_id
        )));
    }
    Ok(match verify_signature(&claims, &proof.signature, public_key) {
        Ok(()) => CredentialVerification::Valid,
        Err(e) => CredentialVerification::BadSignature(e.to_string()),
    })
}
