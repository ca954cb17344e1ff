//! # Error Types: Structured Error Hierarchy
//!
//! Defines the caller-facing error taxonomy of the verification engine.
//! All errors use `thiserror`.
//!
//! ## Design
//!
//! - Only orchestrator-contract violations surface as errors. Collaborator
//!   outages are absorbed into anomaly flags and never reach this type.
//! - Concurrent credential issuance is resolved by the atomic upsert; the
//!   losing caller receives the existing credential, so there is no
//!   "conflict" variant here.
//! - State machine errors carry the current state, the attempted target and
//!   the rejection reason.

use thiserror::Error;

/// Top-level error type for the KYC engine.
#[derive(Error, Debug)]
pub enum KycError {
    /// No session exists with the given identifier.
    #[error("verification session not found: {0}")]
    SessionNotFound(String),

    /// No subject or credential exists for the given subject identifier.
    #[error("subject not found: {0}")]
    SubjectNotFound(String),

    /// No review task exists with the given identifier.
    #[error("review not found: {0}")]
    ReviewNotFound(String),

    /// A state transition was rejected.
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// Current state (or step status) name.
        from: String,
        /// Attempted target state (or step) name.
        to: String,
        /// Reason the transition was rejected.
        reason: String,
    },

    /// Credential issuance attempted before an approving decision.
    #[error("session {session} is not approved for credential issuance (decision: {decision})")]
    NotApproved {
        /// The session that was asked to issue.
        session: String,
        /// The decision it carries.
        decision: String,
    },

    /// The subject's credential was revoked by an administrator.
    #[error("credential {credential} for subject {subject} has been revoked")]
    AlreadyRevoked {
        /// The revoked credential.
        credential: String,
        /// The subject it belongs to.
        subject: String,
    },

    /// An identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A timestamp string was not RFC 3339 UTC.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Configuration is malformed or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// The persistence port failed or write contention was not resolved.
    #[error("storage error: {0}")]
    Storage(String),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl KycError {
    /// Convenience constructor for [`KycError::InvalidTransition`].
    pub fn invalid_transition(
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Scores enter digests as integer basis points.
    #[error("float values are not permitted in canonical representations; use integer basis points: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    /// Key generation or parsing failed.
    #[error("key error: {0}")]
    KeyError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display_carries_context() {
        let err = KycError::invalid_transition("COMPLETED", "document_analysis", "payload differs");
        assert_eq!(
            err.to_string(),
            "invalid transition from COMPLETED to document_analysis: payload differs"
        );
    }

    #[test]
    fn canonicalization_error_converts() {
        let err: KycError = CanonicalizationError::FloatRejected(1.5).into();
        assert!(matches!(err, KycError::Canonicalization(_)));
    }
}
