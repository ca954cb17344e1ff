//! # kyc-core: Foundational Types for the KYC Engine
//!
//! Every other crate in the workspace depends on `kyc-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One canonical identifier per namespace.** `SubjectId`, `SessionId`,
//!    `CredentialId`, `ReviewId` are newtypes. A subject is always a
//!    validated `SubjectId`, never "sometimes a string, sometimes a reference".
//!
//! 2. **Fixed step vocabulary.** `VerificationStep` is a 10-variant enum and
//!    `StepSet` a bitset over it. Step tables are arrays indexed by the enum,
//!    so the key set cannot drift.
//!
//! 3. **Bounded scores.** `Score` is clamped to [0, 100] at construction.
//!
//! 4. **`CanonicalBytes` for every digest.** Payload idempotency, snapshot
//!    digests and credential hashes all flow through `CanonicalBytes::new()`.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `kyc-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod domain;
pub mod error;
pub mod identity;
pub mod score;
pub mod step;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use domain::{DocumentCategory, FlowType, RiskLevel, DOCUMENT_CATEGORY_COUNT};
pub use error::{CanonicalizationError, CryptoError, KycError};
pub use identity::{
    BiometricId, CredentialId, DocumentId, ReviewId, SessionId, SnapshotId, SubjectId,
};
pub use score::{ComponentScores, Score, ScoreComponent, NEUTRAL_SCORE};
pub use step::{StepSet, VerificationStep, STEP_COUNT};
pub use temporal::Timestamp;
