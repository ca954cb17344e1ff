//! # Step Payloads
//!
//! One variant per evidence step. The payload digest (SHA-256 over the
//! canonical bytes) is what makes step completion idempotent: an identical
//! resubmission hashes identically regardless of field order or whitespace.
//!
//! Payloads carry only references and integers, never floats, so they always
//! canonicalize.

use serde::{Deserialize, Serialize};

use kyc_core::{sha256_hex, CanonicalBytes, DocumentCategory, KycError, VerificationStep};

use crate::collaborators::BehavioralSignals;

/// A document handed in at upload or address verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSubmission {
    pub category: DocumentCategory,
    pub document_type: String,
    pub artifact_ref: String,
}

/// Evidence submitted for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepPayload {
    PreVerification {
        consent_given: bool,
        #[serde(default)]
        behavioral: Option<BehavioralSignals>,
    },
    DocumentUpload {
        documents: Vec<DocumentSubmission>,
    },
    /// Analyze the named document artifacts, or every unanalyzed document
    /// when `document_refs` is empty.
    DocumentAnalysis {
        #[serde(default)]
        document_refs: Vec<String>,
    },
    FaceVerification {
        selfie_ref: String,
        #[serde(default)]
        reference_ref: Option<String>,
        #[serde(default)]
        liveness_frames: Vec<String>,
    },
    AddressVerification {
        documents: Vec<DocumentSubmission>,
    },
    VideoVerification {
        video_ref: String,
        #[serde(default)]
        liveness_frames: Vec<String>,
    },
    AmlScreening {
        full_name: String,
        #[serde(default)]
        date_of_birth: Option<String>,
        #[serde(default)]
        nationality: Option<String>,
    },
}

impl StepPayload {
    /// The evidence step this payload completes.
    pub fn step(&self) -> VerificationStep {
        match self {
            Self::PreVerification { .. } => VerificationStep::PreVerification,
            Self::DocumentUpload { .. } => VerificationStep::DocumentUpload,
            Self::DocumentAnalysis { .. } => VerificationStep::DocumentAnalysis,
            Self::FaceVerification { .. } => VerificationStep::FaceVerification,
            Self::AddressVerification { .. } => VerificationStep::AddressVerification,
            Self::VideoVerification { .. } => VerificationStep::VideoVerification,
            Self::AmlScreening { .. } => VerificationStep::AmlScreening,
        }
    }

    /// Check that the payload is for `step` and is well formed.
    pub fn validate_for(&self, step: VerificationStep) -> Result<(), KycError> {
        if self.step() != step {
            return Err(KycError::invalid_transition(
                step,
                self.step(),
                format!("payload is for step {} but was submitted for {step}", self.step()),
            ));
        }
        let reject = |reason: String| Err(KycError::invalid_transition("pending", step, reason));
        match self {
            Self::PreVerification { consent_given, .. } if !consent_given => {
                reject("consent was not given".into())
            }
            Self::DocumentUpload { documents } => {
                if documents.is_empty() {
                    return reject("no documents submitted".into());
                }
                check_documents(documents).or_else(reject)
            }
            Self::AddressVerification { documents } => {
                if documents.is_empty() {
                    return reject("no address documents submitted".into());
                }
                if let Some(doc) = documents
                    .iter()
                    .find(|d| d.category != DocumentCategory::AddressProof)
                {
                    return reject(format!(
                        "address verification accepts address_proof only, got {}",
                        doc.category
                    ));
                }
                check_documents(documents).or_else(reject)
            }
            Self::FaceVerification { selfie_ref, .. } if selfie_ref.trim().is_empty() => {
                reject("selfie reference is empty".into())
            }
            Self::VideoVerification { video_ref, .. } if video_ref.trim().is_empty() => {
                reject("video reference is empty".into())
            }
            Self::AmlScreening { full_name, .. } if full_name.trim().is_empty() => {
                reject("full name is empty".into())
            }
            _ => Ok(()),
        }
    }

    /// Hex SHA-256 over the canonical form.
    pub fn digest(&self) -> Result<String, KycError> {
        Ok(sha256_hex(&CanonicalBytes::new(self)?))
    }
}

fn check_documents(documents: &[DocumentSubmission]) -> Result<(), String> {
    for category in DocumentCategory::all() {
        let count = documents.iter().filter(|d| d.category == *category).count();
        if count > DocumentCategory::MAX_FILES_PER_CATEGORY {
            return Err(format!(
                "{count} files for {category} exceeds the limit of {}",
                DocumentCategory::MAX_FILES_PER_CATEGORY
            ));
        }
    }
    if let Some(doc) = documents.iter().find(|d| d.artifact_ref.trim().is_empty()) {
        return Err(format!("empty artifact reference for {}", doc.category));
    }
    Ok(())
}
