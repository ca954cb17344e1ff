//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::sync::Arc;

use kyc_core::{DocumentCategory, SessionId, VerificationStep};
use kyc_credential::{Ed25519Signer, InMemoryCredentialStore};
use kyc_engine::{
    BehavioralSignals, Collaborators, DocumentSubmission, MemoryAuditSink, StaticAmlScreener,
    InMemorySessionRepository, OrchestratorBuilder, StaticBehavioralAnalyzer,
    StaticBiometricVerifier, StaticDocumentAnalyzer, StepOrchestrator, StepPayload,
};
use kyc_risk::DeviceContext;

/// A device with verified contact channels and the given fingerprint trust.
pub fn device(fingerprint_trust: u8) -> DeviceContext {
    DeviceContext {
        fingerprint_trust: Some(fingerprint_trust),
        email_verified: true,
        phone_verified: true,
        ..Default::default()
    }
}

pub fn collaborators(document: f64, biometric: f64, aml: f64, behavioral: f64) -> Collaborators {
    Collaborators::default()
        .with_documents(Arc::new(StaticDocumentAnalyzer::new(document)))
        .with_biometrics(Arc::new(StaticBiometricVerifier::uniform(biometric)))
        .with_aml(Arc::new(StaticAmlScreener::clear(aml)))
        .with_behavior(Arc::new(StaticBehavioralAnalyzer::new(behavioral)))
}

/// Stores shared between orchestrators, so a second orchestrator sees the
/// sessions and credentials the first one wrote.
pub struct Harness {
    pub sessions: Arc<InMemorySessionRepository>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub signer: Arc<Ed25519Signer>,
    pub audit: MemoryAuditSink,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionRepository::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
            signer: Arc::new(Ed25519Signer::from_seed("kyc-test", &[7u8; 32])),
            audit: MemoryAuditSink::new(),
        }
    }

    pub fn builder(&self, collaborators: Collaborators) -> OrchestratorBuilder {
        StepOrchestrator::builder()
            .sessions(self.sessions.clone())
            .credentials(self.credentials.clone())
            .signer(self.signer.clone())
            .audit(Arc::new(self.audit.clone()))
            .collaborators(collaborators)
    }

    pub fn orchestrator(&self, collaborators: Collaborators) -> StepOrchestrator {
        self.builder(collaborators)
            .build()
            .expect("default configuration is valid")
    }
}

pub fn pre() -> StepPayload {
    StepPayload::PreVerification {
        consent_given: true,
        behavioral: Some(BehavioralSignals::default()),
    }
}

pub fn aml(name: &str) -> StepPayload {
    StepPayload::AmlScreening {
        full_name: name.to_string(),
        date_of_birth: Some("1990-01-01".into()),
        nationality: Some("GB".into()),
    }
}

pub fn upload(artifact: &str) -> StepPayload {
    StepPayload::DocumentUpload {
        documents: vec![DocumentSubmission {
            category: DocumentCategory::IdentityProof,
            document_type: "passport".into(),
            artifact_ref: artifact.to_string(),
        }],
    }
}

pub fn analysis() -> StepPayload {
    StepPayload::DocumentAnalysis {
        document_refs: vec![],
    }
}

pub fn face(selfie: &str) -> StepPayload {
    StepPayload::FaceVerification {
        selfie_ref: selfie.to_string(),
        reference_ref: None,
        liveness_frames: vec![format!("{selfie}#frame-1")],
    }
}

pub fn address(artifact: &str) -> StepPayload {
    StepPayload::AddressVerification {
        documents: vec![DocumentSubmission {
            category: DocumentCategory::AddressProof,
            document_type: "utility_bill".into(),
            artifact_ref: artifact.to_string(),
        }],
    }
}

pub fn video(artifact: &str) -> StepPayload {
    StepPayload::VideoVerification {
        video_ref: artifact.to_string(),
        liveness_frames: vec![],
    }
}

/// Fast-track evidence in the order 0, 6, 1, 2, 3. The face step is last so
/// the decision is taken on it.
pub fn fast_track_steps(tag: &str) -> Vec<(VerificationStep, StepPayload)> {
    vec![
        (VerificationStep::PreVerification, pre()),
        (VerificationStep::AmlScreening, aml(&format!("Subject {tag}"))),
        (VerificationStep::DocumentUpload, upload(&format!("blob://{tag}/passport"))),
        (VerificationStep::DocumentAnalysis, analysis()),
        (VerificationStep::FaceVerification, face(&format!("blob://{tag}/selfie"))),
    ]
}

pub fn submit_all(
    orchestrator: &StepOrchestrator,
    session_id: &SessionId,
    steps: Vec<(VerificationStep, StepPayload)>,
) {
    for (step, payload) in steps {
        orchestrator
            .complete_step(session_id, step, payload)
            .unwrap_or_else(|e| panic!("step {step} rejected: {e}"));
    }
}
