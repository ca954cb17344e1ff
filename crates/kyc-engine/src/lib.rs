//! # kyc-engine: Verification Orchestration
//!
//! - **Orchestrator** (`orchestrator.rs`): [`StepOrchestrator`] drives a
//!   session through the ten verification steps, takes the decision and
//!   hands off to manual review or credential issuance.
//! - **Payloads** (`payload.rs`): per-step evidence and its canonical digest.
//! - **Collaborators** (`collaborators.rs`): document analysis, biometrics,
//!   AML screening and behavioral scoring as capability traits, with
//!   static and heuristic implementations.
//! - **Ports** (`ports.rs`): session repository, evidence store and audit
//!   sink traits. In-memory implementations live in `memory.rs` and
//!   `audit.rs`.
//! - **Config** (`config.rs`): YAML engine configuration.
//!
//! ## Concurrency
//!
//! Every session write is a compare-and-set on the session version.
//! Collaborators are consulted before the write, never while holding it.

pub mod audit;
pub mod collaborators;
pub mod config;
pub mod memory;
pub mod orchestrator;
pub mod payload;
pub mod ports;

pub use audit::{MemoryAuditSink, TracingAuditSink};
pub use collaborators::{
    AmlResult, AmlScreener, AmlSubject, BehavioralAnalyzer, BehavioralAssessment,
    BehavioralSignals, BiometricAnalysis, BiometricRequest, BiometricVerifier, CollaboratorError,
    Collaborators, DocumentAnalysis, DocumentAnalyzer, FieldActivity, HeuristicBehavioralAnalyzer,
    Keystroke, PointerSample, StaticAmlScreener, StaticBehavioralAnalyzer,
    StaticBiometricVerifier, StaticDocumentAnalyzer, Unconfigured,
};
pub use config::{CredentialConfig, EngineConfig, OrchestratorConfig, CONFIG_PATH_ENV};
pub use memory::{InMemoryEvidenceStore, InMemorySessionRepository};
pub use orchestrator::{OrchestratorBuilder, StatusView, StepOrchestrator, StepReceipt, StepView};
pub use payload::{DocumentSubmission, StepPayload};
pub use ports::{
    AuditAction, AuditEvent, AuditSink, CasOutcome, CredentialStore, EvidenceStore,
    ReviewQueueStore, SessionRepository, SnapshotLog,
};
