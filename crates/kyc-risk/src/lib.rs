//! # kyc-risk: Scoring, Flow Selection and Explanations
//!
//! - **Engine** (`engine.rs`): weighted identity integrity aggregate and
//!   decision bands, with an append-only snapshot per computation.
//! - **Snapshot log** (`snapshot.rs`): persistence port and in-memory store
//!   for snapshots.
//! - **Drift** (`drift.rs`): approval rate comparison across time windows
//!   over the snapshot log.
//! - **Flow** (`flow.rs`): fast track / standard / deep verification
//!   selection and upward-only re-evaluation.
//! - **Initial** (`initial.rs`): pre-evidence device and account heuristics.
//! - **Explain** (`explain.rs`): decision traces and verification reports.
//!
//! Nothing in this crate mutates a session. The orchestrator applies the
//! results.

pub mod drift;
pub mod engine;
pub mod explain;
pub mod flow;
pub mod initial;
pub mod snapshot;

pub use drift::{
    approval_rate_drift, ApprovalWindow, DriftReport, DEFAULT_DRIFT_WINDOW_DAYS,
    DRIFT_THRESHOLD_PERCENT,
};
pub use engine::{
    DecisionBand, DecisionThresholds, ResolvedComponent, RiskComputation, RiskConfig,
    RiskScoreEngine, RiskScoreSnapshot, RiskWeights,
};
pub use explain::{
    explain_biometric, explain_decision, explain_document, BiometricExplanation, Confidence,
    Contribution, DecisionTrace, DocumentExplanation, Quality, Verdict, VerificationReport,
};
pub use flow::{AdaptiveFlowSelector, FlowConfig, Penalty, PenaltyConfig, Reevaluation};
pub use initial::{assess_initial_risk, device_trust, DeviceContext, InitialAssessment};
pub use snapshot::{InMemorySnapshotLog, SnapshotLog};
