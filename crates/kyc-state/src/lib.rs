//! # kyc-state: Verification State Machines
//!
//! Validated-enum state machines for the verification engine.
//!
//! - **Session** (`session.rs`): the step table, lifecycle status, CAS
//!   approval decision, anomaly flags and transition log of one
//!   verification attempt.
//! - **Plan** (`plan.rs`): the active flow's required / optional steps.
//! - **Records** (`records.rs`): analyzed documents and biometric captures.
//!
//! Every transition method returns `Result` and records the change in the
//! session's transition log. Terminal sessions reject every mutation.

pub mod plan;
pub mod records;
pub mod session;

pub use plan::FlowPlan;
pub use records::{AnalysisStatus, BiometricRecord, DocumentRecord};
pub use session::{
    Anomaly, AnomalyKind, ApprovalDecision, BiometricSignals, SessionError, SessionStatus,
    SessionTransitionRecord, StepEntry, StepStatus, StepTable, Submission, TransitionScope,
    VerificationSession,
};
