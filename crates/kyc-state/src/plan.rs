//! # Flow Plan
//!
//! The active verification plan of a session: which steps are required,
//! which are optional, and whether manual review is forced. Produced by the
//! adaptive flow selector and carried on the session.

use serde::{Deserialize, Serialize};

use kyc_core::{FlowType, StepSet};

/// Required and optional steps of the active flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowPlan {
    pub flow_type: FlowType,
    pub required_steps: StepSet,
    pub optional_steps: StepSet,
    pub manual_review_forced: bool,
    pub estimated_minutes: u32,
}

impl FlowPlan {
    /// Required steps that callers submit.
    pub fn required_evidence(&self) -> StepSet {
        self.required_steps.evidence()
    }
}
