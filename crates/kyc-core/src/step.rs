//! # Verification Steps
//!
//! The canonical 10-step sequence of a verification session and a compact
//! set type over it.
//!
//! Steps 0–6 are **evidence steps**: callers submit them with a payload.
//! Steps 7–9 are **system steps**: the orchestrator completes or skips them
//! during the decision phase and never accepts them from callers.
//!
//! Arrival order is not numeric order. Eligibility is governed by
//! [`VerificationStep::prerequisites`] intersected with the active flow's
//! required set.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::KycError;

/// Number of steps in the canonical sequence.
pub const STEP_COUNT: usize = 10;

/// One step of the verification sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStep {
    PreVerification = 0,
    DocumentUpload = 1,
    DocumentAnalysis = 2,
    FaceVerification = 3,
    AddressVerification = 4,
    VideoVerification = 5,
    AmlScreening = 6,
    RiskScoring = 7,
    ReportGeneration = 8,
    CredentialIssuance = 9,
}

impl VerificationStep {
    /// All steps in canonical order.
    pub const ALL: [VerificationStep; STEP_COUNT] = [
        Self::PreVerification,
        Self::DocumentUpload,
        Self::DocumentAnalysis,
        Self::FaceVerification,
        Self::AddressVerification,
        Self::VideoVerification,
        Self::AmlScreening,
        Self::RiskScoring,
        Self::ReportGeneration,
        Self::CredentialIssuance,
    ];

    /// Position in the canonical sequence.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreVerification => "pre_verification",
            Self::DocumentUpload => "document_upload",
            Self::DocumentAnalysis => "document_analysis",
            Self::FaceVerification => "face_verification",
            Self::AddressVerification => "address_verification",
            Self::VideoVerification => "video_verification",
            Self::AmlScreening => "aml_screening",
            Self::RiskScoring => "risk_scoring",
            Self::ReportGeneration => "report_generation",
            Self::CredentialIssuance => "credential_issuance",
        }
    }

    /// Caller-submitted step.
    pub fn is_evidence(self) -> bool {
        self.index() <= Self::AmlScreening.index()
    }

    /// Orchestrator-driven step.
    pub fn is_system(self) -> bool {
        !self.is_evidence()
    }

    /// Steps that must be completed first, when the active flow requires them.
    pub fn prerequisites(self) -> StepSet {
        use VerificationStep::*;
        match self {
            PreVerification => StepSet::empty(),
            DocumentUpload | AmlScreening => StepSet::from_steps(&[PreVerification]),
            DocumentAnalysis | FaceVerification | AddressVerification => {
                StepSet::from_steps(&[DocumentUpload])
            }
            VideoVerification => StepSet::from_steps(&[FaceVerification]),
            RiskScoring | ReportGeneration | CredentialIssuance => StepSet::empty(),
        }
    }
}

impl std::fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStep {
    type Err = KycError;

    /// Accepts either the snake_case name or the numeric index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<usize>() {
            return Self::from_index(index)
                .ok_or_else(|| KycError::InvalidIdentifier(format!("step index out of range: {index}")));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| KycError::InvalidIdentifier(format!("unknown verification step: {s:?}")))
    }
}

// ─── StepSet ────────────────────────────────────────────────────────

/// A set of verification steps, stored as a bitmask.
///
/// Serializes as an ordered list of step names so snapshots and reports
/// read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StepSet(u16);

impl StepSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self((1u16 << STEP_COUNT) - 1)
    }

    pub fn from_steps(steps: &[VerificationStep]) -> Self {
        steps.iter().fold(Self::empty(), |set, s| set.with(*s))
    }

    pub fn with(mut self, step: VerificationStep) -> Self {
        self.insert(step);
        self
    }

    pub fn insert(&mut self, step: VerificationStep) {
        self.0 |= 1 << step.index();
    }

    pub fn remove(&mut self, step: VerificationStep) {
        self.0 &= !(1 << step.index());
    }

    pub fn contains(&self, step: VerificationStep) -> bool {
        self.0 & (1 << step.index()) != 0
    }

    pub fn union(&self, other: &StepSet) -> StepSet {
        Self(self.0 | other.0)
    }

    pub fn intersection(&self, other: &StepSet) -> StepSet {
        Self(self.0 & other.0)
    }

    pub fn difference(&self, other: &StepSet) -> StepSet {
        Self(self.0 & !other.0)
    }

    pub fn is_subset(&self, other: &StepSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate members in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = VerificationStep> + '_ {
        VerificationStep::ALL
            .iter()
            .copied()
            .filter(move |s| self.contains(*s))
    }

    /// Members that are evidence steps.
    pub fn evidence(&self) -> StepSet {
        Self(self.0 & 0b00_0111_1111)
    }

    /// Lowest member, if any.
    pub fn first(&self) -> Option<VerificationStep> {
        self.iter().next()
    }
}

impl FromIterator<VerificationStep> for StepSet {
    fn from_iter<I: IntoIterator<Item = VerificationStep>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |set, s| set.with(s))
    }
}

impl Serialize for StepSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for StepSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let steps = Vec::<VerificationStep>::deserialize(deserializer)?;
        Ok(steps.into_iter().collect())
    }
}

impl std::fmt::Display for StepSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indices: Vec<String> = self.iter().map(|s| s.index().to_string()).collect();
        write!(f, "{{{}}}", indices.join(","))
    }
}
