//! # Verification Domain Enums
//!
//! Closed vocabularies shared by every crate: risk bands, flow types and
//! document categories. Each enum serializes as snake_case and parses back
//! through `FromStr` with the same identifiers.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::KycError;

// ─── Risk level ─────────────────────────────────────────────────────

/// Coarse risk band derived from a [0,100] trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Flow type ──────────────────────────────────────────────────────

/// Verification flow band.
///
/// Variants are declared in escalation order, so `Ord` answers "is this flow
/// stricter than that one". Flows only ever move upward within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    FastTrack,
    Standard,
    DeepVerification,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastTrack => "fast_track",
            Self::Standard => "standard",
            Self::DeepVerification => "deep_verification",
        }
    }

    /// The risk level a flow band corresponds to.
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            Self::FastTrack => RiskLevel::Low,
            Self::Standard => RiskLevel::Medium,
            Self::DeepVerification => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowType {
    type Err = KycError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast_track" => Ok(Self::FastTrack),
            "standard" => Ok(Self::Standard),
            "deep_verification" => Ok(Self::DeepVerification),
            other => Err(KycError::Config(format!("unknown flow type: {other:?}"))),
        }
    }
}

// ─── Document category ──────────────────────────────────────────────

/// Category of a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    IdentityProof,
    AddressProof,
    AgeProof,
    PhotoBiometric,
    IncomeEmployment,
    Educational,
    FinancialRisk,
    Supporting,
}

/// Number of document categories.
pub const DOCUMENT_CATEGORY_COUNT: usize = 8;

impl DocumentCategory {
    /// Maximum artifacts accepted per category in one upload.
    pub const MAX_FILES_PER_CATEGORY: usize = 5;

    pub fn all() -> &'static [DocumentCategory; DOCUMENT_CATEGORY_COUNT] {
        &[
            Self::IdentityProof,
            Self::AddressProof,
            Self::AgeProof,
            Self::PhotoBiometric,
            Self::IncomeEmployment,
            Self::Educational,
            Self::FinancialRisk,
            Self::Supporting,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityProof => "identity_proof",
            Self::AddressProof => "address_proof",
            Self::AgeProof => "age_proof",
            Self::PhotoBiometric => "photo_biometric",
            Self::IncomeEmployment => "income_employment",
            Self::Educational => "educational",
            Self::FinancialRisk => "financial_risk",
            Self::Supporting => "supporting",
        }
    }

    /// Whether onboarding regulations treat this category as mandatory.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            Self::IdentityProof | Self::AddressProof | Self::AgeProof | Self::PhotoBiometric
        )
    }
}

impl std::fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = KycError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| KycError::Config(format!("unknown document category: {s:?}")))
    }
}
