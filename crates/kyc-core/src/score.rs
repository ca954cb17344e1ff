//! # Scores
//!
//! `Score` is a trust score in [0, 100]. Out-of-range and NaN inputs are
//! clamped at construction, so every aggregate computed from scores is
//! bounded without further checks.
//!
//! Scores are floats and therefore never enter canonical bytes directly;
//! [`Score::to_basis_points`] gives the integer form used in digests and
//! credential claims.

use serde::{Deserialize, Serialize};

/// Value substituted for a component that has not been measured or whose
/// collaborator was unavailable.
pub const NEUTRAL_SCORE: f64 = 70.0;

/// A trust score clamped to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    pub const MIN: Score = Score(0.0);
    pub const MAX: Score = Score(100.0);
    pub const NEUTRAL: Score = Score(NEUTRAL_SCORE);

    /// Clamp `value` into [0, 100]. NaN maps to 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 100.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Score in hundredths of a point (0..=10_000), rounded half away from zero.
    pub fn to_basis_points(&self) -> u32 {
        (self.0 * 100.0).round() as u32
    }

    pub fn from_basis_points(bp: u32) -> Self {
        Self::new(f64::from(bp) / 100.0)
    }

    /// Complement on the 0..100 scale (`100 - self`).
    pub fn inverted(&self) -> Self {
        Self::new(100.0 - self.0)
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Score::new(f64::deserialize(deserializer)?))
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ─── Components ─────────────────────────────────────────────────────

/// The five weighted inputs of the identity integrity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreComponent {
    DocumentAuthenticity,
    BiometricMatch,
    DeviceTrust,
    AmlClearance,
    BehavioralTrust,
}

impl ScoreComponent {
    pub const ALL: [ScoreComponent; 5] = [
        Self::DocumentAuthenticity,
        Self::BiometricMatch,
        Self::DeviceTrust,
        Self::AmlClearance,
        Self::BehavioralTrust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentAuthenticity => "document_authenticity",
            Self::BiometricMatch => "biometric_match",
            Self::DeviceTrust => "device_trust",
            Self::AmlClearance => "aml_clearance",
            Self::BehavioralTrust => "behavioral_trust",
        }
    }
}

impl std::fmt::Display for ScoreComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured component scores of a session. `None` means not yet measured.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub document_authenticity: Option<Score>,
    pub biometric_match: Option<Score>,
    pub device_trust: Option<Score>,
    pub aml_clearance: Option<Score>,
    pub behavioral_trust: Option<Score>,
}

impl ComponentScores {
    pub fn get(&self, component: ScoreComponent) -> Option<Score> {
        match component {
            ScoreComponent::DocumentAuthenticity => self.document_authenticity,
            ScoreComponent::BiometricMatch => self.biometric_match,
            ScoreComponent::DeviceTrust => self.device_trust,
            ScoreComponent::AmlClearance => self.aml_clearance,
            ScoreComponent::BehavioralTrust => self.behavioral_trust,
        }
    }

    pub fn set(&mut self, component: ScoreComponent, score: Score) {
        let slot = match component {
            ScoreComponent::DocumentAuthenticity => &mut self.document_authenticity,
            ScoreComponent::BiometricMatch => &mut self.biometric_match,
            ScoreComponent::DeviceTrust => &mut self.device_trust,
            ScoreComponent::AmlClearance => &mut self.aml_clearance,
            ScoreComponent::BehavioralTrust => &mut self.behavioral_trust,
        };
        *slot = Some(score);
    }

    /// Components that have no measured value.
    pub fn missing(&self) -> Vec<ScoreComponent> {
        ScoreComponent::ALL
            .iter()
            .copied()
            .filter(|c| self.get(*c).is_none())
            .collect()
    }

    /// Builder-style setter, convenient in tests and fixtures.
    pub fn with(mut self, component: ScoreComponent, value: f64) -> Self {
        self.set(component, Score::new(value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(Score::new(-5.0).value(), 0.0);
        assert_eq!(Score::new(130.0).value(), 100.0);
        assert_eq!(Score::new(f64::NAN).value(), 0.0);
        assert_eq!(Score::new(f64::INFINITY).value(), 100.0);
    }

    #[test]
    fn basis_points() {
        assert_eq!(Score::new(90.8).to_basis_points(), 9080);
        assert_eq!(Score::new(84.999).to_basis_points(), 8500);
        assert_eq!(Score::MAX.to_basis_points(), 10_000);
        assert_eq!(Score::from_basis_points(7525).value(), 75.25);
    }

    #[test]
    fn deserialize_clamps() {
        let s: Score = serde_json::from_str("250").unwrap();
        assert_eq!(s, Score::MAX);
    }

    #[test]
    fn component_scores_get_set_missing() {
        let scores = ComponentScores::default()
            .with(ScoreComponent::DocumentAuthenticity, 90.0)
            .with(ScoreComponent::DeviceTrust, 88.0);
        assert_eq!(scores.get(ScoreComponent::DeviceTrust), Some(Score::new(88.0)));
        assert_eq!(
            scores.missing(),
            vec![
                ScoreComponent::BiometricMatch,
                ScoreComponent::AmlClearance,
                ScoreComponent::BehavioralTrust
            ]
        );
    }

    #[test]
    fn inverted_is_complement() {
        assert_eq!(Score::new(30.0).inverted(), Score::new(70.0));
    }
}
