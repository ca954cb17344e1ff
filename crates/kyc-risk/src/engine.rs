//! # Risk Score Engine
//!
//! Combines the five component scores of a session into the identity
//! integrity score and maps it onto a decision band.
//!
//! ```text
//! integrity = 0.35·document + 0.30·biometric + 0.15·device
//!           + 0.15·aml      + 0.05·behavioral
//! ```
//!
//! Unmeasured components take the neutral value (70). Because every
//! component is a clamped [`Score`] and the weights are validated to sum to
//! one, the aggregate is always inside [0, 100].
//!
//! Every [`RiskScoreEngine::compute`] call appends one immutable
//! [`RiskScoreSnapshot`] to the injected [`SnapshotLog`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kyc_core::{
    sha256_hex, CanonicalBytes, ComponentScores, KycError, Score, ScoreComponent, SessionId,
    SnapshotId, Timestamp, NEUTRAL_SCORE,
};
use kyc_state::VerificationSession;

use crate::snapshot::SnapshotLog;

/// Tolerance used when validating that weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Aggregates are rounded to this many decimal places, removing summation
/// noise so that exact boundary inputs land exactly on the boundary.
const AGGREGATE_DECIMALS: i32 = 6;

// ─── Configuration ──────────────────────────────────────────────────

/// Component weights. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub document_authenticity: f64,
    pub biometric_match: f64,
    pub device_trust: f64,
    pub aml_clearance: f64,
    pub behavioral_trust: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            document_authenticity: 0.35,
            biometric_match: 0.30,
            device_trust: 0.15,
            aml_clearance: 0.15,
            behavioral_trust: 0.05,
        }
    }
}

impl RiskWeights {
    pub fn weight(&self, component: ScoreComponent) -> f64 {
        match component {
            ScoreComponent::DocumentAuthenticity => self.document_authenticity,
            ScoreComponent::BiometricMatch => self.biometric_match,
            ScoreComponent::DeviceTrust => self.device_trust,
            ScoreComponent::AmlClearance => self.aml_clearance,
            ScoreComponent::BehavioralTrust => self.behavioral_trust,
        }
    }

    pub fn sum(&self) -> f64 {
        ScoreComponent::ALL.iter().map(|c| self.weight(*c)).sum()
    }
}

/// Decision band thresholds on the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    /// Aggregate at or above this value is auto-approved.
    pub auto_approve: f64,
    /// Aggregate at or above this value (and below `auto_approve`) goes to
    /// manual review; anything lower is rejected.
    pub manual_review: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 85.0,
            manual_review: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    pub thresholds: DecisionThresholds,
    pub neutral_score: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            thresholds: DecisionThresholds::default(),
            neutral_score: NEUTRAL_SCORE,
        }
    }
}

impl RiskConfig {
    /// Reject weights that do not sum to one, negative weights, inverted or
    /// out-of-range thresholds, and an out-of-range neutral score.
    pub fn validate(&self) -> Result<(), KycError> {
        for component in ScoreComponent::ALL {
            let w = self.weights.weight(component);
            if !(0.0..=1.0).contains(&w) {
                return Err(KycError::Config(format!(
                    "weight for {component} must be within [0, 1], got {w}"
                )));
            }
        }
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(KycError::Config(format!(
                "risk weights must sum to 1, got {sum}"
            )));
        }
        let t = &self.thresholds;
        if !(0.0 <= t.manual_review && t.manual_review < t.auto_approve && t.auto_approve <= 100.0)
        {
            return Err(KycError::Config(format!(
                "thresholds must satisfy 0 <= manual_review < auto_approve <= 100, got {} / {}",
                t.manual_review, t.auto_approve
            )));
        }
        if !(0.0..=100.0).contains(&self.neutral_score) {
            return Err(KycError::Config(format!(
                "neutral score must be within [0, 100], got {}",
                self.neutral_score
            )));
        }
        Ok(())
    }
}

// ─── Results ────────────────────────────────────────────────────────

/// Decision band of an aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBand {
    AutoApprove,
    ManualReview,
    Reject,
}

impl DecisionBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "auto_approve",
            Self::ManualReview => "manual_review",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for DecisionBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component as it entered the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    pub component: ScoreComponent,
    pub score: Score,
    pub weight: f64,
    /// `true` when the component was unmeasured and took the neutral value.
    pub neutral_fallback: bool,
}

impl ResolvedComponent {
    /// Points this component contributed to the aggregate.
    pub fn contribution(&self) -> f64 {
        self.score.value() * self.weight
    }
}

/// Immutable record of one aggregate computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreSnapshot {
    pub id: SnapshotId,
    pub session_id: SessionId,
    /// Position in the session's history, assigned by the log on append.
    pub sequence: u64,
    pub components: Vec<ResolvedComponent>,
    pub weights: RiskWeights,
    pub aggregate: Score,
    pub band: DecisionBand,
    pub computed_at: Timestamp,
    /// Hex SHA-256 over the integer (basis point) form of the content.
    pub digest: String,
}

impl RiskScoreSnapshot {
    pub fn neutral_components(&self) -> Vec<ScoreComponent> {
        self.components
            .iter()
            .filter(|c| c.neutral_fallback)
            .map(|c| c.component)
            .collect()
    }
}

#[derive(Serialize)]
struct SnapshotDigestInput<'a> {
    session_id: &'a SessionId,
    components: Vec<(ScoreComponent, u32, u32, bool)>,
    aggregate_bp: u32,
    band: DecisionBand,
    computed_at: &'a Timestamp,
}

/// Output of [`RiskScoreEngine::compute`].
#[derive(Debug, Clone, PartialEq)]
pub struct RiskComputation {
    pub aggregate: Score,
    pub band: DecisionBand,
    pub snapshot: RiskScoreSnapshot,
}

// ─── Engine ─────────────────────────────────────────────────────────

pub struct RiskScoreEngine {
    config: RiskConfig,
    log: Arc<dyn SnapshotLog>,
}

impl RiskScoreEngine {
    /// Build an engine after validating `config`.
    pub fn new(config: RiskConfig, log: Arc<dyn SnapshotLog>) -> Result<Self, KycError> {
        config.validate()?;
        Ok(Self { config, log })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Resolve missing components to neutral and compute the weighted
    /// aggregate. Pure.
    pub fn aggregate(&self, scores: &ComponentScores) -> (Score, Vec<ResolvedComponent>) {
        let neutral = Score::new(self.config.neutral_score);
        let resolved: Vec<ResolvedComponent> = ScoreComponent::ALL
            .iter()
            .map(|&component| {
                let measured = scores.get(component);
                ResolvedComponent {
                    component,
                    score: measured.unwrap_or(neutral),
                    weight: self.config.weights.weight(component),
                    neutral_fallback: measured.is_none(),
                }
            })
            .collect();
        let sum: f64 = resolved.iter().map(ResolvedComponent::contribution).sum();
        let scale = 10f64.powi(AGGREGATE_DECIMALS);
        (Score::new((sum * scale).round() / scale), resolved)
    }

    /// Map an aggregate onto its decision band. Thresholds are inclusive
    /// lower bounds.
    pub fn band(&self, aggregate: Score) -> DecisionBand {
        let t = &self.config.thresholds;
        let v = aggregate.value();
        if v >= t.auto_approve {
            DecisionBand::AutoApprove
        } else if v >= t.manual_review {
            DecisionBand::ManualReview
        } else {
            DecisionBand::Reject
        }
    }

    /// Compute the aggregate for `session` and append a snapshot.
    pub fn compute(&self, session: &VerificationSession) -> Result<RiskComputation, KycError> {
        let (aggregate, components) = self.aggregate(&session.component_scores);
        let band = self.band(aggregate);
        let computed_at = Timestamp::now();

        let input = SnapshotDigestInput {
            session_id: &session.id,
            components: components
                .iter()
                .map(|c| {
                    (
                        c.component,
                        c.score.to_basis_points(),
                        (c.weight * 10_000.0).round() as u32,
                        c.neutral_fallback,
                    )
                })
                .collect(),
            aggregate_bp: aggregate.to_basis_points(),
            band,
            computed_at: &computed_at,
        };
        let digest = sha256_hex(&CanonicalBytes::new(&input)?);

        let snapshot = self.log.append(RiskScoreSnapshot {
            id: SnapshotId::new(),
            session_id: session.id,
            sequence: 0,
            components,
            weights: self.config.weights,
            aggregate,
            band,
            computed_at,
            digest,
        })?;

        tracing::debug!(
            session_id = %session.id,
            sequence = snapshot.sequence,
            aggregate = %aggregate,
            band = %band,
            "risk snapshot appended"
        );

        Ok(RiskComputation {
            aggregate,
            band,
            snapshot,
        })
    }
}

impl std::fmt::Debug for RiskScoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskScoreEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::InMemorySnapshotLog;
    use kyc_core::{FlowType, StepSet, SubjectId};
    use kyc_state::FlowPlan;
    use proptest::prelude::*;

    fn engine() -> RiskScoreEngine {
        RiskScoreEngine::new(RiskConfig::default(), Arc::new(InMemorySnapshotLog::new())).unwrap()
    }

    fn scores(doc: f64, bio: f64, device: f64, aml: f64, behavioral: f64) -> ComponentScores {
        ComponentScores::default()
            .with(ScoreComponent::DocumentAuthenticity, doc)
            .with(ScoreComponent::BiometricMatch, bio)
            .with(ScoreComponent::DeviceTrust, device)
            .with(ScoreComponent::AmlClearance, aml)
            .with(ScoreComponent::BehavioralTrust, behavioral)
    }

    fn session_with(scores: ComponentScores) -> VerificationSession {
        let plan = FlowPlan {
            flow_type: FlowType::FastTrack,
            required_steps: StepSet::empty(),
            optional_steps: StepSet::empty(),
            manual_review_forced: false,
            estimated_minutes: 8,
        };
        let mut s = VerificationSession::new(
            SubjectId::new("risk-subject").unwrap(),
            plan,
            Score::new(100.0),
            Score::new(88.0),
        );
        s.component_scores = scores;
        s
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!((RiskWeights::default().sum() - 1.0).abs() < 1e-12);
        RiskConfig::default().validate().unwrap();
    }

    #[test]
    fn high_confidence_aggregate() {
        let (agg, _) = engine().aggregate(&scores(90.0, 92.0, 88.0, 95.0, 85.0));
        assert!((agg.value() - 90.8).abs() < 1e-9);
        assert_eq!(engine().band(agg), DecisionBand::AutoApprove);
    }

    #[test]
    fn mid_confidence_aggregate() {
        let (agg, _) = engine().aggregate(&scores(70.0, 80.0, 60.0, 90.0, 85.0));
        assert!((agg.value() - 75.25).abs() < 1e-9);
        assert_eq!(engine().band(agg), DecisionBand::ManualReview);
    }

    #[test]
    fn missing_components_use_neutral() {
        let partial = ComponentScores::default().with(ScoreComponent::DocumentAuthenticity, 100.0);
        let (agg, resolved) = engine().aggregate(&partial);
        // 0.35 * 100 + 0.65 * 70
        assert!((agg.value() - 80.5).abs() < 1e-9);
        assert_eq!(resolved.iter().filter(|c| c.neutral_fallback).count(), 4);
    }

    #[test]
    fn exact_threshold_boundaries() {
        let e = engine();
        assert_eq!(e.band(Score::new(85.0)), DecisionBand::AutoApprove);
        assert_eq!(e.band(Score::new(84.999)), DecisionBand::ManualReview);
        assert_eq!(e.band(Score::new(60.0)), DecisionBand::ManualReview);
        assert_eq!(e.band(Score::new(59.999)), DecisionBand::Reject);
    }

    #[test]
    fn uniform_components_land_on_boundary() {
        let e = engine();
        let (agg, _) = e.aggregate(&scores(85.0, 85.0, 85.0, 85.0, 85.0));
        assert_eq!(agg.value(), 85.0);
        assert_eq!(e.band(agg), DecisionBand::AutoApprove);
        let (agg, _) = e.aggregate(&scores(60.0, 60.0, 60.0, 60.0, 60.0));
        assert_eq!(e.band(agg), DecisionBand::ManualReview);
    }

    #[test]
    fn invalid_weights_rejected() {
        let mut config = RiskConfig::default();
        config.weights.behavioral_trust = 0.10;
        assert!(matches!(config.validate(), Err(KycError::Config(_))));
        assert!(RiskScoreEngine::new(config, Arc::new(InMemorySnapshotLog::new())).is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut config = RiskConfig::default();
        config.thresholds.manual_review = 90.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn compute_appends_snapshots() {
        let log = Arc::new(InMemorySnapshotLog::new());
        let e = RiskScoreEngine::new(RiskConfig::default(), log.clone()).unwrap();
        let session = session_with(scores(90.0, 92.0, 88.0, 95.0, 85.0));
        let first = e.compute(&session).unwrap();
        let second = e.compute(&session).unwrap();
        assert_eq!(first.snapshot.sequence, 1);
        assert_eq!(second.snapshot.sequence, 2);
        assert_eq!(first.aggregate, second.aggregate);
        assert_eq!(first.snapshot.digest.len(), 64);
        assert_eq!(log.history(&session.id).len(), 2);
    }

    proptest! {
        #[test]
        fn aggregate_is_bounded_and_deterministic(
            doc in -50.0f64..150.0,
            bio in -50.0f64..150.0,
            device in 0.0f64..100.0,
            aml in 0.0f64..100.0,
            behavioral in 0.0f64..100.0,
        ) {
            let e = engine();
            let s = scores(doc, bio, device, aml, behavioral);
            let (a, _) = e.aggregate(&s);
            let (b, _) = e.aggregate(&s);
            prop_assert!((0.0..=100.0).contains(&a.value()));
            prop_assert_eq!(a, b);
        }

        #[test]
        fn aggregate_is_monotonic_in_each_component(
            base in 0.0f64..90.0,
            bump in 0.0f64..10.0,
        ) {
            let e = engine();
            let (low, _) = e.aggregate(&scores(base, base, base, base, base));
            let (high, _) = e.aggregate(&scores(base + bump, base, base, base, base));
            prop_assert!(high.value() >= low.value());
        }
    }
}
