//! # Adaptive Flow Selector
//!
//! Chooses how much evidence a subject must provide, from the initial risk
//! score, and re-evaluates that choice as evidence arrives.
//!
//! | Band              | Score   | Required              | Optional | Review |
//! |-------------------|---------|-----------------------|----------|--------|
//! | fast_track        | ≥ 85    | 0 1 2 3 7 9           | 5 6      | no     |
//! | standard          | 60 – 84 | 0 1 2 3 5 7 9         | 4 6      | no     |
//! | deep_verification | < 60    | all                   | –        | forced |
//!
//! Re-evaluation subtracts penalties from the initial score. When the running
//! score falls into a stricter band the session escalates; it never
//! de-escalates, and escalation only adds steps that are still `pending`.

use serde::{Deserialize, Serialize};

use kyc_core::{FlowType, KycError, RiskLevel, Score, StepSet, VerificationStep};
use kyc_state::{AnomalyKind, FlowPlan, VerificationSession};

// ─── Configuration ──────────────────────────────────────────────────

/// Score thresholds and penalty points used by re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    pub document_low_below: f64,
    pub document_low_points: f64,
    pub document_medium_below: f64,
    pub document_medium_points: f64,
    pub liveness_below: f64,
    pub liveness_points: f64,
    pub face_match_below: f64,
    pub face_match_points: f64,
    pub bot_likelihood_above: f64,
    pub bot_points: f64,
    pub deepfake_at_or_above: f64,
    pub deepfake_points: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            document_low_below: 50.0,
            document_low_points: 20.0,
            document_medium_below: 70.0,
            document_medium_points: 10.0,
            liveness_below: 70.0,
            liveness_points: 15.0,
            face_match_below: 75.0,
            face_match_points: 15.0,
            bot_likelihood_above: 30.0,
            bot_points: 25.0,
            deepfake_at_or_above: 50.0,
            deepfake_points: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Scores at or above this select fast track.
    pub fast_track_min: f64,
    /// Scores at or above this (below `fast_track_min`) select standard.
    pub standard_min: f64,
    /// Anomaly count at which manual review is required.
    pub manual_review_anomalies: usize,
    pub penalties: PenaltyConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            fast_track_min: 85.0,
            standard_min: 60.0,
            manual_review_anomalies: 2,
            penalties: PenaltyConfig::default(),
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<(), KycError> {
        if !(0.0 <= self.standard_min
            && self.standard_min < self.fast_track_min
            && self.fast_track_min <= 100.0)
        {
            return Err(KycError::Config(format!(
                "flow bands must satisfy 0 <= standard_min < fast_track_min <= 100, got {} / {}",
                self.standard_min, self.fast_track_min
            )));
        }
        if self.manual_review_anomalies == 0 {
            return Err(KycError::Config(
                "manual_review_anomalies must be at least 1".into(),
            ));
        }
        let p = &self.penalties;
        let points = [
            p.document_low_points,
            p.document_medium_points,
            p.liveness_points,
            p.face_match_points,
            p.bot_points,
            p.deepfake_points,
        ];
        if points.iter().any(|v| *v < 0.0) {
            return Err(KycError::Config("penalty points must not be negative".into()));
        }
        Ok(())
    }
}

// ─── Results ────────────────────────────────────────────────────────

/// One penalty applied during re-evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub kind: AnomalyKind,
    pub points: f64,
    pub detail: String,
}

/// Outcome of [`AdaptiveFlowSelector::re_evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reevaluation {
    pub running_score: Score,
    pub penalties: Vec<Penalty>,
    pub risk_level: RiskLevel,
    /// The escalated plan, when the band became stricter.
    pub escalated_plan: Option<FlowPlan>,
    pub requires_manual_review: bool,
}

// ─── Selector ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AdaptiveFlowSelector {
    config: FlowConfig,
}

impl AdaptiveFlowSelector {
    pub fn new(config: FlowConfig) -> Result<Self, KycError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Band of a trust score.
    pub fn flow_for(&self, score: Score) -> FlowType {
        let v = score.value();
        if v >= self.config.fast_track_min {
            FlowType::FastTrack
        } else if v >= self.config.standard_min {
            FlowType::Standard
        } else {
            FlowType::DeepVerification
        }
    }

    /// The canonical plan of a flow band.
    pub fn plan_for(&self, flow_type: FlowType) -> FlowPlan {
        use VerificationStep::*;
        match flow_type {
            FlowType::FastTrack => FlowPlan {
                flow_type,
                required_steps: StepSet::from_steps(&[
                    PreVerification,
                    DocumentUpload,
                    DocumentAnalysis,
                    FaceVerification,
                    RiskScoring,
                    CredentialIssuance,
                ]),
                optional_steps: StepSet::from_steps(&[VideoVerification, AmlScreening]),
                manual_review_forced: false,
                estimated_minutes: 8,
            },
            FlowType::Standard => FlowPlan {
                flow_type,
                required_steps: StepSet::from_steps(&[
                    PreVerification,
                    DocumentUpload,
                    DocumentAnalysis,
                    FaceVerification,
                    VideoVerification,
                    RiskScoring,
                    CredentialIssuance,
                ]),
                optional_steps: StepSet::from_steps(&[AddressVerification, AmlScreening]),
                manual_review_forced: false,
                estimated_minutes: 15,
            },
            FlowType::DeepVerification => FlowPlan {
                flow_type,
                required_steps: StepSet::all(),
                optional_steps: StepSet::empty(),
                manual_review_forced: true,
                estimated_minutes: 25,
            },
        }
    }

    /// Select the initial plan for a session.
    pub fn select_flow(&self, initial_score: Score) -> FlowPlan {
        self.plan_for(self.flow_for(initial_score))
    }

    /// Recompute the running score from the initial score and the signals
    /// collected so far, and decide whether the flow must escalate.
    ///
    /// Pure: the session is not modified. Penalty anomalies that are not yet
    /// flagged on the session count toward the manual review threshold.
    pub fn re_evaluate(&self, session: &VerificationSession) -> Reevaluation {
        let penalties = self.penalties(session);
        let deducted: f64 = penalties.iter().map(|p| p.points).sum();
        let running_score = Score::new(session.initial_risk_score.value() - deducted);

        let current = session.flow;
        let target = current.flow_type.max(self.flow_for(running_score));
        let escalated_plan = (target > current.flow_type).then(|| {
            let canonical = self.plan_for(target);
            let pending = session.steps.pending();
            let required = current
                .required_steps
                .union(&canonical.required_steps.intersection(&pending));
            FlowPlan {
                flow_type: target,
                required_steps: required,
                optional_steps: canonical.optional_steps.difference(&required),
                manual_review_forced: current.manual_review_forced
                    || canonical.manual_review_forced,
                estimated_minutes: canonical.estimated_minutes,
            }
        });

        let new_flags = penalties
            .iter()
            .filter(|p| !session.has_anomaly(p.kind))
            .count();
        let anomaly_count = session.anomaly_count() + new_flags;
        let risk_level = target.risk_level();
        let requires_manual_review = risk_level == RiskLevel::High
            || anomaly_count >= self.config.manual_review_anomalies;

        Reevaluation {
            running_score,
            penalties,
            risk_level,
            escalated_plan,
            requires_manual_review,
        }
    }

    fn penalties(&self, session: &VerificationSession) -> Vec<Penalty> {
        let p = &self.config.penalties;
        let mut out = Vec::new();

        if let Some(doc) = session.component_scores.document_authenticity {
            if doc.value() < p.document_low_below {
                out.push(Penalty {
                    kind: AnomalyKind::LowDocumentAuthenticity,
                    points: p.document_low_points,
                    detail: format!("document authenticity {doc} below {}", p.document_low_below),
                });
            } else if doc.value() < p.document_medium_below {
                out.push(Penalty {
                    kind: AnomalyKind::MediumDocumentAuthenticity,
                    points: p.document_medium_points,
                    detail: format!(
                        "document authenticity {doc} below {}",
                        p.document_medium_below
                    ),
                });
            }
        }

        let signals = &session.biometric_signals;
        if let Some(liveness) = signals.liveness.filter(|s| s.value() < p.liveness_below) {
            out.push(Penalty {
                kind: AnomalyKind::LowLiveness,
                points: p.liveness_points,
                detail: format!("liveness {liveness} below {}", p.liveness_below),
            });
        }
        if let Some(face) = signals.face_match.filter(|s| s.value() < p.face_match_below) {
            out.push(Penalty {
                kind: AnomalyKind::LowFaceMatch,
                points: p.face_match_points,
                detail: format!("face match {face} below {}", p.face_match_below),
            });
        }
        if let Some(deepfake) = signals
            .deepfake
            .filter(|s| s.value() >= p.deepfake_at_or_above)
        {
            out.push(Penalty {
                kind: AnomalyKind::DeepfakeSuspected,
                points: p.deepfake_points,
                detail: format!("deepfake likelihood {deepfake}"),
            });
        }
        if let Some(bot) = session
            .bot_likelihood
            .filter(|s| s.value() > p.bot_likelihood_above)
        {
            out.push(Penalty {
                kind: AnomalyKind::BotSuspected,
                points: p.bot_points,
                detail: format!("bot likelihood {bot} above {}", p.bot_likelihood_above),
            });
        }
        out
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
