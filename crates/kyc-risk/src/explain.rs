//! # Decision Explanations
//!
//! Human-readable traces of why a session, a document or a biometric capture
//! scored the way it did. Explanations are derived from stored state only;
//! they never re-run collaborators and never change a decision.

use serde::{Deserialize, Serialize};

use kyc_core::{DocumentId, Score, ScoreComponent, SessionId, SubjectId, Timestamp};
use kyc_state::{
    AnalysisStatus, ApprovalDecision, BiometricRecord, DocumentRecord, VerificationSession,
};

use crate::engine::{DecisionBand, ResolvedComponent};

/// Confidence in a verdict: scores far from the middle are high confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
}

impl Confidence {
    fn of(score: Score) -> Self {
        if score.value() > 85.0 || score.value() < 40.0 {
            Self::High
        } else {
            Self::Medium
        }
    }
}

/// Per-artifact verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    NeedsReview,
    Rejected,
}

impl Verdict {
    fn of(score: Score) -> Self {
        if score.value() >= 80.0 {
            Self::Approved
        } else if score.value() >= 60.0 {
            Self::NeedsReview
        } else {
            Self::Rejected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    High,
    Medium,
    Low,
}

// ─── Session trace ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub component: ScoreComponent,
    pub score: Score,
    pub weight: f64,
    /// Points contributed to the aggregate (`score × weight`).
    pub points: f64,
    pub neutral_fallback: bool,
}

/// Why a session received its identity integrity score and decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub session_id: SessionId,
    pub identity_integrity_score: Option<Score>,
    pub running_risk_score: Score,
    pub band: Option<DecisionBand>,
    pub decision: ApprovalDecision,
    pub contributions: Vec<Contribution>,
    pub positive_indicators: Vec<String>,
    pub risk_indicators: Vec<String>,
    pub primary_factor: String,
    pub confidence: Option<Confidence>,
    pub human_review_needed: bool,
}

/// Build the trace of a session from its resolved components.
pub fn explain_decision(
    session: &VerificationSession,
    components: &[ResolvedComponent],
    band: Option<DecisionBand>,
) -> DecisionTrace {
    let mut positive = Vec::new();
    let mut risk = Vec::new();
    let scores = &session.component_scores;

    if let Some(doc) = scores.document_authenticity {
        if doc.value() >= 80.0 {
            positive.push(format!("high document authenticity ({doc})"));
        } else if doc.value() < 60.0 {
            risk.push(format!("low document authenticity ({doc})"));
        }
    }
    if let Some(face) = session.biometric_signals.face_match {
        if face.value() >= 85.0 {
            positive.push(format!("strong biometric match ({face})"));
        } else if face.value() < 75.0 {
            risk.push(format!("weak biometric match ({face})"));
        }
    }
    if let Some(bot) = session.bot_likelihood {
        if bot.value() < 20.0 {
            positive.push("natural human behavior detected".to_string());
        } else if bot.value() > 40.0 {
            risk.push(format!("suspicious behavior patterns (bot likelihood {bot})"));
        }
    }
    if let Some(device) = scores.device_trust {
        if device.value() >= 80.0 {
            positive.push("trusted device".to_string());
        } else if device.value() < 50.0 {
            risk.push(format!("low device trust ({device})"));
        }
    }
    if session.sanctions_hit {
        risk.push("sanctions screening hit".to_string());
    }
    for anomaly in &session.anomalies {
        risk.push(format!("anomaly: {} ({})", anomaly.kind, anomaly.detail));
    }
    for c in components.iter().filter(|c| c.neutral_fallback) {
        risk.push(format!("{} unmeasured, neutral value used", c.component));
    }

    let primary_factor = risk
        .first()
        .or_else(|| positive.first())
        .cloned()
        .unwrap_or_else(|| "standard verification process".to_string());

    DecisionTrace {
        session_id: session.id,
        identity_integrity_score: session.identity_integrity_score,
        running_risk_score: session.running_risk_score,
        band,
        decision: session.approval_decision,
        contributions: components
            .iter()
            .map(|c| Contribution {
                component: c.component,
                score: c.score,
                weight: c.weight,
                points: c.contribution(),
                neutral_fallback: c.neutral_fallback,
            })
            .collect(),
        positive_indicators: positive,
        risk_indicators: risk,
        primary_factor,
        confidence: session.identity_integrity_score.map(Confidence::of),
        human_review_needed: matches!(
            session.approval_decision,
            ApprovalDecision::ManualReviewRequired | ApprovalDecision::Rejected
        ),
    }
}

// ─── Document ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExplanation {
    pub document_id: DocumentId,
    pub document_type: String,
    pub score: Option<Score>,
    pub verdict: Verdict,
    pub summary: String,
    pub positive_factors: Vec<String>,
    pub negative_factors: Vec<String>,
    pub confidence: Confidence,
}

pub fn explain_document(record: &DocumentRecord) -> DocumentExplanation {
    let mut positive = Vec::new();
    let mut negative = Vec::new();

    match record.analysis_status {
        AnalysisStatus::Completed => {
            if record.forgery_flags.is_empty() {
                positive.push("no signs of tampering or editing".to_string());
            }
            negative.extend(
                record
                    .forgery_flags
                    .iter()
                    .map(|f| format!("tamper indicator: {f}")),
            );
        }
        AnalysisStatus::Unavailable => {
            negative.push("analysis unavailable, neutral score used".to_string());
        }
        AnalysisStatus::Pending => negative.push("analysis pending".to_string()),
    }

    let effective = record.authenticity_score.unwrap_or(Score::MIN);
    let verdict = match record.analysis_status {
        AnalysisStatus::Completed => Verdict::of(effective),
        AnalysisStatus::Unavailable | AnalysisStatus::Pending => Verdict::NeedsReview,
    };
    let summary = match verdict {
        Verdict::Approved => "document appears authentic",
        Verdict::NeedsReview => "document has concerns and may need review",
        Verdict::Rejected => "document has significant authenticity issues",
    };

    DocumentExplanation {
        document_id: record.id,
        document_type: record.document_type.clone(),
        score: record.authenticity_score,
        verdict,
        summary: summary.to_string(),
        positive_factors: positive,
        negative_factors: negative,
        confidence: Confidence::of(effective),
    }
}

// ─── Biometric ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricExplanation {
    pub overall_score: Score,
    pub verdict: Verdict,
    pub liveness_quality: Quality,
    pub face_match_quality: Quality,
    pub reasoning: Vec<String>,
    pub next_step: String,
}

pub fn explain_biometric(record: &BiometricRecord) -> BiometricExplanation {
    let liveness = record.liveness_score.value();
    let face = record.face_match_score.value();
    let mut reasoning = Vec::new();

    reasoning.push(
        if liveness >= 85.0 {
            "live person detected with high confidence"
        } else if liveness >= 70.0 {
            "live person likely, some liveness indicators weak"
        } else {
            "liveness check failed, possible replay"
        }
        .to_string(),
    );
    reasoning.push(
        if face >= 85.0 {
            "selfie strongly matches document photo"
        } else if face >= 75.0 {
            "selfie matches document photo with medium confidence"
        } else {
            "selfie does not match document photo sufficiently"
        }
        .to_string(),
    );
    if record.deepfake_score.value() >= 50.0 {
        reasoning.push(format!(
            "synthetic media indicators present ({})",
            record.deepfake_score
        ));
    }

    let verdict = if record.deepfake_score.value() >= 50.0 {
        Verdict::Rejected
    } else {
        Verdict::of(record.overall_score)
    };
    let next_step = match verdict {
        Verdict::Approved => "proceed",
        Verdict::NeedsReview => "manual review by compliance team",
        Verdict::Rejected => "require re-verification",
    };

    BiometricExplanation {
        overall_score: record.overall_score,
        verdict,
        liveness_quality: quality(liveness, 85.0, 70.0),
        face_match_quality: quality(face, 85.0, 75.0),
        reasoning,
        next_step: next_step.to_string(),
    }
}

fn quality(value: f64, high_above: f64, medium_above: f64) -> Quality {
    if value > high_above {
        Quality::High
    } else if value > medium_above {
        Quality::Medium
    } else {
        Quality::Low
    }
}

// ─── Report ─────────────────────────────────────────────────────────

/// Full explainable report of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub generated_at: Timestamp,
    pub decision: ApprovalDecision,
    pub trace: DecisionTrace,
    pub documents: Vec<DocumentExplanation>,
    pub biometric: Option<BiometricExplanation>,
}

impl VerificationReport {
    pub fn build(
        session: &VerificationSession,
        trace: DecisionTrace,
        documents: &[DocumentRecord],
        biometric: Option<&BiometricRecord>,
    ) -> Self {
        Self {
            session_id: session.id,
            subject_id: session.subject_id.clone(),
            generated_at: Timestamp::now(),
            decision: session.approval_decision,
            trace,
            documents: documents.iter().map(explain_document).collect(),
            biometric: biometric.map(explain_biometric),
        }
    }
}
