//! # Collaborator Capabilities
//!
//! The orchestrator consults four independently failing checks. Each is a
//! capability trait returning normalized [0, 100] scores:
//!
//! | Trait                  | Input                 | Feeds component     |
//! |------------------------|-----------------------|---------------------|
//! | [`DocumentAnalyzer`]   | a submitted document  | document_authenticity |
//! | [`BiometricVerifier`]  | selfie + frames       | biometric_match     |
//! | [`AmlScreener`]        | name / DOB / nationality | aml_clearance    |
//! | [`BehavioralAnalyzer`] | interaction signals   | behavioral_trust    |
//!
//! A `CollaboratorError` is never surfaced to callers. The orchestrator
//! leaves the component at the neutral value and flags a
//! `collaborator_unavailable` anomaly.
//!
//! [`Unconfigured`] is the composition-time fallback for every trait; the
//! `Static*` implementations return fixed results and drive simulations.
//! [`HeuristicBehavioralAnalyzer`] scores interaction signals locally.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kyc_core::{Score, SubjectId};
use kyc_state::DocumentRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{collaborator} is not configured")]
    NotConfigured { collaborator: &'static str },

    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        collaborator: &'static str,
        reason: String,
    },
}

impl CollaboratorError {
    pub fn collaborator(&self) -> &'static str {
        match self {
            Self::NotConfigured { collaborator } | Self::Unavailable { collaborator, .. } => {
                collaborator
            }
        }
    }
}

// ─── Documents ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub authenticity: Score,
    pub forgery_flags: Vec<String>,
}

pub trait DocumentAnalyzer: Send + Sync {
    fn analyze(&self, document: &DocumentRecord) -> Result<DocumentAnalysis, CollaboratorError>;
}

// ─── Biometrics ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiometricRequest {
    pub selfie_ref: String,
    /// Reference photo, typically the identity document portrait.
    pub reference_ref: Option<String>,
    pub liveness_frames: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiometricAnalysis {
    pub liveness: Score,
    pub face_match: Score,
    /// Likelihood that the capture is synthetic; higher is worse.
    pub deepfake: Score,
}

pub trait BiometricVerifier: Send + Sync {
    fn verify(&self, request: &BiometricRequest) -> Result<BiometricAnalysis, CollaboratorError>;
}

// ─── AML ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmlSubject {
    pub subject_id: SubjectId,
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmlResult {
    pub clearance: Score,
    pub sanctions_hit: bool,
    pub matched_lists: Vec<String>,
}

pub trait AmlScreener: Send + Sync {
    fn screen(&self, subject: &AmlSubject) -> Result<AmlResult, CollaboratorError>;
}

// ─── Behavior ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keystroke {
    pub key: String,
    /// Milliseconds since the form was opened.
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldActivity {
    pub pasted: bool,
    pub time_spent_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSample {
    pub x: i32,
    pub y: i32,
}

/// Interaction signals captured while the subject filled in the form.
/// Integer units only, so the payload can be canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralSignals {
    pub keystrokes: Vec<Keystroke>,
    pub fields: BTreeMap<String, FieldActivity>,
    pub pointer: Vec<PointerSample>,
    pub form_started_ms: Option<u64>,
    pub form_submitted_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralAssessment {
    pub trust: Score,
    pub bot_likelihood: Score,
    pub flags: Vec<String>,
}

pub trait BehavioralAnalyzer: Send + Sync {
    fn score(&self, signals: &BehavioralSignals) -> Result<BehavioralAssessment, CollaboratorError>;
}

// ─── Fallback ────────────────────────────────────────────────────────

/// Stands in for any collaborator that was not wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl DocumentAnalyzer for Unconfigured {
    fn analyze(&self, _: &DocumentRecord) -> Result<DocumentAnalysis, CollaboratorError> {
        Err(CollaboratorError::NotConfigured {
            collaborator: "document_analyzer",
        })
    }
}

impl BiometricVerifier for Unconfigured {
    fn verify(&self, _: &BiometricRequest) -> Result<BiometricAnalysis, CollaboratorError> {
        Err(CollaboratorError::NotConfigured {
            collaborator: "biometric_verifier",
        })
    }
}

impl AmlScreener for Unconfigured {
    fn screen(&self, _: &AmlSubject) -> Result<AmlResult, CollaboratorError> {
        Err(CollaboratorError::NotConfigured {
            collaborator: "aml_screener",
        })
    }
}

impl BehavioralAnalyzer for Unconfigured {
    fn score(&self, _: &BehavioralSignals) -> Result<BehavioralAssessment, CollaboratorError> {
        Err(CollaboratorError::NotConfigured {
            collaborator: "behavioral_analyzer",
        })
    }
}

// ─── Fixed results ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticDocumentAnalyzer {
    pub authenticity: Score,
    #[serde(default)]
    pub forgery_flags: Vec<String>,
}

impl StaticDocumentAnalyzer {
    pub fn new(authenticity: f64) -> Self {
        Self {
            authenticity: Score::new(authenticity),
            forgery_flags: Vec::new(),
        }
    }
}

impl DocumentAnalyzer for StaticDocumentAnalyzer {
    fn analyze(&self, _: &DocumentRecord) -> Result<DocumentAnalysis, CollaboratorError> {
        Ok(DocumentAnalysis {
            authenticity: self.authenticity,
            forgery_flags: self.forgery_flags.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticBiometricVerifier(pub BiometricAnalysis);

impl StaticBiometricVerifier {
    /// Liveness and face match both `score`, no deepfake signal.
    pub fn uniform(score: f64) -> Self {
        Self(BiometricAnalysis {
            liveness: Score::new(score),
            face_match: Score::new(score),
            deepfake: Score::MIN,
        })
    }
}

impl BiometricVerifier for StaticBiometricVerifier {
    fn verify(&self, _: &BiometricRequest) -> Result<BiometricAnalysis, CollaboratorError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAmlScreener(pub AmlResult);

impl StaticAmlScreener {
    pub fn clear(clearance: f64) -> Self {
        Self(AmlResult {
            clearance: Score::new(clearance),
            sanctions_hit: false,
            matched_lists: Vec::new(),
        })
    }
}

impl AmlScreener for StaticAmlScreener {
    fn screen(&self, _: &AmlSubject) -> Result<AmlResult, CollaboratorError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticBehavioralAnalyzer {
    pub trust: Score,
}

impl StaticBehavioralAnalyzer {
    pub fn new(trust: f64) -> Self {
        Self {
            trust: Score::new(trust),
        }
    }
}

impl BehavioralAnalyzer for StaticBehavioralAnalyzer {
    fn score(&self, _: &BehavioralSignals) -> Result<BehavioralAssessment, CollaboratorError> {
        Ok(BehavioralAssessment {
            trust: self.trust,
            bot_likelihood: self.trust.inverted(),
            flags: Vec::new(),
        })
    }
}

// ─── Heuristic behavior scoring ──────────────────────────────────────

/// Sub-score used when a signal family was not captured at all.
const MISSING_SIGNAL_SCORE: f64 = 70.0;
/// Sub-score used when a signal family was captured but is too sparse.
const INSUFFICIENT_SIGNAL_SCORE: f64 = 50.0;

const TYPING_WEIGHT: f64 = 0.35;
const PASTE_WEIGHT: f64 = 0.25;
const POINTER_WEIGHT: f64 = 0.20;
const SPEED_WEIGHT: f64 = 0.20;

const MIN_KEYSTROKES: usize = 10;
const MIN_POINTER_SAMPLES: usize = 20;
const SUPERHUMAN_INTERVAL_MS: f64 = 80.0;
const CRITICAL_FIELDS: [&str; 4] = ["full_name", "father_name", "mother_name", "date_of_birth"];

/// Scores typing rhythm, paste behavior, pointer movement and form speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBehavioralAnalyzer;

struct SubScore {
    score: f64,
    flags: Vec<&'static str>,
}

impl SubScore {
    fn flat(score: f64) -> Self {
        Self {
            score,
            flags: Vec::new(),
        }
    }
}

impl HeuristicBehavioralAnalyzer {
    fn typing(signals: &BehavioralSignals) -> SubScore {
        let keys = &signals.keystrokes;
        if keys.is_empty() {
            return SubScore::flat(MISSING_SIGNAL_SCORE);
        }
        if keys.len() < MIN_KEYSTROKES {
            return SubScore::flat(INSUFFICIENT_SIGNAL_SCORE);
        }
        let intervals: Vec<f64> = keys
            .windows(2)
            .map(|w| w[1].at_ms.saturating_sub(w[0].at_ms) as f64)
            .collect();
        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
        let cv = if mean > 0.0 { variance.sqrt() / mean } else { 0.0 };

        let corrections = keys
            .iter()
            .filter(|k| k.key == "Backspace" || k.key == "Delete")
            .count();
        let correction_rate = corrections as f64 / keys.len() as f64;

        let mut out = SubScore::flat(100.0);
        if cv < 0.1 {
            out.score -= 30.0;
            out.flags.push("bot_like_uniformity");
        }
        if mean < SUPERHUMAN_INTERVAL_MS {
            out.score -= 40.0;
            out.flags.push("superhuman_speed");
        }
        if correction_rate < 0.05 {
            out.score -= 20.0;
            out.flags.push("minimal_corrections");
        }
        if mean > 100.0 && mean < 600.0 && cv > 0.15 {
            out.score += 10.0;
        }
        out
    }

    fn paste(signals: &BehavioralSignals) -> SubScore {
        let total = signals.fields.len();
        if total == 0 {
            return SubScore::flat(INSUFFICIENT_SIGNAL_SCORE);
        }
        let pasted = signals.fields.values().filter(|f| f.pasted).count();
        let percentage = pasted as f64 * 100.0 / total as f64;
        let critical = signals
            .fields
            .iter()
            .any(|(name, f)| f.pasted && CRITICAL_FIELDS.contains(&name.as_str()));

        let mut out = SubScore::flat(100.0);
        if percentage > 50.0 {
            out.score -= 20.0;
            out.flags.push("excessive_pasting");
        }
        if percentage > 70.0 {
            out.score -= 30.0;
        }
        if critical {
            out.score -= 25.0;
            out.flags.push("critical_field_paste");
        }
        out
    }

    fn pointer(signals: &BehavioralSignals) -> SubScore {
        let samples = &signals.pointer;
        if samples.is_empty() {
            return SubScore::flat(MISSING_SIGNAL_SCORE);
        }
        if samples.len() < MIN_POINTER_SAMPLES {
            return SubScore::flat(INSUFFICIENT_SIGNAL_SCORE);
        }
        // Axis-aligned segments are what scripted pointers produce.
        let linear = samples
            .windows(2)
            .filter(|w| (w[1].x - w[0].x).abs() < 5 || (w[1].y - w[0].y).abs() < 5)
            .count();
        let ratio = linear as f64 / (samples.len() - 1) as f64;

        let mut out = SubScore::flat(100.0);
        if ratio > 0.7 {
            out.score -= 30.0;
            out.flags.push("bot_like_movement");
        }
        if ratio > 0.85 {
            out.score -= 40.0;
        }
        out
    }

    fn speed(signals: &BehavioralSignals) -> SubScore {
        let (Some(start), Some(end)) = (signals.form_started_ms, signals.form_submitted_ms) else {
            return SubScore::flat(MISSING_SIGNAL_SCORE);
        };
        if signals.fields.is_empty() {
            return SubScore::flat(MISSING_SIGNAL_SCORE);
        }
        let per_field = end.saturating_sub(start) as f64 / 1000.0 / signals.fields.len() as f64;

        let mut out = SubScore::flat(100.0);
        if per_field < 3.0 {
            out.score -= 35.0;
            out.flags.push("unnaturally_fast");
        }
        if per_field > 60.0 {
            out.score -= 15.0;
            out.flags.push("unusually_slow");
        }
        if (5.0..=20.0).contains(&per_field) {
            out.score += 5.0;
        }
        out
    }
}

impl BehavioralAnalyzer for HeuristicBehavioralAnalyzer {
    fn score(&self, signals: &BehavioralSignals) -> Result<BehavioralAssessment, CollaboratorError> {
        let parts = [
            (Self::typing(signals), TYPING_WEIGHT),
            (Self::paste(signals), PASTE_WEIGHT),
            (Self::pointer(signals), POINTER_WEIGHT),
            (Self::speed(signals), SPEED_WEIGHT),
        ];
        let overall: f64 = parts
            .iter()
            .map(|(sub, weight)| sub.score.clamp(0.0, 100.0) * weight)
            .sum();
        let trust = Score::new(overall);
        Ok(BehavioralAssessment {
            trust,
            bot_likelihood: trust.inverted(),
            flags: parts
                .iter()
                .flat_map(|(sub, _)| sub.flags.iter().map(|f| f.to_string()))
                .collect(),
        })
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────

/// The set of collaborators an orchestrator consults.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentAnalyzer>,
    pub biometrics: Arc<dyn BiometricVerifier>,
    pub aml: Arc<dyn AmlScreener>,
    pub behavior: Arc<dyn BehavioralAnalyzer>,
}

impl Default for Collaborators {
    /// External checks unconfigured; behavior scored by the local heuristics.
    fn default() -> Self {
        Self {
            documents: Arc::new(Unconfigured),
            biometrics: Arc::new(Unconfigured),
            aml: Arc::new(Unconfigured),
            behavior: Arc::new(HeuristicBehavioralAnalyzer),
        }
    }
}

impl Collaborators {
    pub fn with_documents(mut self, analyzer: Arc<dyn DocumentAnalyzer>) -> Self {
        self.documents = analyzer;
        self
    }

    pub fn with_biometrics(mut self, verifier: Arc<dyn BiometricVerifier>) -> Self {
        self.biometrics = verifier;
        self
    }

    pub fn with_aml(mut self, screener: Arc<dyn AmlScreener>) -> Self {
        self.aml = screener;
        self
    }

    pub fn with_behavior(mut self, analyzer: Arc<dyn BehavioralAnalyzer>) -> Self {
        self.behavior = analyzer;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
