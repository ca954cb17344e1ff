//! # Evidence Records
//!
//! Analyzed documents and biometric captures attached to a session. Records
//! are written by the orchestrator after a collaborator responds and are
//! immutable afterwards.

use serde::{Deserialize, Serialize};

use kyc_core::{BiometricId, DocumentCategory, DocumentId, Score, SessionId, Timestamp};

/// Minimum overall biometric score for a capture to pass.
pub const BIOMETRIC_PASS_THRESHOLD: f64 = 70.0;
/// Deepfake likelihood at or above which a capture fails.
pub const DEEPFAKE_REJECT_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    /// The analyzer was unavailable; the authenticity score is neutral.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub session_id: SessionId,
    pub category: DocumentCategory,
    pub document_type: String,
    pub artifact_ref: String,
    pub authenticity_score: Option<Score>,
    pub forgery_flags: Vec<String>,
    pub analysis_status: AnalysisStatus,
    pub analyzed_at: Option<Timestamp>,
}

impl DocumentRecord {
    /// A submitted document awaiting analysis.
    pub fn submitted(
        session_id: SessionId,
        category: DocumentCategory,
        document_type: impl Into<String>,
        artifact_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            session_id,
            category,
            document_type: document_type.into(),
            artifact_ref: artifact_ref.into(),
            authenticity_score: None,
            forgery_flags: Vec::new(),
            analysis_status: AnalysisStatus::Pending,
            analyzed_at: None,
        }
    }

    pub fn mark_analyzed(&mut self, authenticity: Score, forgery_flags: Vec<String>) {
        self.authenticity_score = Some(authenticity);
        self.forgery_flags = forgery_flags;
        self.analysis_status = AnalysisStatus::Completed;
        self.analyzed_at = Some(Timestamp::now());
    }

    pub fn mark_unavailable(&mut self) {
        self.analysis_status = AnalysisStatus::Unavailable;
        self.analyzed_at = Some(Timestamp::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricRecord {
    pub id: BiometricId,
    pub session_id: SessionId,
    pub liveness_score: Score,
    pub face_match_score: Score,
    pub deepfake_score: Score,
    /// Mean of liveness and face match.
    pub overall_score: Score,
    pub passed: bool,
    pub captured_at: Timestamp,
}

impl BiometricRecord {
    pub fn new(session_id: SessionId, liveness: Score, face_match: Score, deepfake: Score) -> Self {
        let overall = Score::new((liveness.value() + face_match.value()) / 2.0);
        let passed = overall.value() >= BIOMETRIC_PASS_THRESHOLD
            && deepfake.value() < DEEPFAKE_REJECT_THRESHOLD;
        Self {
            id: BiometricId::new(),
            session_id,
            liveness_score: liveness,
            face_match_score: face_match,
            deepfake_score: deepfake,
            overall_score: overall,
            passed,
            captured_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biometric_overall_is_mean() {
        let r = BiometricRecord::new(
            SessionId::new(),
            Score::new(90.0),
            Score::new(94.0),
            Score::new(5.0),
        );
        assert_eq!(r.overall_score, Score::new(92.0));
        assert!(r.passed);
    }

    #[test]
    fn biometric_fails_on_deepfake() {
        let r = BiometricRecord::new(
            SessionId::new(),
            Score::new(95.0),
            Score::new(95.0),
            Score::new(50.0),
        );
        assert!(!r.passed);
    }

    #[test]
    fn biometric_fails_below_threshold() {
        let r = BiometricRecord::new(
            SessionId::new(),
            Score::new(60.0),
            Score::new(79.0),
            Score::new(0.0),
        );
        assert_eq!(r.overall_score, Score::new(69.5));
        assert!(!r.passed);
    }

    #[test]
    fn document_lifecycle() {
        let mut doc = DocumentRecord::submitted(
            SessionId::new(),
            DocumentCategory::IdentityProof,
            "passport",
            "blob://passport-front",
        );
        assert_eq!(doc.analysis_status, AnalysisStatus::Pending);
        doc.mark_analyzed(Score::new(91.0), vec![]);
        assert_eq!(doc.analysis_status, AnalysisStatus::Completed);
        assert_eq!(doc.authenticity_score, Some(Score::new(91.0)));
    }
}
