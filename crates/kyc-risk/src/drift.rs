//! # Approval Rate Drift
//!
//! Compares the auto-approval rate of two adjacent time windows over the
//! snapshot log. Each session counts once, by its newest snapshot, in the
//! window that snapshot was computed in.
//!
//! A shift of more than [`DRIFT_THRESHOLD_PERCENT`] percentage points
//! between the baseline window and the recent window is reported as drift.
//! A window without sessions has no rate and never reports drift.

use serde::{Deserialize, Serialize};

use kyc_core::Timestamp;

use crate::engine::{DecisionBand, RiskScoreSnapshot};
use crate::snapshot::SnapshotLog;

/// Percentage-point change in approval rate treated as drift.
pub const DRIFT_THRESHOLD_PERCENT: f64 = 5.0;

/// Default window length, in days.
pub const DEFAULT_DRIFT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWindow {
    pub from: Timestamp,
    pub to: Timestamp,
    pub sessions: usize,
    pub auto_approved: usize,
    /// Rounded to two decimals. `None` when the window has no sessions.
    pub approval_rate_percent: Option<f64>,
}

impl ApprovalWindow {
    fn tally(from: Timestamp, to: Timestamp, snapshots: &[&RiskScoreSnapshot]) -> Self {
        let sessions = snapshots.len();
        let auto_approved = snapshots
            .iter()
            .filter(|s| s.band == DecisionBand::AutoApprove)
            .count();
        let approval_rate_percent =
            (sessions > 0).then(|| round2(auto_approved as f64 / sessions as f64 * 100.0));
        Self {
            from,
            to,
            sessions,
            auto_approved,
            approval_rate_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub baseline: ApprovalWindow,
    pub recent: ApprovalWindow,
    /// Absolute change between the two rates, when both exist.
    pub drift_percent: Option<f64>,
    pub drift_detected: bool,
    pub monitored_at: Timestamp,
}

/// Compare `[now - 2w, now - w)` against `[now - w, now]` for a window of
/// `window_days`.
pub fn approval_rate_drift(log: &dyn SnapshotLog, window_days: i64, now: Timestamp) -> DriftReport {
    let recent_from = now.plus_days(-window_days);
    let baseline_from = now.plus_days(-2 * window_days);

    let latest = log.latest_per_session();
    let baseline: Vec<&RiskScoreSnapshot> = latest
        .iter()
        .filter(|s| s.computed_at >= baseline_from && s.computed_at < recent_from)
        .collect();
    let recent: Vec<&RiskScoreSnapshot> = latest
        .iter()
        .filter(|s| s.computed_at >= recent_from && s.computed_at <= now)
        .collect();

    let baseline = ApprovalWindow::tally(baseline_from, recent_from, &baseline);
    let recent = ApprovalWindow::tally(recent_from, now, &recent);
    let drift_percent = match (baseline.approval_rate_percent, recent.approval_rate_percent) {
        (Some(before), Some(after)) => Some(round2((after - before).abs())),
        _ => None,
    };
    let drift_detected = drift_percent.is_some_and(|d| d > DRIFT_THRESHOLD_PERCENT);

    if drift_detected {
        tracing::warn!(
            baseline_rate = ?baseline.approval_rate_percent,
            recent_rate = ?recent.approval_rate_percent,
            drift = ?drift_percent,
            window_days,
            "approval rate drift detected"
        );
    } else {
        tracing::debug!(
            baseline_sessions = baseline.sessions,
            recent_sessions = recent.sessions,
            drift = ?drift_percent,
            "approval rate stable"
        );
    }

    DriftReport {
        baseline,
        recent,
        drift_percent,
        drift_detected,
        monitored_at: now,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
