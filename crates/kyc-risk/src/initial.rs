//! # Initial Risk Assessment
//!
//! Scores a subject before any evidence is collected, from the device and
//! account context supplied at `initiate_verification`. The result seeds the
//! session's initial risk score (which picks the flow) and its device trust
//! component.

use serde::{Deserialize, Serialize};

use kyc_core::{RiskLevel, Score};

/// Device and account context captured when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceContext {
    pub device_fingerprint: Option<String>,
    /// Trust reported by an upstream fingerprint service (0..=100).
    pub fingerprint_trust: Option<u8>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub returning_customer: bool,
    pub vpn_detected: bool,
    pub location_mismatch: bool,
    pub is_rooted: bool,
    pub is_emulator: bool,
    /// `Some(false)` when the browser failed an integrity check.
    pub browser_integrity: Option<bool>,
    pub automation_detected: bool,
}

/// Result of [`assess_initial_risk`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialAssessment {
    pub score: Score,
    pub device_trust: Score,
    pub risk_level: RiskLevel,
    pub factors: Vec<String>,
}

/// Device integrity: 100 minus penalties for rooting, emulation, failed
/// browser integrity and automation, capped by the fingerprint service's
/// trust when one is reported.
pub fn device_trust(ctx: &DeviceContext) -> Score {
    let mut score = 100.0;
    if ctx.is_rooted {
        score -= 40.0;
    }
    if ctx.is_emulator {
        score -= 50.0;
    }
    if ctx.browser_integrity == Some(false) {
        score -= 30.0;
    }
    if ctx.automation_detected {
        score -= 60.0;
    }
    let integrity = Score::new(score);
    match ctx.fingerprint_trust {
        Some(reported) => Score::new(integrity.value().min(f64::from(reported))),
        None => integrity,
    }
}

/// Initial trust score: start at 100 and deduct for unverified contact
/// channels, weak device trust, VPN use and location mismatch; returning
/// customers earn a bonus. Clamped to [0, 100].
pub fn assess_initial_risk(ctx: &DeviceContext) -> InitialAssessment {
    let device = device_trust(ctx);
    let mut score = 100.0;
    let mut factors = Vec::new();

    if !ctx.email_verified {
        score -= 15.0;
        factors.push("email not verified".to_string());
    }
    if !ctx.phone_verified {
        score -= 10.0;
        factors.push("phone not verified".to_string());
    }
    if device.value() < 40.0 {
        score -= 20.0;
        factors.push(format!("low device trust ({device})"));
    } else if device.value() < 70.0 {
        score -= 10.0;
        factors.push(format!("medium device trust ({device})"));
    }
    if ctx.vpn_detected {
        score -= 15.0;
        factors.push("vpn detected".to_string());
    }
    if ctx.location_mismatch {
        score -= 10.0;
        factors.push("location mismatch".to_string());
    }
    if ctx.returning_customer {
        score += 10.0;
        factors.push("returning customer (+10)".to_string());
    }

    let score = Score::new(score);
    let risk_level = if score.value() >= 85.0 {
        RiskLevel::Low
    } else if score.value() >= 60.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };

    InitialAssessment {
        score,
        device_trust: device,
        risk_level,
        factors,
    }
}
