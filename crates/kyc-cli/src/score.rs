//! # Score Subcommand
//!
//! Aggregates component scores with the configured weights. Components
//! left out resolve to the neutral score, exactly as in a live session.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use kyc_core::{ComponentScores, Score, ScoreComponent};
use kyc_engine::EngineConfig;
use kyc_risk::{DecisionBand, InMemorySnapshotLog, ResolvedComponent, RiskScoreEngine};

/// Arguments for `kyc score`.
#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Document authenticity score (0-100).
    #[arg(long)]
    pub document: Option<f64>,
    /// Biometric match score (0-100).
    #[arg(long)]
    pub biometric: Option<f64>,
    /// Device trust score (0-100).
    #[arg(long)]
    pub device: Option<f64>,
    /// AML clearance score (0-100).
    #[arg(long)]
    pub aml: Option<f64>,
    /// Behavioral trust score (0-100).
    #[arg(long)]
    pub behavioral: Option<f64>,
    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct ScoreReport {
    pub aggregate: Score,
    pub band: DecisionBand,
    pub components: Vec<ResolvedComponent>,
}

impl ScoreArgs {
    pub fn component_scores(&self) -> ComponentScores {
        let mut scores = ComponentScores::default();
        let given = [
            (ScoreComponent::DocumentAuthenticity, self.document),
            (ScoreComponent::BiometricMatch, self.biometric),
            (ScoreComponent::DeviceTrust, self.device),
            (ScoreComponent::AmlClearance, self.aml),
            (ScoreComponent::BehavioralTrust, self.behavioral),
        ];
        for (component, value) in given {
            if let Some(v) = value {
                scores.set(component, Score::new(v));
            }
        }
        scores
    }
}

pub fn compute_score(args: &ScoreArgs, config: &EngineConfig) -> Result<ScoreReport> {
    let engine = RiskScoreEngine::new(config.risk, Arc::new(InMemorySnapshotLog::new()))?;
    let (aggregate, components) = engine.aggregate(&args.component_scores());
    Ok(ScoreReport {
        aggregate,
        band: engine.band(aggregate),
        components,
    })
}

/// Execute `kyc score`.
pub fn run_score(args: &ScoreArgs, config: &EngineConfig) -> Result<u8> {
    let report = compute_score(args, config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }
    println!("aggregate: {}", report.aggregate);
    println!("band:      {}", report.band);
    for c in &report.components {
        println!(
            "  {:<22} {:>6}  x {:.2} = {:>6.2}{}",
            c.component.as_str(),
            c.score.to_string(),
            c.weight,
            c.contribution(),
            if c.neutral_fallback { "  (neutral)" } else { "" }
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(document: f64, biometric: f64, device: f64, aml: f64, behavioral: f64) -> ScoreArgs {
        ScoreArgs {
            document: Some(document),
            biometric: Some(biometric),
            device: Some(device),
            aml: Some(aml),
            behavioral: Some(behavioral),
            json: false,
        }
    }

    #[test]
    fn full_scores_auto_approve() {
        let report = compute_score(&args(90.0, 92.0, 88.0, 95.0, 85.0), &EngineConfig::default())
            .unwrap();
        assert_eq!(report.aggregate, Score::new(90.8));
        assert_eq!(report.band, DecisionBand::AutoApprove);
        assert!(report.components.iter().all(|c| !c.neutral_fallback));
    }

    #[test]
    fn missing_components_are_neutral() {
        let partial = ScoreArgs {
            document: None,
            biometric: None,
            device: None,
            aml: None,
            behavioral: None,
            json: true,
        };
        let report = compute_score(&partial, &EngineConfig::default()).unwrap();
        assert_eq!(report.aggregate, Score::new(70.0));
        assert_eq!(report.band, DecisionBand::ManualReview);
        assert!(report.components.iter().all(|c| c.neutral_fallback));
    }
}
