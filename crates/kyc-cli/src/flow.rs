//! # Flow Subcommand
//!
//! Shows which verification flow a trust score (or a device context file)
//! selects, and the steps that flow requires.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use kyc_core::Score;
use kyc_engine::EngineConfig;
use kyc_risk::{assess_initial_risk, AdaptiveFlowSelector, DeviceContext, InitialAssessment};
use kyc_state::FlowPlan;

/// Arguments for `kyc flow`.
#[derive(Args, Debug)]
pub struct FlowArgs {
    /// Initial trust score (0-100).
    #[arg(long, conflicts_with = "device")]
    pub score: Option<f64>,
    /// YAML device context to assess instead of a raw score.
    #[arg(long, value_name = "FILE")]
    pub device: Option<PathBuf>,
    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct FlowReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<InitialAssessment>,
    pub score: Score,
    pub plan: FlowPlan,
}

pub fn select(
    score: Option<f64>,
    device: Option<&DeviceContext>,
    config: &EngineConfig,
) -> Result<FlowReport> {
    let selector = AdaptiveFlowSelector::new(config.flow)?;
    let (score, assessment) = match (score, device) {
        (_, Some(ctx)) => {
            let assessment = assess_initial_risk(ctx);
            (assessment.score, Some(assessment))
        }
        (Some(v), None) => (Score::new(v), None),
        (None, None) => bail!("either --score or --device is required"),
    };
    Ok(FlowReport {
        assessment,
        score,
        plan: selector.select_flow(score),
    })
}

/// Execute `kyc flow`.
pub fn run_flow(args: &FlowArgs, config: &EngineConfig) -> Result<u8> {
    let device: Option<DeviceContext> = match &args.device {
        Some(path) => Some(crate::read_yaml(path)?),
        None => None,
    };
    let report = select(args.score, device.as_ref(), config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }
    if let Some(a) = &report.assessment {
        println!("device trust: {}", a.device_trust);
        for factor in &a.factors {
            println!("  - {factor}");
        }
    }
    println!("score:    {}", report.score);
    println!("flow:     {}", report.plan.flow_type);
    println!("required: {}", report.plan.required_steps);
    println!("optional: {}", report.plan.optional_steps);
    println!("estimate: {} min", report.plan.estimated_minutes);
    if report.plan.manual_review_forced {
        println!("manual review is forced for this flow");
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::FlowType;

    #[test]
    fn band_edges() {
        let config = EngineConfig::default();
        let at = |v| select(Some(v), None, &config).unwrap().plan.flow_type;
        assert_eq!(at(85.0), FlowType::FastTrack);
        assert_eq!(at(84.99), FlowType::Standard);
        assert_eq!(at(60.0), FlowType::Standard);
        assert_eq!(at(59.99), FlowType::DeepVerification);
    }

    #[test]
    fn device_context_takes_precedence() {
        let device = DeviceContext {
            email_verified: true,
            phone_verified: true,
            ..Default::default()
        };
        let report = select(None, Some(&device), &EngineConfig::default()).unwrap();
        assert_eq!(report.score, Score::new(100.0));
        assert!(report.assessment.is_some());
    }

    #[test]
    fn input_required() {
        assert!(select(None, None, &EngineConfig::default()).is_err());
    }
}
