//! # Simulate Subcommand
//!
//! Runs a scenario file end to end through the orchestrator. The external
//! checks are replaced by static collaborators returning the scores in
//! the scenario; a collaborator left out is unconfigured and degrades to
//! the neutral score.
//!
//! ```yaml
//! subject: alice
//! device: { email_verified: true, phone_verified: true, fingerprint_trust: 88 }
//! collaborators: { document: 90, biometric: 92, aml: 95, behavioral: 85 }
//! steps:
//!   - step: pre_verification
//!     consent_given: true
//!   - step: document_upload
//!     documents:
//!       - { category: identity_proof, document_type: passport, artifact_ref: "blob://passport" }
//! review: { action: approve, reviewer: analyst-1 }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use kyc_core::{StepSet, Timestamp, VerificationStep};
use kyc_credential::{Credential, CredentialVerification, Ed25519Signer};
use kyc_engine::{
    Collaborators, EngineConfig, StaticAmlScreener, StaticBehavioralAnalyzer,
    StaticBiometricVerifier, StaticDocumentAnalyzer, StatusView, StepOrchestrator, StepPayload,
};
use kyc_review::ReviewDecision;
use kyc_risk::DeviceContext;
use kyc_state::SessionStatus;

/// Arguments for `kyc simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario YAML file.
    #[arg(value_name = "FILE")]
    pub scenario: PathBuf,
    /// Print the final session and credential as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Scores returned by the static collaborators.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticScores {
    pub document: Option<f64>,
    pub biometric: Option<f64>,
    pub aml: Option<f64>,
    pub behavioral: Option<f64>,
}

impl StaticScores {
    fn collaborators(&self) -> Collaborators {
        let mut c = Collaborators::default();
        if let Some(v) = self.document {
            c = c.with_documents(Arc::new(StaticDocumentAnalyzer::new(v)));
        }
        if let Some(v) = self.biometric {
            c = c.with_biometrics(Arc::new(StaticBiometricVerifier::uniform(v)));
        }
        if let Some(v) = self.aml {
            c = c.with_aml(Arc::new(StaticAmlScreener::clear(v)));
        }
        if let Some(v) = self.behavioral {
            c = c.with_behavior(Arc::new(StaticBehavioralAnalyzer::new(v)));
        }
        c
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    RequestMoreInfo,
}

/// Reviewer outcome applied if the session lands in manual review.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedReview {
    pub action: ReviewAction,
    pub reviewer: String,
    #[serde(default)]
    pub notes: String,
    /// Steps to re-open for `request_more_info`.
    #[serde(default)]
    pub steps: Vec<VerificationStep>,
}

impl ScriptedReview {
    fn decision(&self) -> ReviewDecision {
        match self.action {
            ReviewAction::Approve => ReviewDecision::Approved,
            ReviewAction::Reject => ReviewDecision::Rejected,
            ReviewAction::RequestMoreInfo => ReviewDecision::RequestMoreInfo {
                steps: StepSet::from_steps(&self.steps),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub subject: String,
    #[serde(default)]
    pub device: DeviceContext,
    #[serde(default)]
    pub collaborators: StaticScores,
    pub steps: Vec<StepPayload>,
    #[serde(default)]
    pub review: Option<ScriptedReview>,
}

#[derive(Debug, Serialize)]
pub struct SimulationOutcome {
    pub session: StatusView,
    pub snapshots: usize,
    pub credential: Option<Credential>,
    pub verification: Option<CredentialVerification>,
}

/// Drive `scenario` through a fresh orchestrator.
pub fn simulate(scenario: &Scenario, config: EngineConfig) -> Result<SimulationOutcome> {
    let orchestrator = StepOrchestrator::builder()
        .config(config)
        .signer(Arc::new(Ed25519Signer::generate("kyc-cli")))
        .collaborators(scenario.collaborators.collaborators())
        .build()?;

    let session = orchestrator.initiate_verification(&scenario.subject, &scenario.device)?;
    tracing::info!(session = %session.id, flow = %session.flow.flow_type, "scenario started");

    for payload in &scenario.steps {
        let step = payload.step();
        let receipt = orchestrator
            .complete_step(&session.id, step, payload.clone())
            .with_context(|| format!("step {step} failed"))?;
        tracing::info!(
            step = %step,
            status = %receipt.status.status,
            running_score = %receipt.status.running_risk_score,
            "step applied"
        );
    }

    let mut status = orchestrator.get_status(&session.id)?;
    if let (Some(review), Some(review_id)) = (&scenario.review, status.review_id) {
        if status.status == SessionStatus::PendingManualReview {
            status = orchestrator.resolve_manual_review(
                &review_id,
                review.decision(),
                &review.notes,
                &review.reviewer,
            )?;
        }
    }

    let credential = orchestrator.credential(&scenario.subject)?;
    let verification = match &credential {
        Some(c) => Some(orchestrator.verify_credential(c, &Timestamp::now())?),
        None => None,
    };
    Ok(SimulationOutcome {
        snapshots: orchestrator.risk_history(&session.id).len(),
        session: status,
        credential,
        verification,
    })
}

/// Execute `kyc simulate`.
pub fn run_simulate(args: &SimulateArgs, config: &EngineConfig) -> Result<u8> {
    let scenario: Scenario = crate::read_yaml(&args.scenario)?;
    let outcome = simulate(&scenario, *config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(0);
    }
    let s = &outcome.session;
    println!("session:   {}", s.session_id);
    println!("subject:   {}", s.subject_id);
    println!("flow:      {}", s.flow_type);
    println!("status:    {}", s.status);
    println!("decision:  {}", s.approval_decision);
    if let Some(score) = s.identity_integrity_score {
        println!("integrity: {score}");
    }
    println!("running:   {}", s.running_risk_score);
    println!("progress:  {}%", s.progress_percent);
    for a in &s.anomalies {
        println!("  anomaly {}: {}", a.kind, a.detail);
    }
    match (&outcome.credential, &outcome.verification) {
        (Some(c), Some(v)) => println!(
            "credential: {} ({}, revision {}, {:?})",
            c.id, c.status, c.revision, v
        ),
        _ => println!("credential: none"),
    }
    Ok(0)
}
