//! # kyc-cli: Operator CLI for the KYC Engine
//!
//! ## Subcommands
//!
//! - `kyc score`: aggregate component scores and report the decision band.
//! - `kyc flow`: select a verification flow from a trust score or a
//!   device context file.
//! - `kyc simulate`: run a scenario file through the orchestrator with
//!   static collaborators.
//! - `kyc config`: validate or print the engine configuration.
//!
//! ```bash
//! kyc score --document 90 --biometric 92 --device 88 --aml 95 --behavioral 85
//! kyc flow --score 72
//! kyc simulate crates/kyc-cli/scenarios/fast_track.yaml
//! kyc --config engine.yaml config check
//! ```

pub mod config;
pub mod flow;
pub mod score;
pub mod simulate;

use std::path::Path;

use anyhow::{Context, Result};

use kyc_engine::EngineConfig;

/// Load the engine configuration from `path`, or from `KYC_CONFIG_PATH`
/// when no path is given, falling back to the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::from_yaml_file(p)
            .with_context(|| format!("failed to load configuration {}", p.display())),
        None => EngineConfig::from_env().context("failed to load configuration from environment"),
    }
}

/// Read and parse a YAML file.
pub fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}
