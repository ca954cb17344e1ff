//! # Engine Configuration
//!
//! Every section defaults to the built-in constants, so an empty YAML
//! document is a valid configuration:
//!
//! ```yaml
//! risk:
//!   weights: { document_authenticity: 0.35, biometric_match: 0.30,
//!              device_trust: 0.15, aml_clearance: 0.15, behavioral_trust: 0.05 }
//!   thresholds: { auto_approve: 85.0, manual_review: 60.0 }
//!   neutral_score: 70.0
//! flow:
//!   fast_track_min: 85.0
//!   standard_min: 60.0
//!   manual_review_anomalies: 2
//! credential:
//!   validity_days: 365
//! orchestrator:
//!   cas_retry_limit: 8
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use kyc_core::KycError;
use kyc_credential::DEFAULT_VALIDITY_DAYS;
use kyc_risk::{FlowConfig, RiskConfig};

/// Environment variable naming a YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "KYC_CONFIG_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub validity_days: i64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Attempts at a session compare-and-set before giving up with a
    /// storage error.
    pub cas_retry_limit: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { cas_retry_limit: 8 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub flow: FlowConfig,
    pub credential: CredentialConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, KycError> {
        let config: EngineConfig = serde_yaml::from_str(content)
            .map_err(|e| KycError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, KycError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KycError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load from the file named by `KYC_CONFIG_PATH`, or the defaults when
    /// the variable is unset.
    pub fn from_env() -> Result<Self, KycError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!(path = %path, "loading engine configuration");
                Self::from_yaml_file(Path::new(&path))
            }
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), KycError> {
        self.risk.validate()?;
        self.flow.validate()?;
        if self.credential.validity_days <= 0 {
            return Err(KycError::Config(format!(
                "credential validity must be positive, got {} days",
                self.credential.validity_days
            )));
        }
        if self.orchestrator.cas_retry_limit == 0 {
            return Err(KycError::Config("cas_retry_limit must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = EngineConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.risk.weights.document_authenticity, 0.35);
        assert_eq!(config.flow.manual_review_anomalies, 2);
        assert_eq!(config.credential.validity_days, 365);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = EngineConfig::from_yaml_str(
            "risk:\n  thresholds:\n    auto_approve: 90.0\ncredential:\n  validity_days: 30\n",
        )
        .unwrap();
        assert_eq!(config.risk.thresholds.auto_approve, 90.0);
        assert_eq!(config.risk.thresholds.manual_review, 60.0);
        assert_eq!(config.credential.validity_days, 30);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = EngineConfig::from_yaml_str("risk:\n  weights:\n    behavioral_trust: 0.5\n")
            .unwrap_err();
        assert!(matches!(err, KycError::Config(_)));
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let err = EngineConfig::from_yaml_str(
            "risk:\n  thresholds:\n    auto_approve: 50.0\n    manual_review: 60.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("manual_review < auto_approve"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "orchestrator:\n  cas_retry_limit: 3").unwrap();
        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.orchestrator.cas_retry_limit, 3);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_yaml_file(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, KycError::Config(_)));
    }
}
