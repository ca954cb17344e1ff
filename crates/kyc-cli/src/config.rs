//! # Config Subcommand
//!
//! `check` validates a configuration file; `show` prints the effective
//! configuration (defaults merged with the file) as YAML.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use kyc_engine::EngineConfig;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate a configuration file.
    Check {
        /// File to check. Defaults to the global `--config` file.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print the effective configuration.
    Show,
}

/// Execute `kyc config`. `effective` is the configuration loaded from the
/// global options.
pub fn run_config(args: &ConfigArgs, effective: &EngineConfig) -> Result<u8> {
    match &args.command {
        ConfigCommand::Check { file: Some(path) } => match crate::load_config(Some(path)) {
            Ok(_) => {
                println!("OK: {}", path.display());
                Ok(0)
            }
            Err(e) => {
                println!("FAIL: {e:#}");
                Ok(1)
            }
        },
        ConfigCommand::Check { file: None } => {
            effective.validate()?;
            println!("OK: effective configuration is valid");
            Ok(0)
        }
        ConfigCommand::Show => {
            print!("{}", serde_yaml::to_string(effective)?);
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reports_failure_as_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "orchestrator:\n  cas_retry_limit: 0\n").unwrap();
        let args = ConfigArgs {
            command: ConfigCommand::Check { file: Some(path) },
        };
        assert_eq!(run_config(&args, &EngineConfig::default()).unwrap(), 1);
    }

    #[test]
    fn shown_config_round_trips() {
        let yaml = serde_yaml::to_string(&EngineConfig::default()).unwrap();
        assert_eq!(EngineConfig::from_yaml_str(&yaml).unwrap(), EngineConfig::default());
    }
}
