//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::DisputeState;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// loanledger - loan dispute reconciliation and user activity summaries
///
/// Reconciles disputes filed against loans, derives each loan's status
/// from its dispute history, and aggregates user interaction events.
///
/// Examples:
///   loanledger dispute --loan L1 --index 0 --state open --created-at 1
///   loanledger import --file disputes.json
///   loanledger status L1
///   loanledger aggregate --shards 4 --format json
///   loanledger init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the JSON data file
    ///
    /// Defaults to `general.data_path` from the config file, or data.json.
    #[arg(short, long, value_name = "FILE", env = "LOANLEDGER_DATA", global = true)]
    pub data: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .loanledger.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reconcile a single dispute against a loan
    Dispute {
        /// Loan the dispute is filed against
        #[arg(long, value_name = "ID")]
        loan: String,

        /// Position of the dispute in the loan's history
        #[arg(long, value_name = "N")]
        index: usize,

        /// Dispute state
        #[arg(long, value_enum)]
        state: StateArg,

        /// Logical filing time
        #[arg(long, value_name = "T", allow_negative_numbers = true)]
        created_at: i64,
    },

    /// Reconcile a JSON array of disputes, in order
    Import {
        /// Batch file
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Show a loan's status and dispute history
    Status {
        /// Loan to show
        #[arg(value_name = "LOAN_ID")]
        loan_id: String,

        /// Output format (markdown, json)
        #[arg(long, value_name = "FORMAT")]
        format: Option<OutputFormat>,
    },

    /// Aggregate user interactions into per-user summaries
    Aggregate {
        /// Number of shards to aggregate in parallel
        #[arg(long, value_name = "NUM")]
        shards: Option<usize>,

        /// Output format (markdown, json)
        #[arg(long, value_name = "FORMAT")]
        format: Option<OutputFormat>,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Generate a default .loanledger.toml configuration file
    InitConfig,
}

/// Output format for reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Dispute state as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StateArg {
    Open,
    Closed,
    #[value(name = "fraud_investigation", alias = "fraud")]
    FraudInvestigation,
}

impl From<StateArg> for DisputeState {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Open => DisputeState::Open,
            StateArg::Closed => DisputeState::Closed,
            StateArg::FraudInvestigation => DisputeState::FraudInvestigation,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref data) = self.data {
            if data.is_dir() {
                return Err(format!("Data path is a directory: {}", data.display()));
            }
        }

        match &self.command {
            Command::Dispute { loan, .. } if loan.trim().is_empty() => {
                Err("Loan ID must not be empty".to_string())
            }
            Command::Import { file } if !file.is_file() => {
                Err(format!("Batch file does not exist: {}", file.display()))
            }
            Command::Aggregate {
                shards: Some(0), ..
            } => Err("Shards must be at least 1".to_string()),
            _ => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` comes from the configuration file; `--quiet` wins.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args(command: Command) -> Args {
        Args {
            data: None,
            config: None,
            verbose: false,
            quiet: false,
            command,
        }
    }

    #[test]
    fn test_parse_dispute() {
        let args = Args::try_parse_from([
            "loanledger",
            "dispute",
            "--loan",
            "L1",
            "--index",
            "0",
            "--state",
            "fraud_investigation",
            "--created-at",
            "3",
            "-v",
        ])
        .unwrap();

        assert!(args.verbose);
        match args.command {
            Command::Dispute {
                loan,
                index,
                state,
                created_at,
            } => {
                assert_eq!(loan, "L1");
                assert_eq!(index, 0);
                assert_eq!(DisputeState::from(state), DisputeState::FraudInvestigation);
                assert_eq!(created_at, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_negative_index() {
        let result = Args::try_parse_from([
            "loanledger",
            "dispute",
            "--loan",
            "L1",
            "--index",
            "-1",
            "--state",
            "open",
            "--created-at",
            "3",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_aggregate() {
        let args =
            Args::try_parse_from(["loanledger", "aggregate", "--shards", "4", "--format", "json"])
                .unwrap();
        match args.command {
            Command::Aggregate { shards, format, output } => {
                assert_eq!(shards, Some(4));
                assert_eq!(format, Some(OutputFormat::Json));
                assert!(output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_validation_zero_shards() {
        let args = make_args(Command::Aggregate {
            shards: Some(0),
            format: None,
            output: None,
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_batch_file() {
        let args = make_args(Command::Import {
            file: PathBuf::from("/nonexistent/batch.json"),
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args(Command::InitConfig);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args(Command::InitConfig);
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
