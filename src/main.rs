//! loanledger - loan dispute reconciliation and user activity summaries
//!
//! A CLI tool that keeps a JSON snapshot of loans, their disputes and
//! user interaction events. Disputes are reconciled against each loan's
//! history to derive its status; interactions are aggregated per user.
//!
//! Exit codes:
//!   0 - Success (stale disputes are ignored, not errors)
//!   1 - Runtime or validation error (unknown loan, index gap, bad data, ...)
//!   2 - An import batch had records rejected (the others were applied)

mod analysis;
mod cli;
mod config;
mod error;
mod ledger;
mod models;
mod report;
mod service;
mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, Command, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use ledger::Outcome;
use models::IncomingDispute;
use report::{AggregateReport, ReportMetadata};
use service::LedgerService;
use std::path::{Path, PathBuf};
use std::time::Instant;
use store::SnapshotStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Where the effective configuration came from.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Defaults,
    DefaultsAfterError(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if matches!(args.command, Command::InitConfig) {
        return handle_init_config();
    }

    // Config is read before logging so `general.verbose` can raise the level
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("loanledger v{}", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
        ConfigSource::DefaultFile => info!("Loaded default config from {}", DEFAULT_CONFIG_FILE),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::DefaultsAfterError(e) => warn!("Failed to load config: {}", e),
    }
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .loanledger.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the data file, shard count and report format.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::Defaults)),
        Err(e) => Ok((
            Config::default(),
            ConfigSource::DefaultsAfterError(format!("{:#}", e)),
        )),
    }
}

/// Run the selected command. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let store = SnapshotStore::new(&config.general.data_path);
    debug!("Using data file: {}", store.path().display());
    let service = LedgerService::open(store).await?;

    match args.command {
        Command::Dispute {
            loan,
            index,
            state,
            created_at,
        } => {
            let incoming = IncomingDispute {
                loan_id: loan,
                dispute_index: index,
                state: state.into(),
                created_at,
            };
            handle_dispute(&service, incoming, args.quiet).await
        }
        Command::Import { file } => handle_import(&service, &file, args.quiet).await,
        Command::Status { loan_id, .. } => handle_status(&service, &loan_id, &config).await,
        Command::Aggregate { .. } => handle_aggregate(&service, &config, args.quiet).await,
        Command::InitConfig => handle_init_config().map(|_| 0),
    }
}

/// Reconcile one dispute and print the outcome.
async fn handle_dispute(service: &LedgerService, incoming: IncomingDispute, quiet: bool) -> Result<i32> {
    match service.submit_dispute(incoming).await? {
        Ok(result) => {
            if !quiet {
                match result.outcome {
                    Outcome::Appended => println!(
                        "✅ Dispute {} added to loan {}",
                        result.dispute_index, result.loan_id
                    ),
                    Outcome::Superseded => println!(
                        "✅ Dispute {} of loan {} updated",
                        result.dispute_index, result.loan_id
                    ),
                    Outcome::Stale => println!(
                        "ℹ️  Dispute {} of loan {} is not newer than the one on file; ignored",
                        result.dispute_index, result.loan_id
                    ),
                }
                println!("   Loan status: {}", result.new_status);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("❌ Rejected: {}", e);
            Ok(1)
        }
    }
}

/// Reconcile a batch file and print a summary.
async fn handle_import(service: &LedgerService, file: &Path, quiet: bool) -> Result<i32> {
    let batch = store::load_dispute_batch(file).await?;
    info!("Importing {} disputes from {}", batch.len(), file.display());

    let report = service.submit_batch(batch).await?;

    for entry in &report.entries {
        if let Err(ref e) = entry.result {
            eprintln!(
                "❌ Rejected dispute {} for loan {}: {}",
                entry.incoming.dispute_index, entry.incoming.loan_id, e
            );
        }
    }

    if !quiet {
        println!("\n📊 Import Summary:");
        println!("   Records: {}", report.entries.len());
        println!("   Accepted: {}", report.accepted());
        println!("   Stale (ignored): {}", report.stale());
        println!("   Rejected: {}", report.rejected());
    }

    Ok(if report.rejected() > 0 { 2 } else { 0 })
}

/// Print a loan's status and dispute history.
async fn handle_status(service: &LedgerService, loan_id: &str, config: &Config) -> Result<i32> {
    let view = service.loan_status(loan_id).await?;

    let output = match config.report.format {
        OutputFormat::Json => report::generate_loan_json(&view)?,
        OutputFormat::Markdown => report::generate_loan_markdown(&view),
    };
    println!("{}", output);
    Ok(0)
}

/// Aggregate interactions and write or print the report.
async fn handle_aggregate(service: &LedgerService, config: &Config, quiet: bool) -> Result<i32> {
    let start_time = Instant::now();
    let shards = config.aggregation.shards;

    let users = service.aggregate_interactions(shards).await?;
    let interactions: usize = users.values().map(|u| u.total_events as usize).sum();

    let report = AggregateReport {
        metadata: ReportMetadata {
            data_path: config.general.data_path.clone(),
            generated_at: Utc::now(),
            interactions,
            shards,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        users,
    };

    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    if config.report.output.is_empty() {
        println!("{}", output);
        return Ok(0);
    }

    let path = Path::new(&config.report.output);
    std::fs::write(path, &output)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    if !quiet {
        println!("\n📊 Aggregation Summary:");
        println!("   Users: {}", report.users.len());
        println!("   Interactions: {}", report.metadata.interactions);
        println!("   Duration: {:.3}s", report.metadata.duration_seconds);
        println!("\n✅ Report saved to: {}", path.display());
    }

    Ok(0)
}
