//! replica-guard CLI
//!
//! Runs the replica quality checks as a pipeline step and exits with
//! 0 (all good), 1 (errors, or warnings with `--fail-on-warning`) or
//! 2 (the run itself failed).

use clap::{Parser, ValueEnum};
use replica_guard::logging::setup::{init_logging, LoggingConfig};
use replica_guard::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Validate replicated warehouse tables", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "replica-guard.toml")]
    config: PathBuf,

    /// Target environment: local, staging (dev) or production (prod)
    #[arg(short, long, default_value = "local")]
    env: Environment,

    /// Tables to validate; defaults to `default_tables` from the configuration
    #[arg(short, long, num_args = 1..)]
    tables: Vec<String>,

    /// Comma-separated checks to run
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "count,duplicates,referential,freshness"
    )]
    checks: Vec<CheckKind>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Disable ANSI colors in the human report
    #[arg(long)]
    no_color: bool,

    /// Exit with status 1 when any check reports a warning
    #[arg(long)]
    fail_on_warning: bool,

    /// Log level for replica-guard (logs go to stderr)
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let logging = if args.json_logs {
        LoggingConfig::production()
    } else {
        LoggingConfig::default()
    }
    .with_guard_level(args.log_level);
    if let Err(e) = init_logging(logging) {
        eprintln!("replica-guard: failed to initialise logging: {e}");
    }

    match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "validation run aborted");
            eprintln!("replica-guard: {e}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: &Args) -> Result<ExitCode> {
    let config = Arc::new(ValidationConfig::load(&args.config)?);

    let engine = ValidationEngine::from_config(config.clone())?
        .with_log_config(LogConfig::for_level(args.log_level));

    let tables: Option<&[String]> = if !args.tables.is_empty() {
        Some(&args.tables)
    } else if !config.default_tables.is_empty() {
        Some(&config.default_tables)
    } else {
        None
    };

    let report = engine.run(args.env, tables, &args.checks).await?;

    let output = match args.format {
        OutputFormat::Human => {
            let formatter_config = FormatterConfig::default().with_colors(!args.no_color);
            HumanFormatter::with_config(formatter_config).format(&report)?
        }
        OutputFormat::Json => JsonFormatter::new().format(&report)?,
    };
    println!("{output}");

    let failed = report.has_errors() || (args.fail_on_warning && report.has_warnings());
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
