//! `margin-reconcile` command line front end.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use margin_reconciliation::{run_analysis, InputFiles, PipelineConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "margin-reconcile")]
#[command(version, about = "Monthly project margin reconciliation", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation for one month
    Run {
        /// Month label, e.g. November2025 or Nov2025
        #[arg(long)]
        month: String,

        /// Revenue forecast export (CSV)
        #[arg(long)]
        proforma: PathBuf,

        /// Compensation export (CSV)
        #[arg(long)]
        compensation: PathBuf,

        /// Logged hours export (CSV)
        #[arg(long)]
        hours: PathBuf,

        /// Expenses export (CSV)
        #[arg(long)]
        expenses: PathBuf,

        /// P&L ledger export (CSV)
        #[arg(long)]
        pl: PathBuf,

        /// Directory holding settings.json, cost_centers.csv and pnl_account_tags.csv
        #[arg(long, default_value = "config")]
        config_dir: PathBuf,

        /// Root directory; outputs land in <output-dir>/<month>/
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
    },

    /// Print the JSON schema of settings.json
    Schema,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run {
            month,
            proforma,
            compensation,
            hours,
            expenses,
            pl,
            config_dir,
            output_dir,
        } => {
            let files = InputFiles {
                proforma,
                compensation,
                hours,
                expenses,
                pnl: pl,
            };
            cmd_run(&month, &files, config_dir, output_dir)?;
        }

        Commands::Schema => {
            println!("{}", PipelineConfig::schema_as_json()?);
        }
    }

    Ok(())
}

fn cmd_run(
    month: &str,
    files: &InputFiles,
    config_dir: PathBuf,
    output_dir: PathBuf,
) -> anyhow::Result<()> {
    let missing = files.missing();
    if !missing.is_empty() {
        eprintln!("Missing input files:");
        for (label, path) in &missing {
            eprintln!("  - {}: {}", label, path.display());
        }
        bail!("{} input file(s) not found", missing.len());
    }

    let config = PipelineConfig::load_dir(&config_dir)
        .with_context(|| format!("loading configuration from {}", config_dir.display()))?;

    let (result, dir) = run_analysis(month, files, &config, &output_dir)?;

    println!("Validation: {}", result.validation.summary());
    for warning in result.validation.warnings() {
        println!("  ⚠ {}", warning);
    }
    println!(
        "{} revenue centers, {} cost centers, {} non-revenue clients",
        result.revenue_centers.len(),
        result.cost_centers.len(),
        result.non_revenue_clients.len()
    );
    println!("Outputs: {}", dir.display());

    Ok(())
}
