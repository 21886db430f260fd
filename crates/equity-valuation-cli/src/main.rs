mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::analysis::{ProjectionArgs, RatiosArgs};
use commands::pe::{LboArgs, LboSweepArgs, ReturnsArgs};
use commands::valuation::{DcfArgs, SensitivityArgs, ValueArgs, WaccArgs};

/// Equity valuation from historical statements
#[derive(Parser)]
#[command(
    name = "evx",
    version,
    about = "Equity valuation from historical financial statements",
    long_about = "A CLI for valuing a company from its statement history with decimal \
                  precision. Computes ratios, projects free cash flow, estimates WACC, \
                  runs a DCF with a sensitivity grid and models leveraged buyouts."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Configuration file (.yaml, .yml or .json); built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log to stderr; repeat for more detail (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: ratios, projection, WACC, DCF, sensitivity, LBO
    Value(ValueArgs),
    /// Compute per-period financial ratios
    Ratios(RatiosArgs),
    /// Project free cash flow to the firm
    Project(ProjectionArgs),
    /// Calculate Weighted Average Cost of Capital (CAPM build-up)
    Wacc(WaccArgs),
    /// Run a Discounted Cash Flow valuation
    Dcf(DcfArgs),
    /// Equity value across discount rates and terminal parameters
    Sensitivity(SensitivityArgs),
    /// Simulate a single leveraged buyout
    Lbo(LboArgs),
    /// Run an LBO over a grid of equity ratios, rates and exit multiples
    LboSweep(LboSweepArgs),
    /// Calculate sponsor returns (IRR, MOIC, Cash-on-Cash)
    Returns(ReturnsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match input::config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Value(args) => commands::valuation::run_value(args, &config),
        Commands::Ratios(args) => commands::analysis::run_ratios(args),
        Commands::Project(args) => commands::analysis::run_project(args, &config),
        Commands::Wacc(args) => commands::valuation::run_wacc(args, &config),
        Commands::Dcf(args) => commands::valuation::run_dcf(args, &config),
        Commands::Sensitivity(args) => commands::valuation::run_sensitivity(args, &config),
        Commands::Lbo(args) => commands::pe::run_lbo(args, &config),
        Commands::LboSweep(args) => commands::pe::run_lbo_sweep_cmd(args, &config),
        Commands::Returns(args) => commands::pe::run_returns(args),
        Commands::Version => {
            println!("evx {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
