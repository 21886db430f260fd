use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use equity_valuation_core::config::ValuationConfig;
use equity_valuation_core::ratios::calculate_ratios;
use equity_valuation_core::valuation::projection::{project_cash_flows, ProjectionInput, ProjectionRow};

use crate::input;

/// Arguments for ratio calculation
#[derive(Args)]
pub struct RatiosArgs {
    /// Statement table (.json or .csv); JSON on stdin when omitted
    #[arg(long)]
    pub statements: Option<String>,
}

/// Arguments shared by every command that projects from a statement table
#[derive(Args, Clone)]
#[command(allow_hyphen_values = true)]
pub struct ProjectionArgs {
    /// Statement table (.json or .csv); JSON on stdin when omitted
    #[arg(long)]
    pub statements: Option<String>,

    /// Projection years
    #[arg(long, default_value = "5")]
    pub years: u32,

    /// Annual revenue growth (e.g. 0.05 for 5%)
    #[arg(long)]
    pub growth: Option<Decimal>,
}

pub fn run_ratios(args: RatiosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let statements = input::statements::load_statements(args.statements.as_deref())?;
    let result = calculate_ratios(&statements)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_project(args: ProjectionArgs, config: &ValuationConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let statements = input::statements::load_statements(args.statements.as_deref())?;
    let ratios = calculate_ratios(&statements)?.result;
    let result = project_cash_flows(&ratios, &projection_input(&args)?, &config.projection)?;
    Ok(serde_json::to_value(result)?)
}

/// Statements → ratios → projected rows, for commands that value a projection.
pub(crate) fn projected_rows(
    args: &ProjectionArgs,
    config: &ValuationConfig,
) -> Result<Vec<ProjectionRow>, Box<dyn std::error::Error>> {
    let statements = input::statements::load_statements(args.statements.as_deref())?;
    let ratios = calculate_ratios(&statements)?.result;
    let projection = project_cash_flows(&ratios, &projection_input(args)?, &config.projection)?;
    Ok(projection.result.rows)
}

fn projection_input(args: &ProjectionArgs) -> Result<ProjectionInput, Box<dyn std::error::Error>> {
    Ok(ProjectionInput {
        years: args.years,
        revenue_growth: args.growth.ok_or("--growth is required")?,
    })
}
