use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::PathBuf;

use equity_valuation_core::config::ValuationConfig;
use equity_valuation_core::pipeline::{
    CompanyData, ComparableCompany, StaticDataProvider, ValuationPipeline, ValuationRequest,
};
use equity_valuation_core::scenarios::sensitivity::{
    build_dcf_sensitivity, centered_sweep, SensitivityInput,
};
use equity_valuation_core::valuation::dcf::{value_dcf, DcfInput, TerminalKind};
use equity_valuation_core::valuation::wacc::{estimate_wacc, WaccInput};

use crate::commands::analysis::{projected_rows, ProjectionArgs};
use crate::input;
use crate::output::report::CsvReportExporter;

/// Arguments for the full valuation pipeline
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ValueArgs {
    /// Ticker the statements belong to
    #[arg(long, default_value = "TICKER")]
    pub ticker: String,

    #[command(flatten)]
    pub projection: ProjectionArgs,

    /// Latest share price (market cap = price × shares)
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Market capitalisation; takes precedence over price × shares
    #[arg(long)]
    pub market_cap: Option<Decimal>,

    /// Observed equity beta
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Purchase price; runs the LBO base case and sweep when given
    #[arg(long)]
    pub purchase_price: Option<Decimal>,

    /// JSON array of comparable companies
    #[arg(long)]
    pub comparables: Option<String>,

    /// Directory to write one CSV per report section into
    #[arg(long)]
    pub export_dir: Option<PathBuf>,
}

/// Arguments for WACC estimation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct WaccArgs {
    /// Market value of equity
    #[arg(long)]
    pub equity_value: Option<Decimal>,

    /// Value of debt for the capital weights (net debt)
    #[arg(long)]
    pub debt_value: Option<Decimal>,

    /// Debt the interest accrues on; cost-of-debt denominator
    #[arg(long)]
    pub gross_debt: Option<Decimal>,

    /// Interest expense, either sign
    #[arg(long)]
    pub interest_expense: Option<Decimal>,

    /// Marginal corporate tax rate
    #[arg(long)]
    pub tax_rate: Option<Decimal>,

    /// Risk-free rate (e.g. 0.035 for 3.5%)
    #[arg(long)]
    pub risk_free_rate: Option<Decimal>,

    /// Market risk premium (e.g. 0.06 for 6%)
    #[arg(long, alias = "erp")]
    pub market_risk_premium: Option<Decimal>,

    /// Observed levered beta
    #[arg(long)]
    pub beta: Option<Decimal>,

    /// Beta replacing any observed value
    #[arg(long)]
    pub beta_override: Option<Decimal>,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for DCF valuation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DcfArgs {
    /// Path to a JSON DcfInput (projections, wacc, terminal)
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub projection: ProjectionArgs,

    /// Discount rate
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Terminal method: gordon or exit_multiple
    #[arg(long, default_value = "gordon")]
    pub terminal: TerminalKind,

    /// Terminal growth or exit multiple; configured default when omitted
    #[arg(long)]
    pub terminal_param: Option<Decimal>,

    /// Net debt for the equity bridge
    #[arg(long)]
    pub net_debt: Option<Decimal>,

    /// Shares outstanding for per-share value
    #[arg(long)]
    pub shares: Option<Decimal>,
}

/// Arguments for the DCF sensitivity grid
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct SensitivityArgs {
    /// Path to a JSON SensitivityInput
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub projection: ProjectionArgs,

    /// Centre of the discount-rate axis
    #[arg(long)]
    pub wacc: Option<Decimal>,

    /// Terminal method: gordon or exit_multiple
    #[arg(long, default_value = "gordon")]
    pub terminal: TerminalKind,

    /// Column values (comma-separated); configured growth rates when omitted
    #[arg(long, value_delimiter = ',')]
    pub params: Option<Vec<Decimal>>,
}

pub fn run_value(args: ValueArgs, config: &ValuationConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let statements = input::statements::load_statements(args.projection.statements.as_deref())?;
    let mut data = CompanyData::new(statements);
    data.price = args.price;
    data.market_cap = args.market_cap;
    data.beta = args.beta;
    if let Some(ref path) = args.comparables {
        data.comparables = input::file::read_json::<Vec<ComparableCompany>>(path)?;
    }
    let provider = StaticDataProvider::new().with_company(args.ticker.clone(), data);

    let request = ValuationRequest {
        ticker: args.ticker,
        years: args.projection.years,
        revenue_growth: args.projection.growth.ok_or("--growth is required")?,
        purchase_price: args.purchase_price,
        output_path: args.export_dir,
    };

    let exporter = CsvReportExporter;
    let result = ValuationPipeline::new(&provider, config.clone())
        .with_comparables(&provider)
        .with_exporter(&exporter)
        .run(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_wacc(args: WaccArgs, config: &ValuationConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let wacc_input: WaccInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        WaccInput {
            equity_value: args.equity_value,
            debt_value: args.debt_value,
            gross_debt: args.gross_debt,
            interest_expense: args.interest_expense,
            tax_rate: args.tax_rate,
            observed_tax_rate: None,
            risk_free_rate: args.risk_free_rate,
            market_risk_premium: args.market_risk_premium,
            observed_beta: args.beta,
            beta_override: args.beta_override,
        }
    };

    let result = estimate_wacc(&wacc_input, &config.wacc)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_dcf(args: DcfArgs, config: &ValuationConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let dcf_input: DcfInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if args.projection.statements.is_some() {
        let parameter = args.terminal_param.unwrap_or(match args.terminal {
            TerminalKind::Gordon => config.dcf.terminal_growth,
            TerminalKind::ExitMultiple => config.dcf.exit_multiple,
        });
        DcfInput {
            projections: projected_rows(&args.projection, config)?,
            wacc: args.wacc.ok_or("--wacc is required with --statements")?,
            terminal: args.terminal.with_parameter(parameter),
            net_debt: args.net_debt,
            shares_outstanding: args.shares,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --statements <file> or stdin required for DCF".into());
    };

    let result = value_dcf(&dcf_input, &config.dcf)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_sensitivity(
    args: SensitivityArgs,
    config: &ValuationConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let sens_input: SensitivityInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if args.projection.statements.is_some() {
        let centre = args.wacc.ok_or("--wacc is required with --statements")?;
        let terminal_parameters = match (args.params, args.terminal) {
            (Some(params), _) => params,
            (None, TerminalKind::Gordon) => config.sensitivity.terminal_growth_rates.clone(),
            (None, TerminalKind::ExitMultiple) => {
                return Err("--params is required for an exit-multiple grid".into())
            }
        };
        SensitivityInput {
            projections: projected_rows(&args.projection, config)?,
            discount_rates: centered_sweep(
                centre,
                config.sensitivity.wacc_step,
                config.sensitivity.wacc_points,
            ),
            terminal_parameters,
            terminal_kind: args.terminal,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --statements <file> or stdin required for sensitivity".into());
    };

    let result = build_dcf_sensitivity(&sens_input, &config.dcf)?;
    Ok(serde_json::to_value(result)?)
}
