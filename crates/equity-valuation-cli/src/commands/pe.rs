use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use equity_valuation_core::config::{LboConfig, ValuationConfig};
use equity_valuation_core::pe::lbo::{simulate_lbo, LboInput, RepaymentPolicy};
use equity_valuation_core::pe::returns::{calculate_returns, ReturnsInput};
use equity_valuation_core::pe::structure::LboStructure;
use equity_valuation_core::pe::sweep::{run_lbo_sweep, LboSweepInput};

use crate::commands::analysis::{projected_rows, ProjectionArgs};
use crate::input;

/// Arguments for a single LBO scenario
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct LboArgs {
    /// Path to a JSON LboInput (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub projection: ProjectionArgs,

    /// Purchase price funded by sponsor equity and debt
    #[arg(long)]
    pub purchase_price: Option<Decimal>,

    /// Share of the purchase price funded by equity
    #[arg(long)]
    pub equity_ratio: Option<Decimal>,

    /// Annual interest rate on acquisition debt
    #[arg(long)]
    pub interest_rate: Option<Decimal>,

    /// Exit multiple applied to the exit-year figure
    #[arg(long)]
    pub exit_multiple: Option<Decimal>,

    /// Share of available cash applied to debt (1 = full sweep)
    #[arg(long)]
    pub sweep_fraction: Option<Decimal>,

    /// Exit year; last projected year when omitted
    #[arg(long)]
    pub exit_year: Option<i32>,
}

/// Arguments for the LBO scenario grid
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct LboSweepArgs {
    /// Path to a JSON LboSweepInput (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub projection: ProjectionArgs,

    /// Purchase price shared by every scenario
    #[arg(long)]
    pub purchase_price: Option<Decimal>,

    /// Equity ratios to sweep (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub equity_ratios: Option<Vec<Decimal>>,

    /// Interest rates to sweep (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub interest_rates: Option<Vec<Decimal>>,

    /// Exit multiples to sweep (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exit_multiples: Option<Vec<Decimal>>,
}

/// Arguments for sponsor returns on explicit cash flows
#[derive(Args)]
pub struct ReturnsArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Equity invested at entry
    #[arg(long)]
    pub entry_equity: Option<Decimal>,

    /// Equity received at exit
    #[arg(long)]
    pub exit_equity: Option<Decimal>,

    /// Annual equity cash flows (comma-separated, e.g. "-100,0,0,180")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub cash_flows: Option<Vec<Decimal>>,
}

pub fn run_lbo(args: LboArgs, config: &ValuationConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let lbo_input: LboInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if args.projection.statements.is_some() {
        let cfg = &config.lbo;
        let structure = LboStructure::from_purchase_price(
            purchase_price(args.purchase_price, cfg)?,
            args.equity_ratio.unwrap_or(cfg.equity_ratio),
        )?;
        let repayment = match args.sweep_fraction {
            Some(f) if f == Decimal::ONE => RepaymentPolicy::FullCashSweep,
            Some(fraction) => RepaymentPolicy::FractionalSweep { fraction },
            None => cfg.repayment,
        };
        LboInput {
            projections: projected_rows(&args.projection, config)?,
            initial_debt: structure.debt,
            equity_contribution: structure.equity_contribution,
            interest_rate: args.interest_rate.unwrap_or(cfg.interest_rate),
            repayment,
            exit_year: args.exit_year,
            exit_multiple: args.exit_multiple.unwrap_or(cfg.exit_multiple),
            exit_basis: cfg.exit_basis,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --statements <file> or stdin required for LBO".into());
    };

    let result = simulate_lbo(&lbo_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_lbo_sweep_cmd(
    args: LboSweepArgs,
    config: &ValuationConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let sweep_input: LboSweepInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if args.projection.statements.is_some() {
        let cfg = &config.lbo;
        LboSweepInput {
            projections: projected_rows(&args.projection, config)?,
            purchase_price: purchase_price(args.purchase_price, cfg)?,
            equity_ratios: args
                .equity_ratios
                .unwrap_or_else(|| cfg.sweep_equity_ratios.clone()),
            interest_rates: args
                .interest_rates
                .unwrap_or_else(|| cfg.sweep_interest_rates.clone()),
            exit_multiples: args
                .exit_multiples
                .unwrap_or_else(|| cfg.sweep_exit_multiples.clone()),
            repayment: cfg.repayment,
            exit_basis: cfg.exit_basis,
            exit_year: None,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --statements <file> or stdin required for LBO sweep".into());
    };

    let result = run_lbo_sweep(&sweep_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_returns(args: ReturnsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let returns_input: ReturnsInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        let cash_flows = args
            .cash_flows
            .ok_or("--cash-flows is required (or provide --input)")?;
        let entry_equity = match args.entry_equity {
            Some(e) => e,
            None => cash_flows.first().map(|cf| -*cf).unwrap_or(Decimal::ZERO),
        };
        let exit_equity = match args.exit_equity {
            Some(e) => e,
            None => cash_flows.last().copied().unwrap_or(Decimal::ZERO),
        };
        ReturnsInput {
            cash_flows,
            entry_equity,
            exit_equity,
        }
    };

    let result = calculate_returns(&returns_input)?;
    Ok(serde_json::to_value(result)?)
}

fn purchase_price(flag: Option<Decimal>, cfg: &LboConfig) -> Result<Decimal, Box<dyn std::error::Error>> {
    flag.or(cfg.default_purchase_price)
        .ok_or_else(|| "--purchase-price is required (or set lbo.default_purchase_price)".into())
}
