use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::*;
use crate::valuation::dcf::ordered_projections;
use crate::valuation::projection::ProjectionRow;
use crate::ValuationResult;

/// How post-interest cash is applied to debt each year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RepaymentPolicy {
    /// All available cash repays debt
    FullCashSweep,
    /// Only `fraction` of available cash repays debt; the rest goes to equity
    FractionalSweep { fraction: Rate },
}

impl RepaymentPolicy {
    fn fraction(&self) -> Rate {
        match *self {
            RepaymentPolicy::FullCashSweep => Decimal::ONE,
            RepaymentPolicy::FractionalSweep { fraction } => fraction,
        }
    }
}

/// Figure the exit multiple is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitBasis {
    Ebitda,
    Fcff,
}

/// Input for a single LBO scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboInput {
    pub projections: Vec<ProjectionRow>,
    /// Acquisition debt at entry
    pub initial_debt: Money,
    /// Sponsor equity at entry
    pub equity_contribution: Money,
    /// Annual interest on the opening debt balance
    pub interest_rate: Rate,
    pub repayment: RepaymentPolicy,
    /// Defaults to the last projected year
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_year: Option<i32>,
    pub exit_multiple: Multiple,
    pub exit_basis: ExitBasis,
}

/// A single year of the debt and equity schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LboYear {
    pub year: i32,
    pub fcff: Money,
    pub debt_begin: Money,
    pub interest: Money,
    /// max(FCFF − interest, 0)
    pub available_cash: Money,
    pub repayment: Money,
    pub debt_end: Money,
    pub equity_cash_flow: Money,
    pub equity_begin: Money,
    pub equity_end: Money,
}

/// LBO scenario output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboResult {
    /// Schedule through the exit year
    pub schedule: Vec<LboYear>,
    pub exit_year: i32,
    pub exit_ev: Money,
    /// Debt outstanding at exit
    pub final_debt: Money,
    /// Exit EV minus debt at exit
    pub final_equity: Money,
    /// Interim cash distributed to equity over the hold
    pub cumulative_equity_cash_flow: Money,
    /// Final equity / equity contribution; interim distributions excluded
    pub moic: Multiple,
    /// `None` when the equity cash flows have no IRR
    pub irr: Option<Rate>,
    /// [−equity, cf₁, …, cf_N + final equity]
    pub equity_cash_flows: Vec<Money>,
}

/// Simulate a leveraged buyout over projected FCFF.
///
/// Each year interest accrues on the opening debt, post-interest cash repays
/// debt according to the repayment policy, and whatever is not used for
/// repayment flows to equity. At exit the basis figure times the multiple
/// gives the exit EV; equity receives it net of outstanding debt.
pub fn simulate_lbo(input: &LboInput) -> ValuationResult<ComputationOutput<LboResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = run_lbo(input, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Leveraged buyout (single debt tranche, cash sweep)",
        &serde_json::json!({
            "initial_debt": input.initial_debt,
            "equity_contribution": input.equity_contribution,
            "interest_rate": input.interest_rate,
            "repayment": input.repayment,
            "exit_year": output.exit_year,
            "exit_multiple": input.exit_multiple,
            "exit_basis": input.exit_basis,
        }),
        warnings,
        elapsed,
        output,
    ))
}

pub(crate) fn run_lbo(input: &LboInput, warnings: &mut Vec<String>) -> ValuationResult<LboResult> {
    // ─── Validation ──────────────────────────────────────────────────
    if input.equity_contribution <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "equity_contribution",
            "Equity contribution must be positive",
        ));
    }
    if input.initial_debt < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "initial_debt",
            "Initial debt cannot be negative",
        ));
    }
    if input.interest_rate < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "interest_rate",
            "Interest rate cannot be negative",
        ));
    }
    if input.exit_multiple < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "exit_multiple",
            "Exit multiple cannot be negative",
        ));
    }
    let fraction = input.repayment.fraction();
    if fraction < Decimal::ZERO || fraction > Decimal::ONE {
        return Err(ValuationError::invalid(
            "repayment.fraction",
            format!("Sweep fraction must be between 0 and 1, got {fraction}"),
        ));
    }

    let rows = ordered_projections(&input.projections)?;
    let exit_year = match input.exit_year {
        Some(y) => y,
        None => rows[rows.len() - 1].year,
    };
    let exit_idx = rows.iter().position(|r| r.year == exit_year).ok_or_else(|| {
        ValuationError::invalid(
            "exit_year",
            format!(
                "Exit year {exit_year} is outside the projection ({}..={})",
                rows[0].year,
                rows[rows.len() - 1].year
            ),
        )
    })?;
    let held = &rows[..=exit_idx];

    // ─── Year-by-year schedule ───────────────────────────────────────
    let mut schedule: Vec<LboYear> = Vec::with_capacity(held.len());
    let mut debt = input.initial_debt;
    let mut equity = input.equity_contribution;

    for row in held {
        let interest = debt * input.interest_rate;
        let available_cash = (row.fcff - interest).max(Decimal::ZERO);
        let repayment = (available_cash * fraction).min(debt);
        let debt_end = debt - repayment;
        let equity_cash_flow = (available_cash - repayment).max(Decimal::ZERO);
        let equity_end = equity + equity_cash_flow;

        if row.fcff < interest {
            warnings.push(format!(
                "Year {}: FCFF {} does not cover interest {interest}",
                row.year, row.fcff
            ));
        }

        schedule.push(LboYear {
            year: row.year,
            fcff: row.fcff,
            debt_begin: debt,
            interest,
            available_cash,
            repayment,
            debt_end,
            equity_cash_flow,
            equity_begin: equity,
            equity_end,
        });

        debt = debt_end;
        equity = equity_end;
    }

    // ─── Exit ────────────────────────────────────────────────────────
    let exit_row = &held[exit_idx];
    let basis = match input.exit_basis {
        ExitBasis::Ebitda => exit_row.ebitda.ok_or_else(|| {
            ValuationError::missing("ebitda", format!("exit year {exit_year} with EBITDA exit basis"))
        })?,
        ExitBasis::Fcff => exit_row.fcff,
    };
    let exit_ev = basis * input.exit_multiple;
    let final_debt = debt;
    let final_equity = exit_ev - final_debt;
    if final_equity < Decimal::ZERO {
        warnings.push(format!(
            "Exit EV {exit_ev} does not cover outstanding debt {final_debt}"
        ));
    }

    // ─── Returns ─────────────────────────────────────────────────────
    let mut equity_cash_flows: Vec<Money> = Vec::with_capacity(schedule.len() + 1);
    equity_cash_flows.push(-input.equity_contribution);
    equity_cash_flows.extend(schedule.iter().map(|y| y.equity_cash_flow));
    if let Some(last) = equity_cash_flows.last_mut() {
        *last += final_equity;
    }

    let irr = match crate::time_value::irr(&equity_cash_flows, dec!(0.10)) {
        Ok(r) => Some(r),
        Err(e) => {
            warnings.push(format!("IRR undefined: {e}"));
            None
        }
    };
    let moic = final_equity / input.equity_contribution;
    let cumulative_equity_cash_flow = schedule.iter().map(|y| y.equity_cash_flow).sum();

    Ok(LboResult {
        schedule,
        exit_year,
        exit_ev,
        final_debt,
        final_equity,
        cumulative_equity_cash_flow,
        moic,
        irr,
        equity_cash_flows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn projections(fcffs: &[Money]) -> Vec<ProjectionRow> {
        fcffs
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let mut row = ProjectionRow::from_fcff(2024 + i as i32, *f);
                row.ebitda = Some(*f * dec!(1.5));
                row
            })
            .collect()
    }

    fn standard_input() -> LboInput {
        LboInput {
            projections: projections(&[dec!(200), dec!(200), dec!(200)]),
            initial_debt: dec!(1000),
            equity_contribution: dec!(500),
            interest_rate: dec!(0.08),
            repayment: RepaymentPolicy::FullCashSweep,
            exit_year: None,
            exit_multiple: dec!(8),
            exit_basis: ExitBasis::Ebitda,
        }
    }

    #[test]
    fn test_first_year_full_sweep() {
        let out = simulate_lbo(&standard_input()).unwrap();
        let y1 = &out.result.schedule[0];
        assert_eq!(y1.interest, dec!(80));
        assert_eq!(y1.available_cash, dec!(120));
        assert_eq!(y1.repayment, dec!(120));
        assert_eq!(y1.debt_end, dec!(880));
        assert_eq!(y1.equity_cash_flow, Decimal::ZERO);
        assert_eq!(y1.equity_begin, dec!(500));
        // Next year opens where this one closed
        assert_eq!(out.result.schedule[1].debt_begin, dec!(880));
    }

    #[test]
    fn test_exit_and_returns() {
        let out = simulate_lbo(&standard_input()).unwrap();
        let r = &out.result;
        assert_eq!(r.exit_year, 2026);
        // Exit EV = 300 * 8
        assert_eq!(r.exit_ev, dec!(2400));
        assert_eq!(r.final_equity, r.exit_ev - r.final_debt);
        assert_eq!(r.moic, r.final_equity / dec!(500));
        assert!(r.moic > Decimal::ONE);
        assert!(r.irr.unwrap() > Decimal::ZERO);
        assert_eq!(r.equity_cash_flows.len(), 4);
        assert_eq!(r.equity_cash_flows[0], dec!(-500));
    }

    #[test]
    fn test_fractional_sweep_pays_equity() {
        let mut input = standard_input();
        input.repayment = RepaymentPolicy::FractionalSweep { fraction: dec!(0.5) };
        let out = simulate_lbo(&input).unwrap();
        let y1 = &out.result.schedule[0];
        assert_eq!(y1.repayment, dec!(60));
        assert_eq!(y1.equity_cash_flow, dec!(60));
        assert_eq!(y1.equity_end, dec!(560));
        for y in &out.result.schedule {
            assert!(y.debt_end >= Decimal::ZERO && y.debt_end <= y.debt_begin);
        }
    }

    #[test]
    fn test_repayment_capped_at_balance() {
        let mut input = standard_input();
        input.initial_debt = dec!(100);
        let out = simulate_lbo(&input).unwrap();
        let y1 = &out.result.schedule[0];
        // Interest 8, available 192, only 100 outstanding
        assert_eq!(y1.repayment, dec!(100));
        assert_eq!(y1.debt_end, Decimal::ZERO);
        assert_eq!(y1.equity_cash_flow, dec!(92));
    }

    #[test]
    fn test_exit_year_truncates_schedule() {
        let mut input = standard_input();
        input.exit_year = Some(2025);
        let out = simulate_lbo(&input).unwrap();
        assert_eq!(out.result.schedule.len(), 2);
        assert_eq!(out.result.final_debt, out.result.schedule[1].debt_end);
    }

    #[test]
    fn test_exit_year_outside_projection_rejected() {
        let mut input = standard_input();
        input.exit_year = Some(2030);
        assert!(matches!(
            simulate_lbo(&input),
            Err(ValuationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_missing_exit_ebitda() {
        let mut input = standard_input();
        input.projections[2].ebitda = None;
        assert!(matches!(
            simulate_lbo(&input),
            Err(ValuationError::MissingData { .. })
        ));

        input.exit_basis = ExitBasis::Fcff;
        let out = simulate_lbo(&input).unwrap();
        assert_eq!(out.result.exit_ev, dec!(1600));
    }

    #[test]
    fn test_zero_equity_rejected() {
        let mut input = standard_input();
        input.equity_contribution = Decimal::ZERO;
        assert!(simulate_lbo(&input).is_err());
    }

    #[test]
    fn test_wiped_out_equity_has_no_irr() {
        let mut input = standard_input();
        input.exit_multiple = Decimal::ZERO;
        let out = simulate_lbo(&input).unwrap();
        assert!(out.result.final_equity < Decimal::ZERO);
        assert!(out.result.irr.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("IRR undefined")));
    }
}
