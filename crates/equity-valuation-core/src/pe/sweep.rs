use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::ValuationError;
use crate::pe::lbo::{run_lbo, ExitBasis, LboInput, LboResult, RepaymentPolicy};
use crate::pe::structure::LboStructure;
use crate::types::*;
use crate::valuation::dcf::ordered_projections;
use crate::valuation::projection::ProjectionRow;
use crate::ValuationResult;

/// Grid of LBO scenarios over a fixed purchase price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboSweepInput {
    pub projections: Vec<ProjectionRow>,
    pub purchase_price: Money,
    pub equity_ratios: Vec<Rate>,
    pub interest_rates: Vec<Rate>,
    pub exit_multiples: Vec<Multiple>,
    pub repayment: RepaymentPolicy,
    pub exit_basis: ExitBasis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_year: Option<i32>,
}

/// Outcome of one scenario combination. Every result field is `None` when
/// the scenario failed, and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LboSweepRow {
    pub equity_ratio: Rate,
    pub interest_rate: Rate,
    pub exit_multiple: Multiple,
    pub equity_contribution: Option<Money>,
    pub initial_debt: Option<Money>,
    /// Entry debt / first projected EBITDA
    pub initial_debt_to_ebitda: Option<Multiple>,
    /// Debt at exit / exit-year EBITDA
    pub final_debt_to_ebitda: Option<Multiple>,
    pub final_debt: Option<Money>,
    /// Cumulative cash distributed to equity before exit
    pub final_cash: Option<Money>,
    pub exit_ev: Option<Money>,
    pub final_equity: Option<Money>,
    pub moic: Option<Multiple>,
    pub irr: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LboSweepRow {
    fn failed(equity_ratio: Rate, interest_rate: Rate, exit_multiple: Multiple, error: String) -> Self {
        Self {
            equity_ratio,
            interest_rate,
            exit_multiple,
            equity_contribution: None,
            initial_debt: None,
            initial_debt_to_ebitda: None,
            final_debt_to_ebitda: None,
            final_debt: None,
            final_cash: None,
            exit_ev: None,
            final_equity: None,
            moic: None,
            irr: None,
            error: Some(error),
        }
    }
}

/// Run one LBO per (equity ratio, interest rate, exit multiple) combination.
///
/// Rows are ordered equity-ratio-major, then interest rate, then exit
/// multiple. A failing combination yields an error row and never aborts the
/// sweep.
pub fn run_lbo_sweep(input: &LboSweepInput) -> ValuationResult<ComputationOutput<Vec<LboSweepRow>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    for (field, len) in [
        ("equity_ratios", input.equity_ratios.len()),
        ("interest_rates", input.interest_rates.len()),
        ("exit_multiples", input.exit_multiples.len()),
    ] {
        if len == 0 {
            return Err(ValuationError::invalid(field, "Sweep axis cannot be empty"));
        }
    }
    let rows = ordered_projections(&input.projections)?;

    let combos: Vec<(Rate, Rate, Multiple)> = input
        .equity_ratios
        .iter()
        .flat_map(|e| {
            input.interest_rates.iter().flat_map(move |r| {
                input.exit_multiples.iter().map(move |m| (*e, *r, *m))
            })
        })
        .collect();
    info!(scenarios = combos.len(), purchase_price = %input.purchase_price, "running LBO sweep");

    let results = evaluate_combos(&rows, input, &combos);

    let failures = results.iter().filter(|r| r.error.is_some()).count();
    if failures > 0 {
        warnings.push(format!(
            "{failures} of {} scenario(s) failed; see the error column",
            results.len()
        ));
    }
    let undefined_irr = results
        .iter()
        .filter(|r| r.error.is_none() && r.irr.is_none())
        .count();
    if undefined_irr > 0 {
        warnings.push(format!("IRR undefined for {undefined_irr} scenario(s)"));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO scenario sweep (equity ratio x interest rate x exit multiple)",
        &serde_json::json!({
            "purchase_price": input.purchase_price,
            "equity_ratios": input.equity_ratios,
            "interest_rates": input.interest_rates,
            "exit_multiples": input.exit_multiples,
            "repayment": input.repayment,
            "exit_basis": input.exit_basis,
        }),
        warnings,
        elapsed,
        results,
    ))
}

fn run_scenario(
    rows: &[ProjectionRow],
    input: &LboSweepInput,
    (equity_ratio, interest_rate, exit_multiple): (Rate, Rate, Multiple),
) -> LboSweepRow {
    let outcome = LboStructure::from_purchase_price(input.purchase_price, equity_ratio).and_then(|s| {
        let lbo = LboInput {
            projections: rows.to_vec(),
            initial_debt: s.debt,
            equity_contribution: s.equity_contribution,
            interest_rate,
            repayment: input.repayment,
            exit_year: input.exit_year,
            exit_multiple,
            exit_basis: input.exit_basis,
        };
        let mut scenario_warnings = Vec::new();
        run_lbo(&lbo, &mut scenario_warnings).map(|r| (s, r))
    });

    match outcome {
        Ok((structure, result)) => summarize(rows, equity_ratio, interest_rate, exit_multiple, &structure, &result),
        Err(e) => {
            debug!(%equity_ratio, %interest_rate, %exit_multiple, error = %e, "LBO scenario failed");
            LboSweepRow::failed(equity_ratio, interest_rate, exit_multiple, e.to_string())
        }
    }
}

fn summarize(
    rows: &[ProjectionRow],
    equity_ratio: Rate,
    interest_rate: Rate,
    exit_multiple: Multiple,
    structure: &LboStructure,
    result: &LboResult,
) -> LboSweepRow {
    let first_ebitda = rows.first().and_then(|r| r.ebitda);
    let exit_ebitda = rows
        .iter()
        .find(|r| r.year == result.exit_year)
        .and_then(|r| r.ebitda);
    let leverage = |debt: Money, ebitda: Option<Money>| {
        ebitda.filter(|e| *e > Decimal::ZERO).map(|e| debt / e)
    };

    LboSweepRow {
        equity_ratio,
        interest_rate,
        exit_multiple,
        equity_contribution: Some(structure.equity_contribution),
        initial_debt: Some(structure.debt),
        initial_debt_to_ebitda: leverage(structure.debt, first_ebitda),
        final_debt_to_ebitda: leverage(result.final_debt, exit_ebitda),
        final_debt: Some(result.final_debt),
        final_cash: Some(result.cumulative_equity_cash_flow),
        exit_ev: Some(result.exit_ev),
        final_equity: Some(result.final_equity),
        moic: Some(result.moic),
        irr: result.irr,
        error: None,
    }
}

#[cfg(feature = "parallel")]
fn evaluate_combos(
    rows: &[ProjectionRow],
    input: &LboSweepInput,
    combos: &[(Rate, Rate, Multiple)],
) -> Vec<LboSweepRow> {
    use rayon::prelude::*;

    combos
        .par_iter()
        .map(|c| run_scenario(rows, input, *c))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn evaluate_combos(
    rows: &[ProjectionRow],
    input: &LboSweepInput,
    combos: &[(Rate, Rate, Multiple)],
) -> Vec<LboSweepRow> {
    combos.iter().map(|c| run_scenario(rows, input, *c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sweep_input() -> LboSweepInput {
        let projections = (0..5)
            .map(|i| {
                let mut row = ProjectionRow::from_fcff(2024 + i, dec!(150) + Decimal::from(i * 10));
                row.ebitda = Some(dec!(250) + Decimal::from(i * 10));
                row
            })
            .collect();
        LboSweepInput {
            projections,
            purchase_price: dec!(2000),
            equity_ratios: vec![dec!(0.3), dec!(0.4), dec!(0.5)],
            interest_rates: vec![dec!(0.06), dec!(0.08)],
            exit_multiples: vec![dec!(8), dec!(10), dec!(12)],
            repayment: RepaymentPolicy::FullCashSweep,
            exit_basis: ExitBasis::Ebitda,
            exit_year: None,
        }
    }

    #[test]
    fn test_sweep_is_full_cartesian_product_in_order() {
        let out = run_lbo_sweep(&sweep_input()).unwrap();
        let rows = &out.result;
        assert_eq!(rows.len(), 18);

        let mut seen = std::collections::HashSet::new();
        for r in rows {
            assert!(seen.insert((r.equity_ratio, r.interest_rate, r.exit_multiple)));
        }
        // Equity-ratio-major ordering
        assert_eq!(
            (rows[0].equity_ratio, rows[0].interest_rate, rows[0].exit_multiple),
            (dec!(0.3), dec!(0.06), dec!(8))
        );
        assert_eq!(
            (rows[1].equity_ratio, rows[1].interest_rate, rows[1].exit_multiple),
            (dec!(0.3), dec!(0.06), dec!(10))
        );
        assert_eq!(rows[3].interest_rate, dec!(0.08));
        assert_eq!(rows[6].equity_ratio, dec!(0.4));
    }

    #[test]
    fn test_sweep_row_metrics() {
        let out = run_lbo_sweep(&sweep_input()).unwrap();
        let r = &out.result[0];
        assert!(r.error.is_none());
        assert_eq!(r.initial_debt, Some(dec!(1400)));
        // 1400 / 250
        assert_eq!(r.initial_debt_to_ebitda, Some(dec!(5.6)));
        assert_eq!(r.exit_ev, Some(dec!(290) * dec!(8)));
        assert_eq!(r.final_cash, Some(Decimal::ZERO));
        assert!(r.final_debt.unwrap() < dec!(1400));
    }

    #[test]
    fn test_failing_combination_isolated() {
        let mut input = sweep_input();
        input.equity_ratios = vec![dec!(0.3), dec!(1.5)];
        let out = run_lbo_sweep(&input).unwrap();
        assert_eq!(out.result.len(), 12);
        assert!(out.result[..6].iter().all(|r| r.error.is_none()));
        assert!(out.result[6..].iter().all(|r| r.error.is_some() && r.moic.is_none()));
        assert!(out.warnings.iter().any(|w| w.contains("failed")));
    }

    #[test]
    fn test_empty_axis_rejected() {
        let mut input = sweep_input();
        input.exit_multiples.clear();
        assert!(run_lbo_sweep(&input).is_err());
    }
}
