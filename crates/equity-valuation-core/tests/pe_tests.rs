use equity_valuation_core::pe::lbo::{simulate_lbo, ExitBasis, LboInput, RepaymentPolicy};
use equity_valuation_core::pe::returns::{calculate_returns, ReturnsInput};
use equity_valuation_core::pe::structure::LboStructure;
use equity_valuation_core::pe::sweep::{run_lbo_sweep, LboSweepInput};
use equity_valuation_core::valuation::projection::ProjectionRow;
use equity_valuation_core::ValuationError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;

// ===========================================================================
// Fixtures
// ===========================================================================

fn flat_projection(years: i32, fcff: Decimal, ebitda: Decimal) -> Vec<ProjectionRow> {
    (0..years)
        .map(|i| {
            let mut row = ProjectionRow::from_fcff(2024 + i, fcff);
            row.ebitda = Some(ebitda);
            row
        })
        .collect()
}

fn lbo_input(repayment: RepaymentPolicy, exit_multiple: Decimal) -> LboInput {
    LboInput {
        projections: flat_projection(5, dec!(200), dec!(300)),
        initial_debt: dec!(1000),
        equity_contribution: dec!(500),
        interest_rate: dec!(0.08),
        repayment,
        exit_year: None,
        exit_multiple,
        exit_basis: ExitBasis::Ebitda,
    }
}

// ===========================================================================
// LBO simulator
// ===========================================================================

#[test]
fn test_full_sweep_first_year_reference_case() {
    let out = simulate_lbo(&lbo_input(RepaymentPolicy::FullCashSweep, dec!(8))).unwrap();
    let y1 = &out.result.schedule[0];
    assert_eq!(y1.debt_begin, dec!(1000));
    assert_eq!(y1.interest, dec!(80));
    assert_eq!(y1.available_cash, dec!(120));
    assert_eq!(y1.repayment, dec!(120));
    assert_eq!(y1.debt_end, dec!(880));
    assert_eq!(y1.equity_cash_flow, Decimal::ZERO);
}

#[test]
fn test_fractional_sweep_debt_never_increases() {
    for fraction in [dec!(0), dec!(0.25), dec!(0.5), dec!(1)] {
        let out = simulate_lbo(&lbo_input(
            RepaymentPolicy::FractionalSweep { fraction },
            dec!(8),
        ))
        .unwrap();
        for y in &out.result.schedule {
            assert!(y.debt_end >= Decimal::ZERO);
            assert!(y.debt_end <= y.debt_begin);
            assert!(y.repayment <= y.available_cash);
            assert_eq!(y.repayment + y.equity_cash_flow, y.available_cash);
        }
    }
}

#[test]
fn test_fractional_sweep_splits_cash() {
    let out = simulate_lbo(&lbo_input(
        RepaymentPolicy::FractionalSweep { fraction: dec!(0.5) },
        dec!(8),
    ))
    .unwrap();
    let y1 = &out.result.schedule[0];
    assert_eq!(y1.repayment, dec!(60));
    assert_eq!(y1.equity_cash_flow, dec!(60));
    assert_eq!(y1.equity_end, dec!(560));
    assert!(out.result.cumulative_equity_cash_flow > Decimal::ZERO);
}

#[test]
fn test_gain_implies_moic_above_one_and_positive_irr() {
    let out = simulate_lbo(&lbo_input(RepaymentPolicy::FullCashSweep, dec!(8))).unwrap();
    let r = &out.result;
    assert!(r.final_equity > dec!(500));
    assert!(r.moic > Decimal::ONE);
    assert!(r.irr.unwrap() > Decimal::ZERO);
    assert_eq!(r.equity_cash_flows.len(), 6);
    assert_eq!(r.equity_cash_flows[0], dec!(-500));
}

#[test]
fn test_loss_implies_moic_below_one_and_negative_irr() {
    // 2× EBITDA of 300 leaves little over the remaining debt
    let out = simulate_lbo(&lbo_input(RepaymentPolicy::FullCashSweep, dec!(2))).unwrap();
    let r = &out.result;
    assert!(r.final_equity > Decimal::ZERO);
    assert!(r.final_equity < dec!(500));
    assert!(r.moic < Decimal::ONE);
    assert!(r.irr.unwrap() < Decimal::ZERO);
}

#[test]
fn test_exit_year_truncates_schedule() {
    let mut input = lbo_input(RepaymentPolicy::FullCashSweep, dec!(8));
    input.exit_year = Some(2026);
    let r = simulate_lbo(&input).unwrap().result;
    assert_eq!(r.exit_year, 2026);
    assert_eq!(r.schedule.len(), 3);
    assert_eq!(r.final_debt, r.schedule[2].debt_end);

    input.exit_year = Some(2035);
    assert!(matches!(
        simulate_lbo(&input).unwrap_err(),
        ValuationError::InvalidParameter { .. }
    ));
}

#[test]
fn test_fcff_exit_basis() {
    let mut input = lbo_input(RepaymentPolicy::FullCashSweep, dec!(10));
    input.exit_basis = ExitBasis::Fcff;
    let r = simulate_lbo(&input).unwrap().result;
    assert_eq!(r.exit_ev, dec!(2000));
}

// ===========================================================================
// Structure & returns
// ===========================================================================

#[test]
fn test_structure_splits_purchase_price() {
    let s = LboStructure::from_purchase_price(dec!(1500), dec!(1) / dec!(3)).unwrap();
    assert_eq!(s.equity_contribution + s.debt, dec!(1500));
    assert_eq!(s.entry_leverage(dec!(300)).map(|m| m.round_dp(4)), Some(dec!(3.3333)));
}

#[test]
fn test_returns_from_lbo_result() {
    let lbo = simulate_lbo(&lbo_input(
        RepaymentPolicy::FractionalSweep { fraction: dec!(0.5) },
        dec!(8),
    ))
    .unwrap()
    .result;
    let returns = calculate_returns(&ReturnsInput::from(&lbo)).unwrap().result;

    assert_eq!(returns.total_invested, dec!(500));
    assert_eq!(returns.cash_on_cash, lbo.moic);
    // Interim distributions lift MOIC above cash-on-cash
    assert!(returns.moic > returns.cash_on_cash);
    assert_eq!(returns.irr, lbo.irr);
    assert_eq!(returns.holding_period, dec!(5));
}

// ===========================================================================
// Sweep
// ===========================================================================

fn sweep_input() -> LboSweepInput {
    LboSweepInput {
        projections: flat_projection(5, dec!(200), dec!(300)),
        purchase_price: dec!(2400),
        equity_ratios: vec![dec!(0.3), dec!(0.4)],
        interest_rates: vec![dec!(0.05), dec!(0.07), dec!(0.09)],
        exit_multiples: vec![dec!(7), dec!(9)],
        repayment: RepaymentPolicy::FullCashSweep,
        exit_basis: ExitBasis::Ebitda,
        exit_year: None,
    }
}

#[test]
fn test_sweep_returns_every_distinct_combination() {
    let rows = run_lbo_sweep(&sweep_input()).unwrap().result;
    assert_eq!(rows.len(), 2 * 3 * 2);
    let distinct: HashSet<_> = rows
        .iter()
        .map(|r| (r.equity_ratio, r.interest_rate, r.exit_multiple))
        .collect();
    assert_eq!(distinct.len(), 12);
}

#[test]
fn test_sweep_row_matches_single_run() {
    let rows = run_lbo_sweep(&sweep_input()).unwrap().result;
    let row = rows
        .iter()
        .find(|r| r.equity_ratio == dec!(0.4) && r.interest_rate == dec!(0.07) && r.exit_multiple == dec!(9))
        .unwrap();

    let structure = LboStructure::from_purchase_price(dec!(2400), dec!(0.4)).unwrap();
    assert_eq!(structure.debt, dec!(1440));
    let single = simulate_lbo(&LboInput {
        projections: flat_projection(5, dec!(200), dec!(300)),
        initial_debt: structure.debt,
        equity_contribution: structure.equity_contribution,
        interest_rate: dec!(0.07),
        repayment: RepaymentPolicy::FullCashSweep,
        exit_year: None,
        exit_multiple: dec!(9),
        exit_basis: ExitBasis::Ebitda,
    })
    .unwrap()
    .result;

    assert_eq!(row.final_debt, Some(single.final_debt));
    assert_eq!(row.moic, Some(single.moic));
    assert_eq!(row.irr, single.irr);
}

#[test]
fn test_sweep_higher_leverage_cost_lowers_returns() {
    let rows = run_lbo_sweep(&sweep_input()).unwrap().result;
    let moic = |rate| {
        rows.iter()
            .find(|r| r.equity_ratio == dec!(0.3) && r.interest_rate == rate && r.exit_multiple == dec!(9))
            .and_then(|r| r.moic)
            .unwrap()
    };
    assert!(moic(dec!(0.05)) > moic(dec!(0.07)));
    assert!(moic(dec!(0.07)) > moic(dec!(0.09)));
}
