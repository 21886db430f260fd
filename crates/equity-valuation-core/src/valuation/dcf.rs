use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::assumptions::{AssumptionLog, Provenance};
use crate::config::DcfConfig;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::valuation::projection::ProjectionRow;
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Terminal value method with its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TerminalMethod {
    /// TV = FCFF_N × (1 + g) / (WACC − g)
    GordonGrowth { growth: Rate },
    /// TV = EBITDA_N × multiple
    ExitMultiple { multiple: Multiple },
}

impl TerminalMethod {
    pub fn kind(&self) -> TerminalKind {
        match self {
            TerminalMethod::GordonGrowth { .. } => TerminalKind::Gordon,
            TerminalMethod::ExitMultiple { .. } => TerminalKind::ExitMultiple,
        }
    }

    pub fn parameter(&self) -> Decimal {
        match *self {
            TerminalMethod::GordonGrowth { growth } => growth,
            TerminalMethod::ExitMultiple { multiple } => multiple,
        }
    }
}

/// Terminal method without its parameter; what a sensitivity grid sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    Gordon,
    ExitMultiple,
}

impl TerminalKind {
    pub fn with_parameter(self, parameter: Decimal) -> TerminalMethod {
        match self {
            TerminalKind::Gordon => TerminalMethod::GordonGrowth { growth: parameter },
            TerminalKind::ExitMultiple => TerminalMethod::ExitMultiple {
                multiple: parameter,
            },
        }
    }
}

impl FromStr for TerminalKind {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gordon" | "gordon_growth" => Ok(TerminalKind::Gordon),
            "exit" | "exit_multiple" => Ok(TerminalKind::ExitMultiple),
            other => Err(ValuationError::invalid(
                "terminal_method",
                format!("Unknown terminal method '{other}'; expected 'gordon' or 'exit_multiple'"),
            )),
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalKind::Gordon => write!(f, "gordon"),
            TerminalKind::ExitMultiple => write!(f, "exit_multiple"),
        }
    }
}

/// Input for a DCF valuation over projected FCFF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfInput {
    /// Projected years; sorted by the valuator, must be contiguous
    pub projections: Vec<ProjectionRow>,
    /// Discount rate
    pub wacc: Rate,
    pub terminal: TerminalMethod,
    /// Net debt for the equity bridge; zero when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_debt: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<Decimal>,
}

/// Discounting of a single projected year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcfYear {
    pub year: i32,
    pub fcff: Money,
    /// (1 + WACC)^i
    pub discount_factor: Decimal,
    pub present_value: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcfResult {
    pub years: Vec<DcfYear>,
    /// Sum of discounted FCFF
    pub pv_of_flows: Money,
    /// Undiscounted terminal value at year N
    pub terminal_value: Money,
    pub pv_of_terminal: Money,
    /// PV(flows) + PV(TV)
    pub enterprise_value: Money,
    pub net_debt: Money,
    /// EV − net debt
    pub equity_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equity_value_per_share: Option<Money>,
    /// PV(TV) / EV, undefined when EV is zero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_value_pct: Option<Rate>,
    /// Terminal EBITDA was approximated from FCFF
    pub terminal_ebitda_estimated: bool,
    pub wacc: Rate,
    pub terminal: TerminalMethod,
    pub assumptions: AssumptionLog,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Enterprise and equity value from projected FCFF.
///
/// Year i is discounted by (1 + WACC)^i and the terminal value by
/// (1 + WACC)^N. When the exit-multiple method finds no EBITDA for the final
/// year it uses FCFF / `fcff_to_ebitda_ratio` and flags the estimate.
pub fn value_dcf(input: &DcfInput, config: &DcfConfig) -> ValuationResult<ComputationOutput<DcfResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let rows = ordered_projections(&input.projections)?;
    let output = compute_dcf(&rows, input, config, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        match input.terminal {
            TerminalMethod::GordonGrowth { .. } => "FCFF DCF (Gordon growth terminal value)",
            TerminalMethod::ExitMultiple { .. } => "FCFF DCF (exit multiple terminal value)",
        },
        &serde_json::json!({
            "years": rows.len(),
            "wacc": input.wacc,
            "terminal": input.terminal,
            "net_debt": input.net_debt,
            "shares_outstanding": input.shares_outstanding,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Projections sorted by year; gaps and duplicate years are rejected.
pub fn ordered_projections(projections: &[ProjectionRow]) -> ValuationResult<Vec<ProjectionRow>> {
    if projections.is_empty() {
        return Err(ValuationError::InsufficientData(
            "DCF requires at least one projected year".into(),
        ));
    }
    let mut rows = projections.to_vec();
    rows.sort_by_key(|r| r.year);
    if let Some(w) = rows.windows(2).find(|w| w[1].year != w[0].year + 1) {
        let reason = if w[1].year == w[0].year {
            format!("Duplicate projection year {}", w[0].year)
        } else {
            format!("Projection years not contiguous: {} then {}", w[0].year, w[1].year)
        };
        return Err(ValuationError::invalid("projections", reason));
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// DCF over rows already passed through [`ordered_projections`].
pub(crate) fn compute_dcf(
    rows: &[ProjectionRow],
    input: &DcfInput,
    config: &DcfConfig,
    warnings: &mut Vec<String>,
) -> ValuationResult<DcfResult> {
    let wacc = input.wacc;
    if wacc <= dec!(-1) {
        return Err(ValuationError::invalid(
            "wacc",
            format!("Discount rate must be greater than -100%, got {wacc}"),
        ));
    }
    let last = rows.last().ok_or_else(|| {
        ValuationError::InsufficientData("DCF requires at least one projected year".into())
    })?;

    let mut log = AssumptionLog::new();
    log.record("wacc", Provenance::Supplied, Some(wacc));

    // --- Discount explicit flows ---
    let one_plus_wacc = Decimal::ONE + wacc;
    let mut years = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let factor = discount_factor(one_plus_wacc, i as i64 + 1)?;
        let present_value = row
            .fcff
            .checked_div(factor)
            .ok_or_else(|| overflow(&format!("present value of {} FCFF", row.year)))?;
        years.push(DcfYear {
            year: row.year,
            fcff: row.fcff,
            discount_factor: factor,
            present_value,
        });
    }
    let pv_of_flows = years
        .iter()
        .try_fold(Decimal::ZERO, |acc, y| acc.checked_add(y.present_value))
        .ok_or_else(|| overflow("sum of discounted flows"))?;

    // --- Terminal value ---
    let mut terminal_ebitda_estimated = false;
    let terminal_value = match input.terminal {
        TerminalMethod::GordonGrowth { growth } => {
            if wacc <= growth {
                return Err(ValuationError::DegenerateMath(format!(
                    "WACC ({wacc}) must exceed terminal growth ({growth}) for the Gordon growth model"
                )));
            }
            let spread = wacc - growth;
            if spread < config.min_wacc_growth_spread {
                warnings.push(format!(
                    "WACC - g spread of {spread} is below {}; terminal value is highly sensitive",
                    config.min_wacc_growth_spread
                ));
            }
            log.record("terminal_growth", Provenance::Supplied, Some(growth));
            last.fcff
                .checked_mul(Decimal::ONE + growth)
                .and_then(|v| v.checked_div(spread))
                .ok_or_else(|| overflow(&format!("Gordon terminal value at WACC - g = {spread}")))?
        }
        TerminalMethod::ExitMultiple { multiple } => {
            if multiple < Decimal::ZERO {
                return Err(ValuationError::invalid(
                    "exit_multiple",
                    "Exit multiple cannot be negative",
                ));
            }
            log.record("exit_multiple", Provenance::Supplied, Some(multiple));
            let ebitda = match last.ebitda {
                Some(e) => e,
                None => {
                    if config.fcff_to_ebitda_ratio <= Decimal::ZERO {
                        return Err(ValuationError::invalid(
                            "fcff_to_ebitda_ratio",
                            "Ratio must be positive to approximate EBITDA",
                        ));
                    }
                    let estimate = last
                        .fcff
                        .checked_div(config.fcff_to_ebitda_ratio)
                        .ok_or_else(|| overflow("estimated terminal EBITDA"))?;
                    terminal_ebitda_estimated = true;
                    log.record_with_note(
                        "terminal_ebitda",
                        Provenance::Estimated,
                        Some(estimate),
                        format!("FCFF / {}", config.fcff_to_ebitda_ratio),
                    );
                    warnings.push(format!(
                        "Terminal EBITDA missing; estimated as FCFF / {}",
                        config.fcff_to_ebitda_ratio
                    ));
                    estimate
                }
            };
            ebitda
                .checked_mul(multiple)
                .ok_or_else(|| overflow("exit-multiple terminal value"))?
        }
    };

    let terminal_factor = discount_factor(one_plus_wacc, rows.len() as i64)?;
    let pv_of_terminal = terminal_value
        .checked_div(terminal_factor)
        .ok_or_else(|| overflow("present value of terminal value"))?;
    let enterprise_value = pv_of_flows
        .checked_add(pv_of_terminal)
        .ok_or_else(|| overflow("enterprise value"))?;

    let terminal_value_pct = if enterprise_value.is_zero() {
        None
    } else {
        pv_of_terminal.checked_div(enterprise_value)
    };
    if let Some(pct) = terminal_value_pct {
        if pct > config.terminal_share_warning {
            warnings.push(format!(
                "Terminal value represents {:.1}% of enterprise value; consider extending the explicit forecast period",
                pct * dec!(100)
            ));
        }
    }

    // --- Equity bridge ---
    let net_debt = match input.net_debt {
        Some(nd) => {
            log.record("net_debt", Provenance::Supplied, Some(nd));
            nd
        }
        None => {
            log.record("net_debt", Provenance::Defaulted, Some(Decimal::ZERO));
            Decimal::ZERO
        }
    };
    let equity_value = enterprise_value
        .checked_sub(net_debt)
        .ok_or_else(|| overflow("equity value"))?;
    let equity_value_per_share = match input.shares_outstanding {
        Some(shares) if shares > Decimal::ZERO => equity_value.checked_div(shares),
        _ => None,
    };

    Ok(DcfResult {
        years,
        pv_of_flows,
        terminal_value,
        pv_of_terminal,
        enterprise_value,
        net_debt,
        equity_value,
        equity_value_per_share,
        terminal_value_pct,
        terminal_ebitda_estimated,
        wacc,
        terminal: input.terminal,
        assumptions: log,
    })
}

fn overflow(what: &str) -> ValuationError {
    ValuationError::DegenerateMath(format!("{what} is not representable"))
}

fn discount_factor(one_plus_wacc: Decimal, period: i64) -> ValuationResult<Decimal> {
    match one_plus_wacc.checked_powi(period) {
        Some(f) if !f.is_zero() => Ok(f),
        _ => Err(ValuationError::DegenerateMath(format!(
            "Discount factor (1 + WACC)^{period} is not representable"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn two_year_input(terminal: TerminalMethod) -> DcfInput {
        DcfInput {
            projections: vec![
                ProjectionRow::from_fcff(2024, dec!(100)),
                ProjectionRow::from_fcff(2025, dec!(110)),
            ],
            wacc: dec!(0.10),
            terminal,
            net_debt: None,
            shares_outstanding: None,
        }
    }

    fn close(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() < dec!(0.01)
    }

    #[test]
    fn test_gordon_reference_values() {
        let input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        let r = &out.result;

        assert!(close(r.pv_of_flows, dec!(181.82)), "pv flows {}", r.pv_of_flows);
        assert!(close(r.terminal_value, dec!(1402.50)), "tv {}", r.terminal_value);
        assert!(close(r.pv_of_terminal, dec!(1159.09)), "pv tv {}", r.pv_of_terminal);
        assert!(close(r.enterprise_value, dec!(1340.91)), "ev {}", r.enterprise_value);
        assert_eq!(r.enterprise_value, r.pv_of_flows + r.pv_of_terminal);
        assert_eq!(r.years[1].discount_factor, dec!(1.21));
    }

    #[test]
    fn test_net_debt_defaults_and_is_recorded() {
        let input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        assert_eq!(out.result.net_debt, Decimal::ZERO);
        assert_eq!(out.result.equity_value, out.result.enterprise_value);
        assert_eq!(
            out.result.assumptions.provenance_of("net_debt"),
            Some(Provenance::Defaulted)
        );
        assert!(out.result.equity_value_per_share.is_none());
    }

    #[test]
    fn test_equity_bridge_and_per_share() {
        let mut input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
        input.net_debt = Some(dec!(340.91));
        input.shares_outstanding = Some(dec!(100));
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        let r = &out.result;
        assert_eq!(r.equity_value, r.enterprise_value - dec!(340.91));
        assert_eq!(r.equity_value_per_share, Some(r.equity_value / dec!(100)));

        input.shares_outstanding = Some(Decimal::ZERO);
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        assert!(out.result.equity_value_per_share.is_none());
    }

    #[test]
    fn test_wacc_a_hair_above_growth_is_degenerate_not_a_panic() {
        let mut input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
        input.wacc = dec!(0.020000000000000000000000001);
        match value_dcf(&input, &DcfConfig::default()) {
            Err(ValuationError::DegenerateMath(msg)) => assert!(msg.contains("Gordon"), "{msg}"),
            other => panic!("expected DegenerateMath, got {other:?}"),
        }
    }

    #[test]
    fn test_wacc_near_minus_one_is_degenerate_not_a_panic() {
        let mut input = two_year_input(TerminalMethod::ExitMultiple { multiple: dec!(8) });
        input.projections = (0..40)
            .map(|i| ProjectionRow::from_fcff(2024 + i, dec!(1_000_000)))
            .collect();
        input.wacc = dec!(-0.999);
        assert!(matches!(
            value_dcf(&input, &DcfConfig::default()),
            Err(ValuationError::DegenerateMath(_))
        ));
    }

    #[test]
    fn test_wacc_not_above_growth_is_degenerate() {
        for wacc in [dec!(0.02), dec!(0.01)] {
            let mut input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
            input.wacc = wacc;
            assert!(matches!(
                value_dcf(&input, &DcfConfig::default()),
                Err(ValuationError::DegenerateMath(_))
            ));
        }
    }

    #[test]
    fn test_wacc_at_or_below_minus_one_rejected() {
        let mut input = two_year_input(TerminalMethod::ExitMultiple { multiple: dec!(10) });
        input.wacc = dec!(-1);
        assert!(matches!(
            value_dcf(&input, &DcfConfig::default()),
            Err(ValuationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_exit_multiple_uses_ebitda() {
        let mut input = two_year_input(TerminalMethod::ExitMultiple { multiple: dec!(8) });
        input.projections[1].ebitda = Some(dec!(200));
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        assert_eq!(out.result.terminal_value, dec!(1600));
        assert!(!out.result.terminal_ebitda_estimated);
    }

    #[test]
    fn test_exit_multiple_estimates_missing_ebitda() {
        let input = two_year_input(TerminalMethod::ExitMultiple { multiple: dec!(7) });
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        // EBITDA ≈ 110 / 0.7; TV = 1100
        assert!(close(out.result.terminal_value, dec!(1100)));
        assert!(out.result.terminal_ebitda_estimated);
        assert_eq!(
            out.result.assumptions.provenance_of("terminal_ebitda"),
            Some(Provenance::Estimated)
        );
    }

    #[test]
    fn test_rows_sorted_and_gaps_rejected() {
        let mut input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
        input.projections.reverse();
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        assert_eq!(out.result.years[0].year, 2024);

        input.projections[0].year = 2027;
        assert!(matches!(
            value_dcf(&input, &DcfConfig::default()),
            Err(ValuationError::InvalidParameter { .. })
        ));

        input.projections[0].year = 2024;
        assert!(matches!(
            value_dcf(&input, &DcfConfig::default()),
            Err(ValuationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_terminal_share_and_spread_warnings() {
        let mut input = two_year_input(TerminalMethod::GordonGrowth { growth: dec!(0.02) });
        input.wacc = dec!(0.023);
        let out = value_dcf(&input, &DcfConfig::default()).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("Terminal value represents")));
        assert!(out.warnings.iter().any(|w| w.contains("spread")));
    }

    #[test]
    fn test_terminal_kind_parsing() {
        assert_eq!("gordon".parse::<TerminalKind>().unwrap(), TerminalKind::Gordon);
        assert_eq!(
            "exit_multiple".parse::<TerminalKind>().unwrap(),
            TerminalKind::ExitMultiple
        );
        assert!(matches!(
            "perpetuity".parse::<TerminalKind>(),
            Err(ValuationError::InvalidParameter { .. })
        ));
    }
}
