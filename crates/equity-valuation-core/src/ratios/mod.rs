pub mod leverage;
pub mod profitability;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::statements::{FinancialStatementRow, FinancialStatements, StatementField};
use crate::types::{with_metadata, ComputationOutput, Money, Multiple, Rate};
use crate::ValuationResult;

pub use leverage::calculate_leverage_ratios;
pub use profitability::calculate_profitability_ratios;

/// Ratios for one reporting period. A ratio is `None` when an input is
/// missing or its denominator is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioRow {
    pub period_end: NaiveDate,
    pub fiscal_year: i32,

    // Base figures carried for the projector
    pub revenue: Option<Money>,
    pub capex: Option<Money>,
    pub net_working_capital: Option<Money>,

    // Profitability
    pub ebitda_margin: Option<Rate>,
    pub ebit_margin: Option<Rate>,
    pub net_margin: Option<Rate>,
    pub roe: Option<Rate>,
    pub roa: Option<Rate>,
    pub roic: Option<Rate>,

    // Leverage and liquidity
    pub debt_to_equity: Option<Multiple>,
    pub debt_to_ebitda: Option<Multiple>,
    pub interest_coverage: Option<Multiple>,
    pub current_ratio: Option<Multiple>,
    pub quick_ratio: Option<Multiple>,
}

impl RatioRow {
    pub(crate) fn for_period(row: &FinancialStatementRow) -> Self {
        Self {
            period_end: row.period_end,
            fiscal_year: row.fiscal_year(),
            revenue: row.revenue,
            capex: row.capex,
            net_working_capital: row.net_working_capital(),
            ..Default::default()
        }
    }

    /// True when no derived ratio is defined for the period.
    pub fn is_empty(&self) -> bool {
        [
            self.ebitda_margin,
            self.ebit_margin,
            self.net_margin,
            self.roe,
            self.roa,
            self.roic,
            self.debt_to_equity,
            self.debt_to_ebitda,
            self.interest_coverage,
            self.current_ratio,
            self.quick_ratio,
        ]
        .iter()
        .all(Option::is_none)
    }
}

/// Profitability and leverage ratios, merged per period.
///
/// Fails with `MissingData` naming every required column that no period
/// reports. Periods where every ratio is undefined are dropped.
pub fn calculate_ratios(
    statements: &FinancialStatements,
) -> ValuationResult<ComputationOutput<Vec<RatioRow>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let mut required: Vec<StatementField> = profitability::REQUIRED_COLUMNS.to_vec();
    required.extend(
        leverage::REQUIRED_COLUMNS
            .iter()
            .filter(|f| !profitability::REQUIRED_COLUMNS.contains(f)),
    );
    require_columns(statements, &required, "ratio engine")?;

    let rows = build_rows(statements, |ratio, row| {
        profitability::fill(ratio, row);
        leverage::fill(ratio, row);
    });

    let dropped = statements.len() - rows.len();
    if dropped > 0 {
        warnings.push(format!(
            "{dropped} period(s) dropped: no ratio could be computed"
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Profitability and leverage ratios",
        &serde_json::json!({
            "periods": statements.len(),
            "first_period": statements.rows()[0].period_end,
            "latest_period": statements.latest().period_end,
        }),
        warnings,
        elapsed,
        rows,
    ))
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn require_columns(
    statements: &FinancialStatements,
    fields: &[StatementField],
    context: &str,
) -> ValuationResult<()> {
    let missing = statements.missing_columns(fields);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(crate::error::ValuationError::missing(
            missing.join(", "),
            format!("required by {context}"),
        ))
    }
}

pub(crate) fn build_rows<F>(statements: &FinancialStatements, fill: F) -> Vec<RatioRow>
where
    F: Fn(&mut RatioRow, &FinancialStatementRow),
{
    statements
        .rows()
        .iter()
        .map(|row| {
            let mut ratio = RatioRow::for_period(row);
            fill(&mut ratio, row);
            ratio
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// `num / den`, undefined when either side is missing or `den` is zero.
pub(crate) fn safe_ratio(num: Option<Decimal>, den: Option<Decimal>) -> Option<Decimal> {
    let den = den?;
    if den.is_zero() {
        return None;
    }
    num?.checked_div(den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValuationError;
    use rust_decimal_macros::dec;

    fn full_row(year: i32) -> FinancialStatementRow {
        let mut r = FinancialStatementRow::new(NaiveDate::from_ymd_opt(year, 12, 31).unwrap());
        r.revenue = Some(dec!(1000));
        r.ebitda = Some(dec!(200));
        r.ebit = Some(dec!(150));
        r.net_income = Some(dec!(90));
        r.interest_expense = Some(dec!(-30));
        r.total_debt = Some(dec!(400));
        r.stockholders_equity = Some(dec!(500));
        r.current_assets = Some(dec!(300));
        r.inventory = Some(dec!(100));
        r.current_liabilities = Some(dec!(200));
        r
    }

    #[test]
    fn test_merged_ratios() {
        let table = FinancialStatements::new(vec![full_row(2022), full_row(2023)]).unwrap();
        let out = calculate_ratios(&table).unwrap();
        assert_eq!(out.result.len(), 2);

        let r = &out.result[1];
        assert_eq!(r.fiscal_year, 2023);
        assert_eq!(r.ebitda_margin, Some(dec!(0.2)));
        assert_eq!(r.net_margin, Some(dec!(0.09)));
        assert_eq!(r.debt_to_ebitda, Some(dec!(2)));
        assert_eq!(r.interest_coverage, Some(dec!(5)));
        assert_eq!(r.current_ratio, Some(dec!(1.5)));
        assert_eq!(r.quick_ratio, Some(dec!(1)));
        assert_eq!(r.net_working_capital, Some(dec!(100)));
        // Columns absent from the table stay undefined
        assert_eq!(r.roa, None);
        assert_eq!(r.roic, None);
    }

    #[test]
    fn test_missing_columns_all_named() {
        let mut r = full_row(2023);
        r.inventory = None;
        r.ebit = None;
        let table = FinancialStatements::new(vec![r]).unwrap();
        match calculate_ratios(&table).unwrap_err() {
            ValuationError::MissingData { field, .. } => {
                assert!(field.contains("ebit"));
                assert!(field.contains("inventory"));
            }
            e => panic!("Expected MissingData, got {e:?}"),
        }
    }

    #[test]
    fn test_zero_denominator_is_undefined_not_zero() {
        assert_eq!(safe_ratio(Some(dec!(5)), Some(Decimal::ZERO)), None);
        assert_eq!(safe_ratio(None, Some(dec!(2))), None);
        assert_eq!(safe_ratio(Some(dec!(5)), Some(dec!(2))), Some(dec!(2.5)));
    }

    #[test]
    fn test_period_with_no_ratios_dropped() {
        let mut empty = FinancialStatementRow::new(NaiveDate::from_ymd_opt(2021, 12, 31).unwrap());
        empty.revenue = Some(Decimal::ZERO);
        let table = FinancialStatements::new(vec![empty, full_row(2022)]).unwrap();
        let out = calculate_ratios(&table).unwrap();
        assert_eq!(out.result.len(), 1);
        assert_eq!(out.result[0].fiscal_year, 2022);
        assert!(!out.warnings.is_empty());
    }
}
