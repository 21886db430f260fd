use std::time::Instant;

use crate::ratios::{build_rows, require_columns, safe_ratio, RatioRow};
use crate::statements::{FinancialStatementRow, FinancialStatements, StatementField};
use crate::types::{with_metadata, ComputationOutput};
use crate::ValuationResult;

pub(crate) const REQUIRED_COLUMNS: [StatementField; 8] = [
    StatementField::TotalDebt,
    StatementField::StockholdersEquity,
    StatementField::Ebitda,
    StatementField::Ebit,
    StatementField::InterestExpense,
    StatementField::CurrentAssets,
    StatementField::Inventory,
    StatementField::CurrentLiabilities,
];

/// Leverage and liquidity ratios per period.
///
/// Interest coverage uses the absolute interest expense since providers
/// report it with either sign. Quick ratio = (current assets − inventory) /
/// current liabilities.
pub fn calculate_leverage_ratios(
    statements: &FinancialStatements,
) -> ValuationResult<ComputationOutput<Vec<RatioRow>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    require_columns(statements, &REQUIRED_COLUMNS, "leverage ratios")?;

    let rows = build_rows(statements, fill);

    for r in &rows {
        if let Some(cov) = r.interest_coverage {
            if cov < rust_decimal::Decimal::ONE {
                warnings.push(format!(
                    "{}: interest coverage {cov:.2}x below 1.0x",
                    r.fiscal_year
                ));
            }
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Leverage and liquidity ratios",
        &serde_json::json!({ "periods": statements.len() }),
        warnings,
        elapsed,
        rows,
    ))
}

pub(crate) fn fill(ratio: &mut RatioRow, row: &FinancialStatementRow) {
    ratio.debt_to_equity = safe_ratio(row.total_debt, row.stockholders_equity);
    ratio.debt_to_ebitda = safe_ratio(row.total_debt, row.ebitda);
    ratio.interest_coverage = safe_ratio(row.ebit, row.interest_expense.map(|i| i.abs()));
    ratio.current_ratio = safe_ratio(row.current_assets, row.current_liabilities);

    let quick_assets = match (row.current_assets, row.inventory) {
        (Some(ca), Some(inv)) => Some(ca - inv),
        _ => None,
    };
    ratio.quick_ratio = safe_ratio(quick_assets, row.current_liabilities);
}
