use rust_decimal::Decimal;
use std::time::Instant;

use crate::ratios::{build_rows, require_columns, safe_ratio, RatioRow};
use crate::statements::{FinancialStatementRow, FinancialStatements, StatementField};
use crate::types::{with_metadata, ComputationOutput};
use crate::ValuationResult;

pub(crate) const REQUIRED_COLUMNS: [StatementField; 4] = [
    StatementField::Revenue,
    StatementField::Ebitda,
    StatementField::Ebit,
    StatementField::NetIncome,
];

/// Margins and return ratios per period.
///
/// ROE, ROA and ROIC are only computed for periods that report their
/// denominators. ROIC = operating income × (1 − tax rate) / invested capital.
pub fn calculate_profitability_ratios(
    statements: &FinancialStatements,
) -> ValuationResult<ComputationOutput<Vec<RatioRow>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    require_columns(statements, &REQUIRED_COLUMNS, "profitability ratios")?;

    for (field, label) in [
        (StatementField::StockholdersEquity, "ROE"),
        (StatementField::TotalAssets, "ROA"),
        (StatementField::InvestedCapital, "ROIC"),
    ] {
        if !statements.has_column(field) {
            warnings.push(format!("{label} not computed: no {} column", field.name()));
        }
    }

    let rows = build_rows(statements, fill);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Profitability ratios",
        &serde_json::json!({ "periods": statements.len() }),
        warnings,
        elapsed,
        rows,
    ))
}

pub(crate) fn fill(ratio: &mut RatioRow, row: &FinancialStatementRow) {
    ratio.ebitda_margin = safe_ratio(row.ebitda, row.revenue);
    ratio.ebit_margin = safe_ratio(row.ebit, row.revenue);
    ratio.net_margin = safe_ratio(row.net_income, row.revenue);
    ratio.roe = safe_ratio(row.net_income, row.stockholders_equity);
    ratio.roa = safe_ratio(row.net_income, row.total_assets);

    let after_tax_operating_income = match (row.operating_income, row.tax_rate) {
        (Some(oi), Some(t)) => Some(oi * (Decimal::ONE - t)),
        _ => None,
    };
    ratio.roic = safe_ratio(after_tax_operating_income, row.invested_capital);
}
