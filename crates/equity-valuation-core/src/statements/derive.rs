//! Balance-sheet figures derived from the statement table through ordered
//! fallback chains: net debt, shares outstanding and market capitalisation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::assumptions::{resolve_first, sum_present, Extractor, Provenance, Resolved};
use crate::error::ValuationError;
use crate::statements::{FinancialStatementRow, FinancialStatements};
use crate::types::Money;
use crate::ValuationResult;

/// A derived scalar together with the chain candidate that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFigure {
    pub value: Money,
    pub source: String,
    pub provenance: Provenance,
}

impl DerivedFigure {
    fn from_resolved(resolved: Resolved<Money>, provenance: Provenance) -> Self {
        Self {
            value: resolved.value,
            source: resolved.source,
            provenance,
        }
    }
}

fn total_debt(row: &FinancialStatementRow) -> Option<Resolved<Money>> {
    let total: [(&str, Extractor<FinancialStatementRow, Decimal>); 1] = [("total_debt", |r| r.total_debt)];
    let components: [(&str, Extractor<FinancialStatementRow, Decimal>); 2] = [
        ("current_debt", |r| r.current_debt),
        ("long_term_debt", |r| r.long_term_debt),
    ];
    resolve_first(row, &total).or_else(|| sum_present(row, &components))
}

fn total_cash(row: &FinancialStatementRow) -> Option<Resolved<Money>> {
    // Cash + short-term investments already contains cash & equivalents, so
    // the two are alternatives rather than summands.
    let chain: [(&str, Extractor<FinancialStatementRow, Decimal>); 2] = [
        ("cash_and_short_term_investments", |r| r.cash_and_short_term_investments),
        ("cash_and_equivalents", |r| r.cash_and_equivalents),
    ];
    resolve_first(row, &chain)
}

/// Net debt for the latest period.
///
/// Chain: reported net debt → (total debt, else current + long-term debt)
/// − (cash + short-term investments, else cash & equivalents). When neither
/// debt nor cash is reported the figure defaults to zero.
pub fn derive_net_debt(statements: &FinancialStatements) -> DerivedFigure {
    let row = statements.latest();
    if let Some(reported) = row.net_debt {
        return DerivedFigure {
            value: reported,
            source: "net_debt".into(),
            provenance: Provenance::Observed,
        };
    }

    match (total_debt(row), total_cash(row)) {
        (None, None) => DerivedFigure {
            value: Decimal::ZERO,
            source: "default".into(),
            provenance: Provenance::Defaulted,
        },
        (debt, cash) => {
            let debt_value = debt.as_ref().map(|d| d.value).unwrap_or(Decimal::ZERO);
            let cash_value = cash.as_ref().map(|c| c.value).unwrap_or(Decimal::ZERO);
            let source = format!(
                "{} - {}",
                debt.map(|d| d.source).unwrap_or_else(|| "0".into()),
                cash.map(|c| c.source).unwrap_or_else(|| "0".into()),
            );
            DerivedFigure {
                value: debt_value - cash_value,
                source,
                provenance: Provenance::Derived,
            }
        }
    }
}

/// Gross debt for the latest period: total debt, else current + long-term
/// debt. `None` when no debt field is reported.
pub fn derive_gross_debt(statements: &FinancialStatements) -> Option<DerivedFigure> {
    total_debt(statements.latest()).map(|d| DerivedFigure::from_resolved(d, Provenance::Observed))
}

/// Shares outstanding for the latest period: basic, else diluted average.
/// A non-positive count falls through to the next candidate.
pub fn derive_shares_outstanding(statements: &FinancialStatements) -> Option<DerivedFigure> {
    let chain: [(&str, Extractor<FinancialStatementRow, Decimal>); 2] = [
        ("basic_average_shares", |r| r.basic_average_shares.filter(|s| *s > Decimal::ZERO)),
        ("diluted_average_shares", |r| r.diluted_average_shares.filter(|s| *s > Decimal::ZERO)),
    ];
    resolve_first(statements.latest(), &chain)
        .map(|r| DerivedFigure::from_resolved(r, Provenance::Observed))
}

struct MarketContext<'a> {
    statements: &'a FinancialStatements,
    reported_market_cap: Option<Money>,
    price: Option<Money>,
}

/// Market capitalisation.
///
/// Chain: provider-reported market cap → price × shares outstanding. Fails
/// with `MissingData` when neither is available and with `InvalidParameter`
/// when the result is not positive; WACC weights are meaningless otherwise.
pub fn derive_market_cap(
    statements: &FinancialStatements,
    reported_market_cap: Option<Money>,
    price: Option<Money>,
) -> ValuationResult<DerivedFigure> {
    let ctx = MarketContext {
        statements,
        reported_market_cap,
        price,
    };
    let chain: [(&str, Extractor<MarketContext<'_>, Decimal>); 2] = [
        ("provider_market_cap", |c| c.reported_market_cap),
        ("price_x_shares", |c| {
            let shares = derive_shares_outstanding(c.statements)?;
            Some(c.price? * shares.value)
        }),
    ];

    let resolved = resolve_first(&ctx, &chain).ok_or_else(|| {
        ValuationError::missing(
            "market_cap",
            "no provider market cap and no price x shares outstanding",
        )
    })?;
    if resolved.value <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "market_cap",
            format!("Market capitalisation must be positive, got {}", resolved.value),
        ));
    }
    let provenance = if resolved.source == "provider_market_cap" {
        Provenance::Observed
    } else {
        Provenance::Derived
    };
    Ok(DerivedFigure::from_resolved(resolved, provenance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn table(row: FinancialStatementRow) -> FinancialStatements {
        FinancialStatements::new(vec![row]).unwrap()
    }

    fn row() -> FinancialStatementRow {
        FinancialStatementRow::new(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
    }

    #[test]
    fn test_net_debt_prefers_reported() {
        let mut r = row();
        r.net_debt = Some(dec!(120));
        r.total_debt = Some(dec!(500));
        let nd = derive_net_debt(&table(r));
        assert_eq!(nd.value, dec!(120));
        assert_eq!(nd.provenance, Provenance::Observed);
    }

    #[test]
    fn test_net_debt_from_components() {
        let mut r = row();
        r.current_debt = Some(dec!(50));
        r.long_term_debt = Some(dec!(450));
        r.cash_and_equivalents = Some(dec!(100));
        r.cash_and_short_term_investments = Some(dec!(180));
        let nd = derive_net_debt(&table(r));
        assert_eq!(nd.value, dec!(320));
        assert_eq!(nd.source, "current_debt+long_term_debt - cash_and_short_term_investments");
        assert_eq!(nd.provenance, Provenance::Derived);
    }

    #[test]
    fn test_net_debt_defaults_to_zero() {
        let nd = derive_net_debt(&table(row()));
        assert_eq!(nd.value, Decimal::ZERO);
        assert_eq!(nd.provenance, Provenance::Defaulted);
    }

    #[test]
    fn test_market_cap_chain() {
        let mut r = row();
        r.diluted_average_shares = Some(dec!(10));
        let t = table(r);

        let reported = derive_market_cap(&t, Some(dec!(999)), Some(dec!(50))).unwrap();
        assert_eq!(reported.value, dec!(999));
        assert_eq!(reported.provenance, Provenance::Observed);

        let computed = derive_market_cap(&t, None, Some(dec!(50))).unwrap();
        assert_eq!(computed.value, dec!(500));
        assert_eq!(computed.source, "price_x_shares");
    }

    #[test]
    fn test_zero_basic_shares_fall_through_to_diluted() {
        let mut r = row();
        r.basic_average_shares = Some(Decimal::ZERO);
        r.diluted_average_shares = Some(dec!(120));
        let shares = derive_shares_outstanding(&table(r)).unwrap();
        assert_eq!(shares.value, dec!(120));
        assert_eq!(shares.source, "diluted_average_shares");

        let mut r = row();
        r.basic_average_shares = Some(dec!(-5));
        assert!(derive_shares_outstanding(&table(r)).is_none());
    }

    #[test]
    fn test_gross_debt_chain() {
        let mut r = row();
        r.current_debt = Some(dec!(50));
        r.long_term_debt = Some(dec!(350));
        r.cash_and_equivalents = Some(dec!(390));
        let gross = derive_gross_debt(&table(r)).unwrap();
        assert_eq!(gross.value, dec!(400));
        assert!(derive_gross_debt(&table(row())).is_none());
    }

    #[test]
    fn test_market_cap_missing_is_fatal() {
        let t = table(row());
        let err = derive_market_cap(&t, None, Some(dec!(50))).unwrap_err();
        assert!(matches!(err, ValuationError::MissingData { .. }));
    }
}
