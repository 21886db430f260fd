use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::ValuationResult;

/// One reporting period of a normalized financial-statement table.
///
/// Every line item is optional because column coverage differs between data
/// providers. Provider-style lower-case column names are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatementRow {
    #[serde(alias = "date", alias = "asofdate")]
    pub period_end: NaiveDate,
    #[serde(default, alias = "totalrevenue", skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebit: Option<Money>,
    #[serde(default, alias = "operatingincome", skip_serializing_if = "Option::is_none")]
    pub operating_income: Option<Money>,
    #[serde(default, alias = "netincome", skip_serializing_if = "Option::is_none")]
    pub net_income: Option<Money>,
    #[serde(default, alias = "interestexpense", skip_serializing_if = "Option::is_none")]
    pub interest_expense: Option<Money>,
    /// Effective tax rate reported alongside the income statement
    #[serde(default, alias = "taxrateforcalcs", skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Rate>,
    #[serde(default, alias = "totaldebt", skip_serializing_if = "Option::is_none")]
    pub total_debt: Option<Money>,
    #[serde(default, alias = "currentdebt", skip_serializing_if = "Option::is_none")]
    pub current_debt: Option<Money>,
    #[serde(default, alias = "longtermdebt", skip_serializing_if = "Option::is_none")]
    pub long_term_debt: Option<Money>,
    /// Net debt as reported by the provider
    #[serde(default, alias = "netdebt", skip_serializing_if = "Option::is_none")]
    pub net_debt: Option<Money>,
    #[serde(default, alias = "cashandcashequivalents", skip_serializing_if = "Option::is_none")]
    pub cash_and_equivalents: Option<Money>,
    #[serde(
        default,
        alias = "cashcashequivalentsandshortterminvestments",
        skip_serializing_if = "Option::is_none"
    )]
    pub cash_and_short_term_investments: Option<Money>,
    #[serde(default, alias = "stockholdersequity", skip_serializing_if = "Option::is_none")]
    pub stockholders_equity: Option<Money>,
    #[serde(default, alias = "totalassets", skip_serializing_if = "Option::is_none")]
    pub total_assets: Option<Money>,
    #[serde(default, alias = "investedcapital", skip_serializing_if = "Option::is_none")]
    pub invested_capital: Option<Money>,
    #[serde(default, alias = "currentassets", skip_serializing_if = "Option::is_none")]
    pub current_assets: Option<Money>,
    #[serde(default, alias = "currentliabilities", skip_serializing_if = "Option::is_none")]
    pub current_liabilities: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Money>,
    #[serde(default, alias = "capitalexpenditure", skip_serializing_if = "Option::is_none")]
    pub capex: Option<Money>,
    #[serde(default, alias = "basicaverageshares", skip_serializing_if = "Option::is_none")]
    pub basic_average_shares: Option<Money>,
    #[serde(default, alias = "dilutedaverageshares", skip_serializing_if = "Option::is_none")]
    pub diluted_average_shares: Option<Money>,
}

impl FinancialStatementRow {
    pub fn new(period_end: NaiveDate) -> Self {
        Self {
            period_end,
            ..Default::default()
        }
    }

    pub fn fiscal_year(&self) -> i32 {
        self.period_end.year()
    }

    /// Current assets less current liabilities, when both are reported.
    pub fn net_working_capital(&self) -> Option<Money> {
        Some(self.current_assets? - self.current_liabilities?)
    }
}

/// Named statement column, used for required-column checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementField {
    Revenue,
    Ebitda,
    Ebit,
    OperatingIncome,
    NetIncome,
    InterestExpense,
    TaxRate,
    TotalDebt,
    StockholdersEquity,
    TotalAssets,
    InvestedCapital,
    CurrentAssets,
    CurrentLiabilities,
    Inventory,
    Capex,
}

impl StatementField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::Ebitda => "ebitda",
            Self::Ebit => "ebit",
            Self::OperatingIncome => "operating_income",
            Self::NetIncome => "net_income",
            Self::InterestExpense => "interest_expense",
            Self::TaxRate => "tax_rate",
            Self::TotalDebt => "total_debt",
            Self::StockholdersEquity => "stockholders_equity",
            Self::TotalAssets => "total_assets",
            Self::InvestedCapital => "invested_capital",
            Self::CurrentAssets => "current_assets",
            Self::CurrentLiabilities => "current_liabilities",
            Self::Inventory => "inventory",
            Self::Capex => "capex",
        }
    }

    pub fn value(self, row: &FinancialStatementRow) -> Option<Money> {
        match self {
            Self::Revenue => row.revenue,
            Self::Ebitda => row.ebitda,
            Self::Ebit => row.ebit,
            Self::OperatingIncome => row.operating_income,
            Self::NetIncome => row.net_income,
            Self::InterestExpense => row.interest_expense,
            Self::TaxRate => row.tax_rate,
            Self::TotalDebt => row.total_debt,
            Self::StockholdersEquity => row.stockholders_equity,
            Self::TotalAssets => row.total_assets,
            Self::InvestedCapital => row.invested_capital,
            Self::CurrentAssets => row.current_assets,
            Self::CurrentLiabilities => row.current_liabilities,
            Self::Inventory => row.inventory,
            Self::Capex => row.capex,
        }
    }
}

/// Historical statement table, sorted by period end (latest last).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<FinancialStatementRow>",
    into = "Vec<FinancialStatementRow>"
)]
pub struct FinancialStatements {
    rows: Vec<FinancialStatementRow>,
}

impl FinancialStatements {
    pub fn new(mut rows: Vec<FinancialStatementRow>) -> ValuationResult<Self> {
        if rows.is_empty() {
            return Err(ValuationError::InsufficientData(
                "Financial statement table has no rows".into(),
            ));
        }
        rows.sort_by_key(|r| r.period_end);
        if let Some(w) = rows.windows(2).find(|w| w[0].period_end == w[1].period_end) {
            return Err(ValuationError::invalid(
                "period_end",
                format!("Duplicate reporting period {}", w[0].period_end),
            ));
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[FinancialStatementRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent reporting period.
    pub fn latest(&self) -> &FinancialStatementRow {
        // Non-empty by construction
        &self.rows[self.rows.len() - 1]
    }

    /// A column is present when at least one period reports it.
    pub fn has_column(&self, field: StatementField) -> bool {
        self.rows.iter().any(|r| field.value(r).is_some())
    }

    /// Names of the given columns that no period reports.
    pub fn missing_columns(&self, fields: &[StatementField]) -> Vec<&'static str> {
        fields
            .iter()
            .filter(|f| !self.has_column(**f))
            .map(|f| f.name())
            .collect()
    }
}

impl TryFrom<Vec<FinancialStatementRow>> for FinancialStatements {
    type Error = ValuationError;

    fn try_from(rows: Vec<FinancialStatementRow>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<FinancialStatements> for Vec<FinancialStatementRow> {
    fn from(table: FinancialStatements) -> Self {
        table.rows
    }
}
